use crate::configuration::types::{RawConfig, StorageBackend};
use crate::error_handling::types::ConfigError;
use clap::Parser;
use log::info;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command-line surface. Everything else is layered in by `Config::load`:
/// environment variables take precedence over the TOML file, which takes
/// precedence over the hardcoded defaults below.
#[derive(Debug, Parser)]
#[command(name = "honeyshell", about = "Interactive SSH honeypot")]
pub struct Args {
    /// Optional TOML configuration file.
    #[arg(long, env = "HONEYSHELL_CONFIG_FILE")]
    pub config_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub host_key_path: PathBuf,
    pub ssh_banner: String,
    pub honeypot_image: String,
    pub honeypot_network: String,
    pub container_cpu_limit: f64,
    pub container_memory_limit: String,
    pub container_ttl: Duration,
    pub honeypot_hostname: String,
    pub sftp_root: PathBuf,
    pub storage_backend: StorageBackend,
    pub db_path: PathBuf,
    pub file_storage_dir: PathBuf,
}

fn env_override(key: &str, current: Option<String>) -> Option<String> {
    std::env::var(key).ok().or(current)
}

impl Config {
    /// Loads the raw TOML file (if any), layers environment variables over
    /// it, and fills in the remaining defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Config, ConfigError> {
        let raw = match config_path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str::<RawConfig>(&contents)
                    .map_err(|e| ConfigError::TomlError(e.to_string()))?
            }
            Some(path) => {
                info!(
                    "configuration file {} not found, using environment/defaults",
                    path.display()
                );
                RawConfig::default()
            }
            None => RawConfig::default(),
        };

        let bind_address_str = env_override("HONEYSHELL_BIND_ADDRESS", raw.bind_address)
            .unwrap_or_else(|| "0.0.0.0:2222".to_string());
        let bind_address: SocketAddr = bind_address_str
            .parse()
            .map_err(|_| ConfigError::NotInRange(format!("bind address {bind_address_str}")))?;

        let host_key_path = env_override("HOST_KEY_PATH", raw.host_key_path)
            .unwrap_or_else(|| "proxy/keys/host_rsa".to_string());

        let ssh_banner = env_override("SSH_BANNER", raw.ssh_banner)
            .unwrap_or_else(|| "SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.6".to_string());

        let honeypot_image = env_override("HONEYPOT_IMAGE", raw.honeypot_image)
            .unwrap_or_else(|| "honeyshell-ubuntu".to_string());

        let honeypot_network = env_override("HONEYPOT_NETWORK", raw.honeypot_network)
            .unwrap_or_else(|| "honeypot-net".to_string());

        let container_cpu_limit = match env_override(
            "CONTAINER_CPU_LIMIT",
            raw.container_cpu_limit.map(|v| v.to_string()),
        ) {
            Some(v) => v
                .parse::<f64>()
                .map_err(|_| ConfigError::NotInRange(format!("CONTAINER_CPU_LIMIT {v}")))?,
            None => 0.5,
        };

        let container_memory_limit =
            env_override("CONTAINER_MEMORY_LIMIT", raw.container_memory_limit)
                .unwrap_or_else(|| "256m".to_string());

        let container_ttl_minutes = match env_override(
            "CONTAINER_TTL_MINUTES",
            raw.container_ttl_minutes.map(|v| v.to_string()),
        ) {
            Some(v) => v
                .parse::<u64>()
                .map_err(|_| ConfigError::NotInRange(format!("CONTAINER_TTL_MINUTES {v}")))?,
            None => 30,
        };

        let honeypot_hostname = env_override("HONEYPOT_HOSTNAME", raw.honeypot_hostname)
            .unwrap_or_else(|| "web-prod-01".to_string());

        let sftp_root = env_override("SFTP_ROOT", raw.sftp_root)
            .unwrap_or_else(|| "/tmp/honeyshell-sftp".to_string());

        let storage_backend_str = env_override("STORAGE_BACKEND", raw.storage_backend)
            .unwrap_or_else(|| "sqlite".to_string());
        let storage_backend = match storage_backend_str.as_str() {
            "sqlite" => StorageBackend::Sqlite,
            "file" => StorageBackend::File,
            other => {
                return Err(ConfigError::NotInRange(format!(
                    "storage backend {other}, expected sqlite or file"
                )))
            }
        };

        let db_path = env_override("HONEYSHELL_DB_PATH", raw.db_path)
            .unwrap_or_else(|| "./honeyshell.sqlite3".to_string());

        let file_storage_dir = env_override("HONEYSHELL_FILE_STORAGE_DIR", raw.file_storage_dir)
            .unwrap_or_else(|| "./honeyshell-data".to_string());

        Ok(Config {
            bind_address,
            host_key_path: PathBuf::from(host_key_path),
            ssh_banner,
            honeypot_image,
            honeypot_network,
            container_cpu_limit,
            container_memory_limit,
            container_ttl: Duration::from_secs(container_ttl_minutes * 60),
            honeypot_hostname,
            sftp_root: PathBuf::from(sftp_root),
            storage_backend,
            db_path: PathBuf::from(db_path),
            file_storage_dir: PathBuf::from(file_storage_dir),
        })
    }

    pub fn from_args(args: &Args) -> Result<Config, ConfigError> {
        Config::load(args.config_file.as_deref().map(Path::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_apply_when_nothing_is_set() {
        for key in [
            "HONEYSHELL_BIND_ADDRESS",
            "HOST_KEY_PATH",
            "SSH_BANNER",
            "HONEYPOT_IMAGE",
            "CONTAINER_CPU_LIMIT",
            "CONTAINER_TTL_MINUTES",
            "STORAGE_BACKEND",
        ] {
            std::env::remove_var(key);
        }
        let cfg = Config::load(None).expect("defaults must be valid");
        assert_eq!(cfg.bind_address.port(), 2222);
        assert_eq!(cfg.honeypot_image, "honeyshell-ubuntu");
        assert_eq!(cfg.container_cpu_limit, 0.5);
        assert_eq!(cfg.container_ttl, Duration::from_secs(30 * 60));
        assert_eq!(cfg.storage_backend, StorageBackend::Sqlite);
    }

    #[test]
    #[serial]
    fn env_vars_override_defaults() {
        std::env::set_var("HONEYPOT_HOSTNAME", "test-host-01");
        std::env::set_var("CONTAINER_TTL_MINUTES", "5");
        let cfg = Config::load(None).expect("env-driven config must be valid");
        assert_eq!(cfg.honeypot_hostname, "test-host-01");
        assert_eq!(cfg.container_ttl, Duration::from_secs(5 * 60));
        std::env::remove_var("HONEYPOT_HOSTNAME");
        std::env::remove_var("CONTAINER_TTL_MINUTES");
    }

    #[test]
    #[serial]
    fn rejects_unknown_storage_backend() {
        std::env::set_var("STORAGE_BACKEND", "mongo");
        let err = Config::load(None).unwrap_err();
        assert!(matches!(err, ConfigError::NotInRange(_)));
        std::env::remove_var("STORAGE_BACKEND");
    }
}
