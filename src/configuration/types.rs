use serde::Deserialize;
use std::collections::BTreeMap;

/// Partial configuration as read from the optional TOML file. Every field is
/// optional: anything left unset falls through to the environment variable
/// of the same concern, then to the hardcoded default in `Config::load`.
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    pub bind_address: Option<String>,
    pub host_key_path: Option<String>,
    pub ssh_banner: Option<String>,
    pub honeypot_image: Option<String>,
    pub honeypot_network: Option<String>,
    pub container_cpu_limit: Option<f64>,
    pub container_memory_limit: Option<String>,
    pub container_ttl_minutes: Option<u64>,
    pub honeypot_hostname: Option<String>,
    pub sftp_root: Option<String>,
    pub storage_backend: Option<String>,
    pub db_path: Option<String>,
    pub file_storage_dir: Option<String>,
}

/// Fixed decoy DNS entries injected into every session container via
/// `extra_hosts`. Not attacker- or deployment-configurable: these are part
/// of the fixed "web-prod-01" cover story.
pub fn decoy_hosts() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("db-internal", "10.0.1.10"),
        ("redis-internal", "10.0.1.11"),
        ("api-internal", "10.0.1.12"),
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    File,
}
