use crate::configuration::Config;
use crate::container_management::types::{ContainerStats, ExecSession};
use crate::error_handling::types::ContainerError;
use bollard::container::{
    Config as DockerContainerConfig, CreateContainerOptions, RemoveContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, Network};
use bollard::network::CreateNetworkOptions;
use bollard::Docker;
use futures_util::StreamExt;
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const EXEC_ENV: &[&str] = &["TERM=xterm-256color", "LANG=en_US.UTF-8", "HOME=/root"];

/// Creates, execs into, resizes and destroys the ephemeral sandbox
/// containers session connections run inside.
pub struct ContainerManager {
    docker: Docker,
    config: Arc<Config>,
    stats: Mutex<ContainerStats>,
}

impl ContainerManager {
    pub async fn new(config: Arc<Config>) -> Result<Self, ContainerError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            error!("failed to connect to the Docker daemon: {e}");
            ContainerError::RuntimeNotAvailable
        })?;
        let manager = Self {
            docker,
            config,
            stats: Mutex::new(ContainerStats::default()),
        };
        manager.ensure_network().await?;
        Ok(manager)
    }

    async fn ensure_network(&self) -> Result<(), ContainerError> {
        let existing: Vec<Network> = self
            .docker
            .list_networks::<String>(None)
            .await
            .map_err(|e| ContainerError::NetworkSetupFailed(e.to_string()))?;
        let name = &self.config.honeypot_network;
        if existing.iter().any(|n| n.name.as_deref() == Some(name)) {
            return Ok(());
        }
        info!("creating isolated bridge network {name}");
        self.docker
            .create_network(CreateNetworkOptions {
                name: name.as_str(),
                driver: "bridge",
                internal: true,
                ..Default::default()
            })
            .await
            .map_err(|e| ContainerError::NetworkSetupFailed(e.to_string()))?;
        Ok(())
    }

    /// Creates a fresh sandbox container for `session_id`, arms its TTL
    /// auto-destruct timer, and returns the Docker container id.
    pub async fn create(self: &Arc<Self>, session_id: Uuid) -> Result<String, ContainerError> {
        self.pull_image_if_missing().await;

        let short = &session_id.to_string()[..8];
        let name = format!("honeyshell-{short}");

        let cpu_period: i64 = 100_000;
        let cpu_quota = (cpu_period as f64 * self.config.container_cpu_limit) as i64;
        let memory = parse_memory_limit(&self.config.container_memory_limit)?;

        let extra_hosts: Vec<String> = crate::configuration::types::decoy_hosts()
            .into_iter()
            .map(|(host, ip)| format!("{host}:{ip}"))
            .collect();

        let mut labels = HashMap::new();
        labels.insert("honeyshell.session_id".to_string(), session_id.to_string());

        let host_config = HostConfig {
            network_mode: Some(self.config.honeypot_network.clone()),
            cpu_period: Some(cpu_period),
            cpu_quota: Some(cpu_quota),
            memory: Some(memory),
            memory_swap: Some(memory),
            extra_hosts: Some(extra_hosts),
            privileged: Some(false),
            ..Default::default()
        };

        let container_config = DockerContainerConfig {
            image: Some(self.config.honeypot_image.clone()),
            hostname: Some(self.config.honeypot_hostname.clone()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            open_stdin: Some(true),
            host_config: Some(host_config),
            labels: Some(labels),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                container_config,
            )
            .await
            .map_err(|e| ContainerError::CreationFailed(e.to_string()))?;

        self.docker
            .start_container::<String>(&created.id, None)
            .await
            .map_err(|e| ContainerError::StartFailed(e.to_string()))?;

        {
            let mut stats = self.stats.lock().await;
            stats.active_count += 1;
            stats.total_created += 1;
        }

        self.arm_ttl_timer(created.id.clone());
        Ok(created.id)
    }

    fn arm_ttl_timer(self: &Arc<Self>, container_id: String) {
        let manager = Arc::clone(self);
        let ttl = self.config.container_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            info!("container {container_id} hit its TTL, destroying");
            if let Err(e) = manager.destroy(&container_id).await {
                warn!("TTL auto-destruct failed for {container_id}: {e}");
            }
        });
    }

    async fn pull_image_if_missing(&self) {
        let image = &self.config.honeypot_image;
        if self.docker.inspect_image(image).await.is_ok() {
            return;
        }
        info!("pulling honeypot image {image}");
        let mut stream = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: image.as_str(),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = stream.next().await {
            if let Err(e) = progress {
                warn!("error pulling image {image}: {e}");
                break;
            }
        }
    }

    /// Opens an interactive exec into `container_id` running `argv`, wiring
    /// its stdio to a pair of channels the caller drives without touching
    /// the Docker client again.
    pub async fn open_exec(
        &self,
        container_id: &str,
        argv: Vec<String>,
        tty: bool,
        width: u16,
        height: u16,
    ) -> Result<ExecSession, ContainerError> {
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(tty),
                    cmd: Some(argv),
                    env: Some(EXEC_ENV.iter().map(|s| s.to_string()).collect()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ContainerError::ExecFailed(e.to_string()))?;

        let start = self
            .docker
            .start_exec(
                &exec.id,
                Some(StartExecOptions {
                    detach: false,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| ContainerError::ExecFailed(e.to_string()))?;

        let StartExecResults::Attached { mut output, input } = start else {
            return Err(ContainerError::ExecFailed(
                "exec started detached unexpectedly".to_string(),
            ));
        };

        if tty {
            if let Err(e) = self
                .docker
                .resize_exec(&exec.id, ResizeExecOptions { height, width })
                .await
            {
                warn!("initial exec resize failed for {}: {e}", exec.id);
            }
        }

        let alive = Arc::new(AtomicBool::new(true));
        let (output_tx, output_rx) = tokio::sync::mpsc::channel::<Vec<u8>>(256);
        let (input_tx, mut input_rx) = tokio::sync::mpsc::channel::<Vec<u8>>(256);

        let reader_alive = alive.clone();
        tokio::spawn(async move {
            use bollard::container::LogOutput;
            while reader_alive.load(Ordering::Relaxed) {
                match output.next().await {
                    Some(Ok(LogOutput::StdOut { message }))
                    | Some(Ok(LogOutput::StdErr { message }))
                    | Some(Ok(LogOutput::Console { message })) => {
                        if output_tx.send(message.to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("exec output stream error: {e}");
                        break;
                    }
                    None => break,
                }
            }
            reader_alive.store(false, Ordering::Relaxed);
        });

        let writer_alive = alive.clone();
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut input = input;
            while writer_alive.load(Ordering::Relaxed) {
                match input_rx.recv().await {
                    Some(data) => {
                        if input.write_all(&data).await.is_err() || input.flush().await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        });

        Ok(ExecSession {
            exec_id: exec.id,
            output_rx,
            input_tx,
            alive,
        })
    }

    pub async fn resize(&self, exec_id: &str, width: u16, height: u16) {
        if let Err(e) = self
            .docker
            .resize_exec(exec_id, ResizeExecOptions { height, width })
            .await
        {
            warn!("resize_exec failed for {exec_id}: {e}");
        }
    }

    /// Stops and removes the container. Idempotent: a not-found container
    /// is treated as already destroyed, not an error.
    pub async fn destroy(&self, container_id: &str) -> Result<(), ContainerError> {
        match self
            .docker
            .stop_container(container_id, Some(StopContainerOptions { t: 5 }))
            .await
        {
            Ok(()) => {}
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Ok(()),
            Err(e) => warn!("stop_container failed for {container_id}: {e}"),
        }

        match self
            .docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => {
                let mut stats = self.stats.lock().await;
                stats.active_count = stats.active_count.saturating_sub(1);
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => {
                error!("remove_container failed for {container_id}: {e}");
                let mut stats = self.stats.lock().await;
                stats.failed_count += 1;
                return Err(ContainerError::ProcessError(e.to_string()));
            }
        }
        Ok(())
    }

    pub async fn stats(&self) -> ContainerStats {
        self.stats.lock().await.clone()
    }
}

fn parse_memory_limit(spec: &str) -> Result<i64, ContainerError> {
    let spec = spec.trim();
    let (number, multiplier) = match spec.chars().last() {
        Some('k') | Some('K') => (&spec[..spec.len() - 1], 1024i64),
        Some('m') | Some('M') => (&spec[..spec.len() - 1], 1024 * 1024),
        Some('g') | Some('G') => (&spec[..spec.len() - 1], 1024 * 1024 * 1024),
        _ => (spec, 1),
    };
    number
        .parse::<i64>()
        .map(|n| n * multiplier)
        .map_err(|_| ContainerError::CreationFailed(format!("invalid memory limit {spec}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_limit_parsing() {
        assert_eq!(parse_memory_limit("256m").unwrap(), 256 * 1024 * 1024);
        assert_eq!(parse_memory_limit("1g").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_memory_limit("512k").unwrap(), 512 * 1024);
        assert_eq!(parse_memory_limit("1024").unwrap(), 1024);
        assert!(parse_memory_limit("not-a-size").is_err());
    }
}
