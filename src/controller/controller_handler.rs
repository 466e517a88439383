use crate::configuration::{Config, StorageBackend};
use crate::container_management::ContainerManager;
use crate::error_handling::types::{ControllerError, SshError};
use crate::session_management::session_manager::SessionManager;
use crate::ssh::server::SshServer;
use crate::storage::file_gateway::FileGateway;
use crate::storage::sqlite_gateway::SqliteGateway;
use crate::storage::PersistenceGateway;
use log::{error, info, warn};
use russh::server::Server as _;
use russh::SshId;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpSocket;

/// Owns every long-lived subsystem and drives the accept loop. One
/// `ContainerManager`, one persistence gateway and one `SessionManager` are
/// shared across every accepted connection via `Arc`.
pub struct Controller {
    config: Arc<Config>,
    gateway: Arc<dyn PersistenceGateway>,
    container_manager: Arc<ContainerManager>,
    session_manager: Arc<SessionManager>,
}

impl Controller {
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        let config = Arc::new(config);

        let gateway: Arc<dyn PersistenceGateway> = match config.storage_backend {
            StorageBackend::Sqlite => {
                info!("using the SQLite persistence backend at {}", config.db_path.display());
                Arc::new(SqliteGateway::connect(&config.db_path, &config.file_storage_dir).await?)
            }
            StorageBackend::File => {
                info!(
                    "using the flat-file persistence backend at {}",
                    config.file_storage_dir.display()
                );
                Arc::new(FileGateway::open(config.file_storage_dir.clone())?)
            }
        };

        let container_manager = Arc::new(ContainerManager::new(config.clone()).await?);
        let session_manager = Arc::new(SessionManager::new());

        Ok(Self {
            config,
            gateway,
            container_manager,
            session_manager,
        })
    }

    /// Binds the listening socket and runs the SSH server until a shutdown
    /// signal arrives, then drains every active session.
    pub async fn run(self) -> Result<(), ControllerError> {
        let host_key = crate::ssh::keys::load_host_key(&self.config.host_key_path)?;

        let server_config = russh::server::Config {
            auth_rejection_time: std::time::Duration::from_secs(1),
            auth_rejection_time_initial: Some(std::time::Duration::from_secs(0)),
            server_id: SshId::Standard(self.config.ssh_banner.clone()),
            keys: vec![host_key],
            methods: (&[russh::MethodKind::Password, russh::MethodKind::PublicKey])
                .as_slice()
                .into(),
            ..Default::default()
        };
        let server_config = Arc::new(server_config);

        let mut server = SshServer::new(
            self.config.clone(),
            self.gateway.clone(),
            self.container_manager.clone(),
            self.session_manager.clone(),
        );

        let socket = bind_with_reuse(self.config.bind_address)
            .map_err(|e| ControllerError::Ssh(SshError::IoError(e)))?;
        info!("listening for SSH connections on {}", self.config.bind_address);

        tokio::select! {
            result = server.run_on_socket(server_config, &socket) => {
                if let Err(e) = result {
                    error!("SSH server loop ended with error: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, draining active sessions");
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        let drained = self.session_manager.drain_all().await;
        info!("draining {} active session(s)", drained.len());
        for session in drained {
            if let Some(container_id) = &session.container_id {
                if let Err(e) = self.container_manager.destroy(container_id).await {
                    warn!("failed to destroy container {container_id} during shutdown: {e}");
                }
            }
            if let Err(e) = self.gateway.end_session(session.session_id).await {
                warn!(
                    "failed to close out session {} during shutdown: {e}",
                    session.session_id
                );
            }
        }
    }
}

/// Binds with `SO_REUSEADDR` and a 100-connection backlog so a restart
/// doesn't have to wait out `TIME_WAIT` on the old socket.
fn bind_with_reuse(addr: SocketAddr) -> io::Result<tokio::net::TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(100)
}
