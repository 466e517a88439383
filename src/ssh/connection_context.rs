use crate::configuration::Config;
use crate::container_management::ContainerManager;
use crate::session_management::session::Credential;
use crate::session_management::session_manager::SessionManager;
use crate::storage::PersistenceGateway;
use russh::server;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct PtySize {
    pub width: u16,
    pub height: u16,
}

impl Default for PtySize {
    fn default() -> Self {
        Self {
            width: 80,
            height: 24,
        }
    }
}

/// Per-connection state shared between the SSH `Handler` callbacks and the
/// shell bridge task they spawn.
///
/// The session id is the textbook "deferred, single-assignment value with
/// bounded wait": it's unknown until the persistence gateway's
/// `create_session` call returns, but the SFTP subsystem and the shell
/// bridge both need to read it from a different task than the one that
/// resolves it. A `watch` channel gives every waiter its own handle and its
/// own timeout without any of them consuming the value.
pub struct ConnectionContext {
    pub source_addr: SocketAddr,
    pub config: Arc<Config>,
    pub gateway: Arc<dyn PersistenceGateway>,
    pub container_manager: Arc<ContainerManager>,
    pub session_manager: Arc<SessionManager>,

    session_id_tx: watch::Sender<Option<Uuid>>,
    session_id_rx: watch::Receiver<Option<Uuid>>,

    pub username: Mutex<Option<String>>,
    pub credential: Mutex<Option<Credential>>,
    pub pty: Mutex<Option<PtySize>>,
    pub exec_command: Mutex<Option<String>>,
    pub container_id: Mutex<Option<String>>,
    pub resize_tx: Mutex<Option<mpsc::Sender<(u16, u16)>>>,
    pub handle: Mutex<Option<server::Handle>>,
    pub first_channel_opened: AtomicBool,
    cleanup_done: AtomicBool,
}

impl ConnectionContext {
    pub fn new(
        source_addr: SocketAddr,
        config: Arc<Config>,
        gateway: Arc<dyn PersistenceGateway>,
        container_manager: Arc<ContainerManager>,
        session_manager: Arc<SessionManager>,
    ) -> Self {
        let (session_id_tx, session_id_rx) = watch::channel(None);
        Self {
            source_addr,
            config,
            gateway,
            container_manager,
            session_manager,
            session_id_tx,
            session_id_rx,
            username: Mutex::new(None),
            credential: Mutex::new(None),
            pty: Mutex::new(None),
            exec_command: Mutex::new(None),
            container_id: Mutex::new(None),
            resize_tx: Mutex::new(None),
            handle: Mutex::new(None),
            first_channel_opened: AtomicBool::new(false),
            cleanup_done: AtomicBool::new(false),
        }
    }

    pub fn resolve_session_id(&self, id: Uuid) {
        let _ = self.session_id_tx.send(Some(id));
    }

    /// Waits up to `timeout` for the session id to resolve. Every caller
    /// gets its own clone of the receiver, so the SFTP handler and the
    /// shell bridge can both wait independently without racing each other.
    pub async fn wait_session_id(&self, timeout: Duration) -> Option<Uuid> {
        let mut rx = self.session_id_rx.clone();
        if let Some(id) = *rx.borrow() {
            return Some(id);
        }
        tokio::time::timeout(timeout, async {
            loop {
                if rx.changed().await.is_err() {
                    return None;
                }
                if let Some(id) = *rx.borrow() {
                    return Some(id);
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    /// Runs the connection's teardown exactly once, regardless of which
    /// failure path triggered it: destroy the container (if one was
    /// created) and close out the persisted session record.
    pub async fn cleanup(&self) {
        if self.cleanup_done.swap(true, Ordering::SeqCst) {
            return;
        }
        let container_id = self.container_id.lock().await.take();
        if let Some(container_id) = container_id {
            if let Err(e) = self.container_manager.destroy(&container_id).await {
                log::warn!("failed to destroy container {container_id}: {e}");
            }
        }
        if let Some(session_id) = *self.session_id_rx.borrow() {
            self.session_manager.end(session_id).await;
            if let Err(e) = self.gateway.end_session(session_id).await {
                log::warn!("failed to close out session {session_id}: {e}");
            }
        }
    }
}
