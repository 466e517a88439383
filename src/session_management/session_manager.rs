use crate::session_management::active_session::ActiveSession;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Registry of sessions whose SSH connection is still open.
///
/// Sessions are keyed one-to-one with an SSH connection, not matched by
/// client IP/port across reconnects — there is no dedup step, and no
/// idle-timeout sweep: a session ends exactly when its connection ends.
pub struct SessionManager {
    active: Mutex<HashMap<Uuid, ActiveSession>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, session_id: Uuid, source_addr: SocketAddr) {
        self.active
            .lock()
            .await
            .insert(session_id, ActiveSession::new(session_id, source_addr));
    }

    pub async fn set_container(&self, session_id: Uuid, container_id: String) {
        if let Some(active) = self.active.lock().await.get_mut(&session_id) {
            active.container_id = Some(container_id);
        }
    }

    /// Removes the session from the registry, handing back whatever state
    /// it held so the caller can drive container teardown.
    pub async fn end(&self, session_id: Uuid) -> Option<ActiveSession> {
        self.active.lock().await.remove(&session_id)
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Drains the registry for graceful shutdown; the caller destroys each
    /// returned session's container and closes out its persisted record.
    pub async fn drain_all(&self) -> Vec<ActiveSession> {
        self.active.lock().await.drain().map(|(_, v)| v).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_end_round_trips() {
        let mgr = SessionManager::new();
        let id = Uuid::new_v4();
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        mgr.register(id, addr).await;
        assert_eq!(mgr.active_count().await, 1);

        mgr.set_container(id, "abc123".to_string()).await;
        let ended = mgr.end(id).await.expect("session must be present");
        assert_eq!(ended.container_id.as_deref(), Some("abc123"));
        assert_eq!(mgr.active_count().await, 0);
    }

    #[tokio::test]
    async fn drain_all_empties_the_registry() {
        let mgr = SessionManager::new();
        let addr: SocketAddr = "127.0.0.1:4001".parse().unwrap();
        mgr.register(Uuid::new_v4(), addr).await;
        mgr.register(Uuid::new_v4(), addr).await;
        let drained = mgr.drain_all().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(mgr.active_count().await, 0);
    }
}
