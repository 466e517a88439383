use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use uuid::Uuid;

/// Runtime mirror of a live session, held by the `SessionManager` for as
/// long as the SSH connection is open. The canonical record lives behind
/// the persistence gateway; this is just enough to drive cleanup.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub session_id: Uuid,
    pub source_addr: SocketAddr,
    pub container_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ActiveSession {
    pub fn new(session_id: Uuid, source_addr: SocketAddr) -> Self {
        Self {
            session_id,
            source_addr,
            container_id: None,
            started_at: Utc::now(),
        }
    }
}
