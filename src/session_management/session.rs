use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

/// How the attacker authenticated. Both methods always succeed; this just
/// records which one, and with what credential, was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Credential {
    Password(String),
    PublicKeyFingerprint(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Completed,
}

/// The top-level session record. Created at first accepted auth attempt,
/// mutated exactly twice more: once to record the spawned container id,
/// once to close it out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub source_addr: SocketAddr,
    pub username: String,
    pub credential: Credential,
    pub container_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub status: SessionStatus,
}
