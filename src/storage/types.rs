//! Types shared by the persistence gateway and its backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a captured keystroke chunk, relative to the attacker:
/// bytes the attacker typed (`Input`) vs bytes the container produced
/// (`Output`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystrokeChunk {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub session_id: Uuid,
    pub filename: String,
    pub size_bytes: u64,
    pub content_hash: String,
    pub uploaded_at: DateTime<Utc>,
    pub file_ref: String,
}
