//! Core types used by the container management subsystem.

use chrono::{DateTime, Utc};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Aggregate counters describing the current and historical container state.
#[derive(Debug, Clone, Default)]
pub struct ContainerStats {
    pub active_count: usize,
    pub total_created: u64,
    pub failed_count: u64,
}

/// A live interactive exec session inside a session container: a PTY (or
/// plain pipe, for a one-shot `exec`) bridged to two channels so the bridge
/// can forward bytes without holding a lock on the Docker client.
pub struct ExecSession {
    pub exec_id: String,
    pub output_rx: mpsc::Receiver<Vec<u8>>,
    pub input_tx: mpsc::Sender<Vec<u8>>,
    pub alive: Arc<AtomicBool>,
}

#[derive(Debug, Clone)]
pub struct ContainerRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
}
