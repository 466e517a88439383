//! Persistence gateway.
//!
//! Defines the async `PersistenceGateway` trait and two reference
//! backends: `SqliteGateway` (SeaORM over SQLite) and `FileGateway` (flat
//! files). Both run their actual I/O on a single background worker task
//! drained from an internal queue — the "cross-loop submission" design —
//! so the SSH/bridge tasks never block on a lock around a shared
//! connection.

pub mod blob_store;
pub mod db_entities;
pub mod file_gateway;
pub mod gateway;
pub mod sqlite_gateway;
pub mod types;

pub use gateway::PersistenceGateway;
pub use types::{Direction, KeystrokeChunk, UploadRecord};
