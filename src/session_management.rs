//! Session lifecycle tracking.
//!
//! A `Session` is the persisted record (owned by the persistence gateway);
//! an `ActiveSession` is the orchestrator's lightweight runtime mirror of it
//! while the underlying SSH connection is still open.

pub mod active_session;
pub mod session;
pub mod session_manager;

pub use session::{Credential, Session, SessionStatus};
