//! Virtualized SFTP subsystem (C4).
//!
//! Each session gets a scratch directory under the configured SFTP root,
//! named by the first 8 hex characters of its session id (or the literal
//! `unknown` if the id hasn't resolved yet by the time the subsystem opens).
//! All paths the attacker sends are normalized and re-verified against that
//! root before touching the filesystem.

pub mod handler;
pub mod path;

pub use handler::SftpHandler;
