//! Server-side SSH protocol adapter.
//!
//! `server::SshServer` is the `russh::server::Server` factory; each accepted
//! TCP connection gets its own `SshSession` (`russh::server::Handler`) and
//! `ConnectionContext` (the deferred session id, captured auth/exec state,
//! and the resize-forwarding slot the shell bridge installs).

pub mod connection_context;
pub mod keys;
pub mod server;

pub use connection_context::ConnectionContext;
pub use server::{SshServer, SshSession};
