//! Top-level wiring: binds the listening socket, constructs the shared
//! subsystems (persistence gateway, container manager, session registry),
//! and runs the `russh` server until shutdown.

pub mod controller_handler;

pub use controller_handler::Controller;
