//! Attacker<->container bridge: bidirectional copy loop between an SSH
//! channel and a container exec stream, with a per-chunk capture tap and a
//! resize forwarder installed on the connection context.

pub mod shell_bridge;

pub use shell_bridge::spawn_bridge;
