pub mod bridge;
pub mod configuration;
pub mod container_management;
pub mod controller;
pub mod error_handling;
pub mod session_management;
pub mod sftp;
pub mod ssh;
pub mod storage;
