//! Per-component error taxonomy.
//!
//! Each enum corresponds to one failure class from the error handling
//! design: transport/auth (`SshError`), container lifecycle
//! (`ContainerError`), persistence (`StorageError`), the attacker<->
//! container bridge (`BridgeError`), the SFTP subsystem (`SftpError`), and
//! configuration loading (`ConfigError`). `ControllerError` wraps whichever
//! of these ends a connection's lifecycle so the orchestrator has one type
//! to log and move on from.

use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    InvalidFormat,
    MissingField(String),
    IoError(std::io::Error),
    TomlError(String),
    NotInRange(String),
    DirectoryDoesNotExist(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidFormat => write!(f, "invalid configuration format"),
            ConfigError::MissingField(field) => write!(f, "missing configuration field: {field}"),
            ConfigError::IoError(err) => write!(f, "configuration I/O error: {err}"),
            ConfigError::TomlError(msg) => write!(f, "configuration TOML error: {msg}"),
            ConfigError::NotInRange(msg) => write!(f, "configuration value out of range: {msg}"),
            ConfigError::DirectoryDoesNotExist(path) => {
                write!(f, "configured directory does not exist: {path}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum ContainerError {
    RuntimeNotAvailable,
    NetworkSetupFailed(String),
    CreationFailed(String),
    StartFailed(String),
    ExecFailed(String),
    NotFound(String),
    IoError(std::io::Error),
    ProcessError(String),
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerError::RuntimeNotAvailable => write!(f, "container runtime is not available"),
            ContainerError::NetworkSetupFailed(msg) => {
                write!(f, "isolated network setup failed: {msg}")
            }
            ContainerError::CreationFailed(msg) => write!(f, "container creation failed: {msg}"),
            ContainerError::StartFailed(msg) => write!(f, "container start failed: {msg}"),
            ContainerError::ExecFailed(msg) => write!(f, "container exec failed: {msg}"),
            ContainerError::NotFound(id) => write!(f, "container not found: {id}"),
            ContainerError::IoError(err) => write!(f, "container I/O error: {err}"),
            ContainerError::ProcessError(msg) => write!(f, "container process error: {msg}"),
        }
    }
}

impl std::error::Error for ContainerError {}

impl From<std::io::Error> for ContainerError {
    fn from(err: std::io::Error) -> Self {
        ContainerError::IoError(err)
    }
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        ContainerError::CreationFailed(err.to_string())
    }
}

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed(String),
    WriteFailed(String),
    ReadFailed(String),
    Timeout,
    ChannelClosed,
    IoError(std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(msg) => write!(f, "storage connection failed: {msg}"),
            StorageError::WriteFailed(msg) => write!(f, "storage write failed: {msg}"),
            StorageError::ReadFailed(msg) => write!(f, "storage read failed: {msg}"),
            StorageError::Timeout => write!(f, "storage operation timed out"),
            StorageError::ChannelClosed => write!(f, "storage worker channel closed"),
            StorageError::IoError(err) => write!(f, "storage I/O error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err)
    }
}

impl From<sea_orm::DbErr> for StorageError {
    fn from(err: sea_orm::DbErr) -> Self {
        StorageError::WriteFailed(err.to_string())
    }
}

#[derive(Debug)]
pub enum SshError {
    HostKeyUnavailable(String),
    HandshakeFailed(String),
    ChannelAcceptTimeout,
    Protocol(String),
    IoError(std::io::Error),
}

impl fmt::Display for SshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SshError::HostKeyUnavailable(msg) => write!(f, "host key unavailable: {msg}"),
            SshError::HandshakeFailed(msg) => write!(f, "SSH handshake failed: {msg}"),
            SshError::ChannelAcceptTimeout => write!(f, "timed out waiting for first channel"),
            SshError::Protocol(msg) => write!(f, "SSH protocol error: {msg}"),
            SshError::IoError(err) => write!(f, "SSH transport I/O error: {err}"),
        }
    }
}

impl std::error::Error for SshError {}

impl From<std::io::Error> for SshError {
    fn from(err: std::io::Error) -> Self {
        SshError::IoError(err)
    }
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::Protocol(err.to_string())
    }
}

#[derive(Debug)]
pub enum SftpError {
    PathEscape(String),
    NotFound,
    PermissionDenied,
    IoError(std::io::Error),
}

impl fmt::Display for SftpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SftpError::PathEscape(path) => write!(f, "path escapes session root: {path}"),
            SftpError::NotFound => write!(f, "no such file or directory"),
            SftpError::PermissionDenied => write!(f, "permission denied"),
            SftpError::IoError(err) => write!(f, "SFTP I/O error: {err}"),
        }
    }
}

impl std::error::Error for SftpError {}

impl From<std::io::Error> for SftpError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => SftpError::NotFound,
            std::io::ErrorKind::PermissionDenied => SftpError::PermissionDenied,
            _ => SftpError::IoError(err),
        }
    }
}

#[derive(Debug)]
pub enum BridgeError {
    ExecStreamClosed,
    Container(ContainerError),
    IoError(std::io::Error),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::ExecStreamClosed => write!(f, "container exec stream closed unexpectedly"),
            BridgeError::Container(err) => write!(f, "{err}"),
            BridgeError::IoError(err) => write!(f, "bridge I/O error: {err}"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::IoError(err)
    }
}

impl From<ContainerError> for BridgeError {
    fn from(err: ContainerError) -> Self {
        BridgeError::Container(err)
    }
}

/// Whatever ended a connection's lifecycle, wrapped so the orchestrator has
/// one type to log before running its cleanup guard.
#[derive(Debug)]
pub enum ControllerError {
    Ssh(SshError),
    Container(ContainerError),
    Storage(StorageError),
    Sftp(SftpError),
    Bridge(BridgeError),
    Config(ConfigError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::Ssh(err) => write!(f, "{err}"),
            ControllerError::Container(err) => write!(f, "{err}"),
            ControllerError::Storage(err) => write!(f, "{err}"),
            ControllerError::Sftp(err) => write!(f, "{err}"),
            ControllerError::Bridge(err) => write!(f, "{err}"),
            ControllerError::Config(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<SshError> for ControllerError {
    fn from(err: SshError) -> Self {
        ControllerError::Ssh(err)
    }
}

impl From<ContainerError> for ControllerError {
    fn from(err: ContainerError) -> Self {
        ControllerError::Container(err)
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::Storage(err)
    }
}

impl From<SftpError> for ControllerError {
    fn from(err: SftpError) -> Self {
        ControllerError::Sftp(err)
    }
}

impl From<BridgeError> for ControllerError {
    fn from(err: BridgeError) -> Self {
        ControllerError::Bridge(err)
    }
}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::Config(err)
    }
}
