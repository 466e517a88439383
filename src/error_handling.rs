pub mod types;

pub use types::{
    BridgeError, ConfigError, ContainerError, ControllerError, SftpError, SshError, StorageError,
};
