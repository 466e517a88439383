use crate::error_handling::types::StorageError;
use crate::session_management::session::Credential;
use crate::storage::types::Direction;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

/// Bound on how long the orchestrator will wait for a gateway operation
/// that it must await before proceeding (create/set-container/end, and
/// the SFTP session-id lookup that goes through this same queue).
pub const GATEWAY_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Async sink for session records, keystroke chunks, and file uploads.
///
/// `record_keystroke`/`record_upload` are fire-and-forget by design: the
/// bridge and SFTP paths must never stall waiting on a persistence write.
/// `create_session`/`set_container`/`end_session` are the three ops the
/// orchestrator needs a result from, each bounded by `GATEWAY_CALL_TIMEOUT`.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn create_session(
        &self,
        source_addr: SocketAddr,
        username: String,
        credential: Credential,
    ) -> Result<Uuid, StorageError>;

    async fn set_container(&self, session_id: Uuid, container_id: String)
        -> Result<(), StorageError>;

    async fn end_session(&self, session_id: Uuid) -> Result<(), StorageError>;

    fn record_keystroke(&self, session_id: Uuid, direction: Direction, data: Vec<u8>);

    fn record_upload(&self, session_id: Uuid, filename: String, content: Vec<u8>);
}

/// Wraps a future with the gateway's standard call timeout, mapping a
/// timeout into `StorageError::Timeout`.
pub async fn with_gateway_timeout<T, F>(fut: F) -> Result<T, StorageError>
where
    F: std::future::Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout(GATEWAY_CALL_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout),
    }
}
