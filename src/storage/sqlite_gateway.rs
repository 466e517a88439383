use crate::error_handling::types::StorageError;
use crate::session_management::session::Credential;
use crate::storage::blob_store::BlobStore;
use crate::storage::db_entities::{keystrokes, sessions, uploads};
use crate::storage::gateway::{with_gateway_timeout, PersistenceGateway};
use crate::storage::types::Direction;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use log::warn;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, DbBackend, EntityTrait, Set,
    Statement,
};
use std::net::SocketAddr;
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

const QUEUE_DEPTH: usize = 1024;

enum Command {
    CreateSession {
        source_addr: SocketAddr,
        username: String,
        credential: Credential,
        reply: oneshot::Sender<Result<Uuid, StorageError>>,
    },
    SetContainer {
        session_id: Uuid,
        container_id: String,
        reply: oneshot::Sender<Result<(), StorageError>>,
    },
    EndSession {
        session_id: Uuid,
        reply: oneshot::Sender<Result<(), StorageError>>,
    },
    Keystroke {
        session_id: Uuid,
        direction: Direction,
        data: Vec<u8>,
    },
    Upload {
        session_id: Uuid,
        filename: String,
        content: Vec<u8>,
    },
}

pub struct SqliteGateway {
    tx: mpsc::Sender<Command>,
}

impl SqliteGateway {
    pub async fn connect(db_path: &Path, blob_root: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let dsn = format!("sqlite://{}?mode=rwc", db_path.display());
        let conn = Database::connect(dsn)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        bootstrap_schema(&conn).await?;
        let blobs = BlobStore::new(blob_root)?;

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(run_worker(conn, blobs, rx));
        Ok(Self { tx })
    }

    async fn call<T, F>(&self, make: F) -> Result<T, StorageError>
    where
        F: FnOnce(oneshot::Sender<Result<T, StorageError>>) -> Command,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = make(reply_tx);
        self.tx
            .send(cmd)
            .await
            .map_err(|_| StorageError::ChannelClosed)?;
        with_gateway_timeout(async {
            reply_rx.await.map_err(|_| StorageError::ChannelClosed)?
        })
        .await
    }
}

async fn bootstrap_schema(conn: &DatabaseConnection) -> Result<(), StorageError> {
    for stmt in [
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            source_addr TEXT NOT NULL,
            username TEXT NOT NULL,
            credential_kind TEXT NOT NULL,
            credential_value TEXT NOT NULL,
            container_id TEXT,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            duration_seconds INTEGER,
            status TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS keystrokes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            direction TEXT NOT NULL,
            data_base64 TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS uploads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            file_ref TEXT NOT NULL
        )",
    ] {
        conn.execute(Statement::from_string(DbBackend::Sqlite, stmt.to_owned()))
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
    }
    Ok(())
}

async fn run_worker(conn: DatabaseConnection, blobs: BlobStore, mut rx: mpsc::Receiver<Command>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::CreateSession {
                source_addr,
                username,
                credential,
                reply,
            } => {
                let id = Uuid::new_v4();
                let (kind, value) = match &credential {
                    Credential::Password(p) => ("password", p.clone()),
                    Credential::PublicKeyFingerprint(fp) => ("publickey", fp.clone()),
                };
                let model = sessions::ActiveModel {
                    id: Set(id.to_string()),
                    source_addr: Set(source_addr.to_string()),
                    username: Set(username),
                    credential_kind: Set(kind.to_string()),
                    credential_value: Set(value),
                    container_id: Set(None),
                    started_at: Set(Utc::now().to_rfc3339()),
                    ended_at: Set(None),
                    duration_seconds: Set(None),
                    status: Set("active".to_string()),
                };
                let result = model
                    .insert(&conn)
                    .await
                    .map(|_| id)
                    .map_err(|e| StorageError::WriteFailed(e.to_string()));
                let _ = reply.send(result);
            }
            Command::SetContainer {
                session_id,
                container_id,
                reply,
            } => {
                let result = update_session_container(&conn, session_id, container_id).await;
                let _ = reply.send(result);
            }
            Command::EndSession { session_id, reply } => {
                let result = finish_session(&conn, session_id).await;
                let _ = reply.send(result);
            }
            Command::Keystroke {
                session_id,
                direction,
                data,
            } => {
                let model = keystrokes::ActiveModel {
                    id: sea_orm::NotSet,
                    session_id: Set(session_id.to_string()),
                    timestamp: Set(Utc::now().to_rfc3339()),
                    direction: Set(direction.as_str().to_string()),
                    data_base64: Set(BASE64.encode(&data)),
                };
                if let Err(e) = model.insert(&conn).await {
                    warn!("failed to persist keystroke chunk for {session_id}: {e}");
                }
            }
            Command::Upload {
                session_id,
                filename,
                content,
            } => {
                let size_bytes = content.len() as i64;
                match blobs.put(&content) {
                    Ok((hash, file_ref)) => {
                        let model = uploads::ActiveModel {
                            id: sea_orm::NotSet,
                            session_id: Set(session_id.to_string()),
                            filename: Set(filename),
                            size_bytes: Set(size_bytes),
                            content_hash: Set(hash),
                            uploaded_at: Set(Utc::now().to_rfc3339()),
                            file_ref: Set(file_ref),
                        };
                        if let Err(e) = model.insert(&conn).await {
                            warn!("failed to persist upload record for {session_id}: {e}");
                        }
                    }
                    Err(e) => warn!("failed to store upload blob for {session_id}: {e}"),
                }
            }
        }
    }
}

async fn update_session_container(
    conn: &DatabaseConnection,
    session_id: Uuid,
    container_id: String,
) -> Result<(), StorageError> {
    let existing = sessions::Entity::find_by_id(session_id.to_string())
        .one(conn)
        .await
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
    let Some(existing) = existing else {
        warn!("set_container for unknown session {session_id}");
        return Ok(());
    };
    let mut active: sessions::ActiveModel = existing.into();
    active.container_id = Set(Some(container_id));
    active
        .update(conn)
        .await
        .map(|_| ())
        .map_err(|e| StorageError::WriteFailed(e.to_string()))
}

async fn finish_session(conn: &DatabaseConnection, session_id: Uuid) -> Result<(), StorageError> {
    let existing = sessions::Entity::find_by_id(session_id.to_string())
        .one(conn)
        .await
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
    let Some(existing) = existing else {
        warn!("end_session for unknown session {session_id}, ignoring");
        return Ok(());
    };
    let started_at = chrono::DateTime::parse_from_rfc3339(&existing.started_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let now = Utc::now();
    let duration_seconds = (now - started_at).num_seconds().max(0);

    let mut active: sessions::ActiveModel = existing.into();
    active.ended_at = Set(Some(now.to_rfc3339()));
    active.duration_seconds = Set(Some(duration_seconds));
    active.status = Set("completed".to_string());
    active
        .update(conn)
        .await
        .map(|_| ())
        .map_err(|e| StorageError::WriteFailed(e.to_string()))
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn create_session(
        &self,
        source_addr: SocketAddr,
        username: String,
        credential: Credential,
    ) -> Result<Uuid, StorageError> {
        self.call(|reply| Command::CreateSession {
            source_addr,
            username,
            credential,
            reply,
        })
        .await
    }

    async fn set_container(
        &self,
        session_id: Uuid,
        container_id: String,
    ) -> Result<(), StorageError> {
        self.call(|reply| Command::SetContainer {
            session_id,
            container_id,
            reply,
        })
        .await
    }

    async fn end_session(&self, session_id: Uuid) -> Result<(), StorageError> {
        self.call(|reply| Command::EndSession { session_id, reply })
            .await
    }

    fn record_keystroke(&self, session_id: Uuid, direction: Direction, data: Vec<u8>) {
        if let Err(e) = self.tx.try_send(Command::Keystroke {
            session_id,
            direction,
            data,
        }) {
            warn!("keystroke chunk dropped for {session_id}: {e}");
        }
    }

    fn record_upload(&self, session_id: Uuid, filename: String, content: Vec<u8>) {
        if let Err(e) = self.tx.try_send(Command::Upload {
            session_id,
            filename,
            content,
        }) {
            warn!("upload record dropped for {session_id}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_set_container_and_end_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = SqliteGateway::connect(&dir.path().join("test.sqlite3"), &dir.path().join("blobs"))
            .await
            .unwrap();

        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let id = gateway
            .create_session(addr, "root".into(), Credential::Password("toor".into()))
            .await
            .unwrap();

        gateway.set_container(id, "abc123".into()).await.unwrap();
        gateway.end_session(id).await.unwrap();
        // Ending an unknown session id must not error.
        gateway.end_session(Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn keystroke_and_upload_are_fire_and_forget() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = SqliteGateway::connect(&dir.path().join("test.sqlite3"), &dir.path().join("blobs"))
            .await
            .unwrap();
        let addr: SocketAddr = "127.0.0.1:5001".parse().unwrap();
        let id = gateway
            .create_session(addr, "admin".into(), Credential::Password("hunter2".into()))
            .await
            .unwrap();
        gateway.record_keystroke(id, Direction::Input, b"ls -la\n".to_vec());
        gateway.record_upload(id, "payload.sh".into(), b"#!/bin/sh\necho pwned\n".to_vec());
        // Allow the worker to drain before dropping the temp dir.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}
