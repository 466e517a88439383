//! Flat-file persistence backend: one `key: value` session file per
//! session, an append-only per-session keystroke log, and upload blobs
//! under a content-addressed store. Good for tests and constrained
//! deployments where a SQLite file isn't wanted.

use crate::error_handling::types::StorageError;
use crate::session_management::session::Credential;
use crate::storage::blob_store::BlobStore;
use crate::storage::gateway::{with_gateway_timeout, PersistenceGateway};
use crate::storage::types::Direction;
use async_trait::async_trait;
use chrono::Utc;
use log::warn;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
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

pub struct FileGateway {
    tx: mpsc::Sender<Command>,
}

impl FileGateway {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        let sessions_dir = root.join("sessions");
        let keystrokes_dir = root.join("keystrokes");
        let uploads_dir = root.join("uploads");
        let blobs_dir = root.join("blobs");
        for dir in [&sessions_dir, &keystrokes_dir, &uploads_dir, &blobs_dir] {
            std::fs::create_dir_all(dir)?;
        }
        let blobs = BlobStore::new(&blobs_dir)?;

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(run_worker(sessions_dir, keystrokes_dir, uploads_dir, blobs, rx));
        Ok(Self { tx })
    }

    async fn call<T, F>(&self, make: F) -> Result<T, StorageError>
    where
        F: FnOnce(oneshot::Sender<Result<T, StorageError>>) -> Command,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| StorageError::ChannelClosed)?;
        with_gateway_timeout(async {
            reply_rx.await.map_err(|_| StorageError::ChannelClosed)?
        })
        .await
    }
}

fn session_path(dir: &Path, id: Uuid) -> PathBuf {
    dir.join(format!("{id}.session"))
}

fn write_session_file(
    path: &Path,
    source_addr: SocketAddr,
    username: &str,
    credential: &Credential,
    container_id: Option<&str>,
    started_at: chrono::DateTime<Utc>,
    ended_at: Option<chrono::DateTime<Utc>>,
    duration_seconds: Option<i64>,
    status: &str,
) -> std::io::Result<()> {
    let (credential_kind, credential_value) = match credential {
        Credential::Password(p) => ("password", p.as_str()),
        Credential::PublicKeyFingerprint(fp) => ("publickey", fp.as_str()),
    };
    let mut contents = String::new();
    contents.push_str(&format!("source_addr: {source_addr}\n"));
    contents.push_str(&format!("username: {username}\n"));
    contents.push_str(&format!("credential_kind: {credential_kind}\n"));
    contents.push_str(&format!("credential_value: {credential_value}\n"));
    contents.push_str(&format!(
        "container_id: {}\n",
        container_id.unwrap_or_default()
    ));
    contents.push_str(&format!("started_at: {}\n", started_at.to_rfc3339()));
    contents.push_str(&format!(
        "ended_at: {}\n",
        ended_at.map(|t| t.to_rfc3339()).unwrap_or_default()
    ));
    contents.push_str(&format!(
        "duration_seconds: {}\n",
        duration_seconds.map(|d| d.to_string()).unwrap_or_default()
    ));
    contents.push_str(&format!("status: {status}\n"));
    std::fs::write(path, contents)
}

fn parse_session_field(contents: &str, key: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let (k, v) = line.split_once(": ")?;
        (k == key).then(|| v.to_string())
    })
}

async fn run_worker(
    sessions_dir: PathBuf,
    keystrokes_dir: PathBuf,
    uploads_dir: PathBuf,
    blobs: BlobStore,
    mut rx: mpsc::Receiver<Command>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::CreateSession {
                source_addr,
                username,
                credential,
                reply,
            } => {
                let id = Uuid::new_v4();
                let path = session_path(&sessions_dir, id);
                let result = write_session_file(
                    &path,
                    source_addr,
                    &username,
                    &credential,
                    None,
                    Utc::now(),
                    None,
                    None,
                    "active",
                )
                .map(|_| id)
                .map_err(|e| StorageError::WriteFailed(e.to_string()));
                let _ = reply.send(result);
            }
            Command::SetContainer {
                session_id,
                container_id,
                reply,
            } => {
                let result = rewrite_session(&sessions_dir, session_id, |fields| {
                    fields.container_id = Some(container_id.clone());
                });
                let _ = reply.send(result);
            }
            Command::EndSession { session_id, reply } => {
                let result = rewrite_session(&sessions_dir, session_id, |fields| {
                    let now = Utc::now();
                    let duration = (now - fields.started_at).num_seconds().max(0);
                    fields.ended_at = Some(now);
                    fields.duration_seconds = Some(duration);
                    fields.status = "completed".to_string();
                });
                let _ = reply.send(result);
            }
            Command::Keystroke {
                session_id,
                direction,
                data,
            } => {
                let path = keystrokes_dir.join(format!("{session_id}.log"));
                let line = format!(
                    "{} {} {}\n",
                    Utc::now().to_rfc3339(),
                    direction.as_str(),
                    hex::encode(&data)
                );
                if let Err(e) = append_line(&path, &line) {
                    warn!("failed to append keystroke chunk for {session_id}: {e}");
                }
            }
            Command::Upload {
                session_id,
                filename,
                content,
            } => {
                let size_bytes = content.len() as u64;
                match blobs.put(&content) {
                    Ok((hash, file_ref)) => {
                        let path = uploads_dir.join(format!("{session_id}.log"));
                        let line = format!(
                            "{} {} {} {} {}\n",
                            Utc::now().to_rfc3339(),
                            filename,
                            size_bytes,
                            hash,
                            file_ref
                        );
                        if let Err(e) = append_line(&path, &line) {
                            warn!("failed to append upload record for {session_id}: {e}");
                        }
                    }
                    Err(e) => warn!("failed to store upload blob for {session_id}: {e}"),
                }
            }
        }
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(line.as_bytes())
}

struct SessionFields {
    source_addr: SocketAddr,
    username: String,
    credential: Credential,
    container_id: Option<String>,
    started_at: chrono::DateTime<Utc>,
    ended_at: Option<chrono::DateTime<Utc>>,
    duration_seconds: Option<i64>,
    status: String,
}

fn rewrite_session(
    dir: &Path,
    session_id: Uuid,
    mutate: impl FnOnce(&mut SessionFields),
) -> Result<(), StorageError> {
    let path = session_path(dir, session_id);
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("session file operation on unknown session {session_id}, ignoring");
            return Ok(());
        }
        Err(e) => return Err(StorageError::ReadFailed(e.to_string())),
    };

    let source_addr = parse_session_field(&contents, "source_addr")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StorageError::ReadFailed("corrupt source_addr".into()))?;
    let username = parse_session_field(&contents, "username").unwrap_or_default();
    let credential_kind =
        parse_session_field(&contents, "credential_kind").unwrap_or_default();
    let credential_value =
        parse_session_field(&contents, "credential_value").unwrap_or_default();
    let credential = if credential_kind == "publickey" {
        Credential::PublicKeyFingerprint(credential_value)
    } else {
        Credential::Password(credential_value)
    };
    let container_id = parse_session_field(&contents, "container_id").filter(|s| !s.is_empty());
    let started_at = parse_session_field(&contents, "started_at")
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let ended_at = parse_session_field(&contents, "ended_at")
        .filter(|s| !s.is_empty())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));
    let duration_seconds = parse_session_field(&contents, "duration_seconds")
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok());
    let status = parse_session_field(&contents, "status").unwrap_or_else(|| "active".to_string());

    let mut fields = SessionFields {
        source_addr,
        username,
        credential,
        container_id,
        started_at,
        ended_at,
        duration_seconds,
        status,
    };
    mutate(&mut fields);

    write_session_file(
        &path,
        fields.source_addr,
        &fields.username,
        &fields.credential,
        fields.container_id.as_deref(),
        fields.started_at,
        fields.ended_at,
        fields.duration_seconds,
        &fields.status,
    )
    .map_err(|e| StorageError::WriteFailed(e.to_string()))
}

#[async_trait]
impl PersistenceGateway for FileGateway {
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
        let gateway = FileGateway::open(dir.path()).unwrap();
        let addr: SocketAddr = "127.0.0.1:6000".parse().unwrap();
        let id = gateway
            .create_session(addr, "root".into(), Credential::Password("toor".into()))
            .await
            .unwrap();
        gateway.set_container(id, "c1".into()).await.unwrap();
        gateway.end_session(id).await.unwrap();

        let contents =
            std::fs::read_to_string(session_path(&dir.path().join("sessions"), id)).unwrap();
        assert!(contents.contains("status: completed"));
        assert!(contents.contains("container_id: c1"));
    }

    #[tokio::test]
    async fn ending_unknown_session_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileGateway::open(dir.path()).unwrap();
        gateway.end_session(Uuid::new_v4()).await.unwrap();
    }
}
