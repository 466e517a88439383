use crate::sftp::path::{map_path, virtualize};
use crate::ssh::ConnectionContext;
use log::{info, warn};
use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

const SESSION_ID_WAIT: Duration = Duration::from_secs(5);

struct OpenFile {
    file: tokio::fs::File,
    path: PathBuf,
    capture: Option<Vec<u8>>,
}

struct OpenDir {
    entries: Vec<File>,
}

/// One `Handler` per SFTP subsystem request; `russh_sftp::server::run`
/// drives it until the channel closes.
pub struct SftpHandler {
    ctx: Arc<ConnectionContext>,
    root: Option<PathBuf>,
    files: HashMap<String, OpenFile>,
    dirs: HashMap<String, OpenDir>,
    next_handle: AtomicU64,
}

impl SftpHandler {
    pub fn new(ctx: Arc<ConnectionContext>) -> Self {
        Self {
            ctx,
            root: None,
            files: HashMap::new(),
            dirs: HashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    fn fresh_handle(&self) -> String {
        self.next_handle.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Resolves (or creates) the per-session scratch directory. Falls back
    /// to the literal `unknown` if the session id hasn't resolved within
    /// the wait window, so an attacker opening SFTP before their
    /// credentials are persisted still gets a working subsystem.
    async fn ensure_root(&mut self) -> PathBuf {
        if let Some(root) = &self.root {
            return root.clone();
        }
        let label = match self.ctx.wait_session_id(SESSION_ID_WAIT).await {
            Some(id) => id.to_string()[..8].to_string(),
            None => {
                warn!("sftp session id did not resolve in time, falling back to 'unknown'");
                "unknown".to_string()
            }
        };
        let root = self.ctx.config.sftp_root.join(&label);
        if let Err(e) = tokio::fs::create_dir_all(&root).await {
            warn!("failed to create sftp root {}: {e}", root.display());
        }
        info!("sftp root for this session is {}", root.display());
        self.root = Some(root.clone());
        root
    }

    fn map(&self, path: &str) -> Result<PathBuf, StatusCode> {
        let root = self.root.as_deref().unwrap_or_else(|| self.ctx.config.sftp_root.as_path());
        map_path(root, path).map_err(|_| StatusCode::PermissionDenied)
    }
}

fn attrs_for(metadata: &std::fs::Metadata) -> FileAttributes {
    use std::os::unix::fs::MetadataExt;
    FileAttributes {
        size: Some(metadata.size()),
        uid: Some(metadata.uid()),
        user: None,
        gid: Some(metadata.gid()),
        group: None,
        permissions: Some(metadata.mode()),
        atime: Some(metadata.atime() as u32),
        mtime: Some(metadata.mtime() as u32),
    }
}

fn io_err(e: std::io::Error) -> StatusCode {
    match e.kind() {
        std::io::ErrorKind::NotFound => StatusCode::NoSuchFile,
        std::io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        _ => StatusCode::Failure,
    }
}

#[async_trait::async_trait]
impl russh_sftp::server::Handler for SftpHandler {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        let _ = extensions;
        Ok(Version {
            version,
            extensions: HashMap::new(),
        })
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        self.ensure_root().await;
        let path = self.map(&filename)?;

        let wants_write = pflags.contains(OpenFlags::WRITE)
            || pflags.contains(OpenFlags::CREATE)
            || pflags.contains(OpenFlags::APPEND)
            || pflags.contains(OpenFlags::TRUNCATE);

        let mut opts = OpenOptions::new();
        opts.read(pflags.contains(OpenFlags::READ) || !wants_write);
        if wants_write {
            opts.write(true)
                .create(pflags.contains(OpenFlags::CREATE))
                .append(pflags.contains(OpenFlags::APPEND))
                .truncate(pflags.contains(OpenFlags::TRUNCATE));
        }

        let file = opts.open(&path).await.map_err(io_err)?;

        if let Some(mode) = attrs.permissions {
            let _ = std::fs::set_permissions(&path, std::os::unix::fs::PermissionsExt::from_mode(mode));
        }

        let handle = self.fresh_handle();
        self.files.insert(
            handle.clone(),
            OpenFile {
                file,
                path,
                capture: if wants_write { Some(Vec::new()) } else { None },
            },
        );
        Ok(Handle { id, handle })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        if let Some(open) = self.files.remove(&handle) {
            if let Some(buffer) = open.capture {
                if !buffer.is_empty() {
                    if let Some(session_id) = self.ctx.wait_session_id(SESSION_ID_WAIT).await {
                        let filename = open
                            .path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        self.ctx.gateway.record_upload(session_id, filename, buffer);
                    }
                }
            }
        }
        self.dirs.remove(&handle);
        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: "ok".to_string(),
            language_tag: "en-US".to_string(),
        })
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let open = self.files.get_mut(&handle).ok_or(StatusCode::Failure)?;
        open.file.seek(std::io::SeekFrom::Start(offset)).await.map_err(io_err)?;
        let mut buf = vec![0u8; len as usize];
        let n = open.file.read(&mut buf).await.map_err(io_err)?;
        if n == 0 {
            return Err(StatusCode::Eof);
        }
        buf.truncate(n);
        Ok(Data { id, data: buf })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let open = self.files.get_mut(&handle).ok_or(StatusCode::Failure)?;
        open.file.seek(std::io::SeekFrom::Start(offset)).await.map_err(io_err)?;
        open.file.write_all(&data).await.map_err(io_err)?;
        if let Some(buffer) = open.capture.as_mut() {
            buffer.extend_from_slice(&data);
        }
        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: "ok".to_string(),
            language_tag: "en-US".to_string(),
        })
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        self.stat(id, path).await
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let open = self.files.get(&handle).ok_or(StatusCode::Failure)?;
        let metadata = open.file.metadata().await.map_err(io_err)?;
        Ok(Attrs {
            id,
            attrs: attrs_for(&metadata),
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        self.ensure_root().await;
        let mapped = self.map(&path)?;
        let metadata = tokio::fs::metadata(&mapped).await.map_err(io_err)?;
        Ok(Attrs {
            id,
            attrs: attrs_for(&metadata),
        })
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let mapped = self.map(&path)?;
        if let Some(mode) = attrs.permissions {
            std::fs::set_permissions(&mapped, std::os::unix::fs::PermissionsExt::from_mode(mode))
                .map_err(io_err)?;
        }
        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: "ok".to_string(),
            language_tag: "en-US".to_string(),
        })
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        handle: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let open = self.files.get(&handle).ok_or(StatusCode::Failure)?;
        let path = open.path.clone();
        self.setstat(id, path.to_string_lossy().into_owned(), attrs).await
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        self.ensure_root().await;
        let mapped = self.map(&path)?;
        let mut read_dir = tokio::fs::read_dir(&mapped).await.map_err(io_err)?;
        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(io_err)? {
            let metadata = entry.metadata().await.map_err(io_err)?;
            entries.push(File {
                filename: entry.file_name().to_string_lossy().into_owned(),
                longname: entry.file_name().to_string_lossy().into_owned(),
                attrs: attrs_for(&metadata),
            });
        }
        let handle = self.fresh_handle();
        self.dirs.insert(handle.clone(), OpenDir { entries });
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let dir = self.dirs.get_mut(&handle).ok_or(StatusCode::Failure)?;
        if dir.entries.is_empty() {
            return Err(StatusCode::Eof);
        }
        let files = std::mem::take(&mut dir.entries);
        Ok(Name { id, files })
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        let mapped = self.map(&filename)?;
        tokio::fs::remove_file(&mapped).await.map_err(io_err)?;
        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: "ok".to_string(),
            language_tag: "en-US".to_string(),
        })
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.ensure_root().await;
        let mapped = self.map(&path)?;
        tokio::fs::create_dir(&mapped).await.map_err(io_err)?;
        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: "ok".to_string(),
            language_tag: "en-US".to_string(),
        })
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        let mapped = self.map(&path)?;
        tokio::fs::remove_dir(&mapped).await.map_err(io_err)?;
        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: "ok".to_string(),
            language_tag: "en-US".to_string(),
        })
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        let from = self.map(&oldpath)?;
        let to = self.map(&newpath)?;
        tokio::fs::rename(&from, &to).await.map_err(io_err)?;
        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: "ok".to_string(),
            language_tag: "en-US".to_string(),
        })
    }

    async fn symlink(
        &mut self,
        id: u32,
        linkpath: String,
        target: String,
    ) -> Result<Status, Self::Error> {
        let mapped = self.map(&linkpath)?;
        tokio::fs::symlink(&target, &mapped).await.map_err(io_err)?;
        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: "ok".to_string(),
            language_tag: "en-US".to_string(),
        })
    }

    async fn readlink(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let mapped = self.map(&path)?;
        let target = tokio::fs::read_link(&mapped).await.map_err(io_err)?;
        let root = self.root.clone().unwrap_or_else(|| self.ctx.config.sftp_root.clone());
        let virtual_target = virtualize(&root, &target);
        Ok(Name {
            id,
            files: vec![File {
                filename: virtual_target.clone(),
                longname: virtual_target,
                attrs: FileAttributes::default(),
            }],
        })
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let root = self.ensure_root().await;
        let mapped = self.map(&path)?;
        let virtual_path = virtualize(&root, &mapped);
        Ok(Name {
            id,
            files: vec![File {
                filename: virtual_path.clone(),
                longname: virtual_path,
                attrs: FileAttributes::default(),
            }],
        })
    }
}
