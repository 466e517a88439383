//! Content-addressed blob storage, standing in for the out-of-scope
//! large-object store the persistence contract assumes for upload bodies.

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Writes `content` under its SHA-256 hex digest, returning a
    /// `(content_hash, file_ref)` pair. Idempotent: re-writing the same
    /// bytes overwrites the same file with itself.
    pub fn put(&self, content: &[u8]) -> io::Result<(String, String)> {
        let hash = hex::encode(Sha256::digest(content));
        let path = self.path_for(&hash);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        let file_ref = hash.clone();
        Ok((hash, file_ref))
    }

    pub fn get(&self, file_ref: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.path_for(file_ref))
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        let (prefix, rest) = hash.split_at(2.min(hash.len()));
        self.root.join(prefix).join(rest)
    }
}

impl AsRef<Path> for BlobStore {
    fn as_ref(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        let (hash, file_ref) = store.put(b"attacker payload").unwrap();
        assert_eq!(hash, file_ref);
        assert_eq!(store.get(&file_ref).unwrap(), b"attacker payload");
    }

    #[test]
    fn same_content_hashes_identically() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        let (h1, _) = store.put(b"same bytes").unwrap();
        let (h2, _) = store.put(b"same bytes").unwrap();
        assert_eq!(h1, h2);
    }
}
