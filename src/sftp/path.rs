use crate::error_handling::types::SftpError;
use std::path::{Component, Path, PathBuf};

/// Normalizes `requested` (resolving `.`/`..` segments lexically, without
/// touching the filesystem) and joins it under `root`, then re-verifies the
/// resulting absolute path still has `root` as a prefix. A client sending
/// `../../etc/passwd` lands back inside `root`, it never escapes it.
pub fn map_path(root: &Path, requested: &str) -> Result<PathBuf, SftpError> {
    let mut stack: Vec<String> = Vec::new();
    for component in Path::new(requested).components() {
        match component {
            Component::Normal(part) => stack.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                stack.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    let mut mapped = root.to_path_buf();
    for part in &stack {
        mapped.push(part);
    }

    if !mapped.starts_with(root) {
        return Err(SftpError::PathEscape(requested.to_string()));
    }
    Ok(mapped)
}

/// Strips the session root prefix from a host path so the attacker sees a
/// virtual path rooted at `/`, mirroring what `readlink` returns.
pub fn virtualize(root: &Path, host_path: &Path) -> String {
    match host_path.strip_prefix(root) {
        Ok(rest) if rest.as_os_str().is_empty() => "/".to_string(),
        Ok(rest) => format!("/{}", rest.display()),
        Err(_) => host_path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_relative_path_maps_under_root() {
        let root = Path::new("/srv/sftp/abcd1234");
        let mapped = map_path(root, "foo/bar.txt").unwrap();
        assert_eq!(mapped, Path::new("/srv/sftp/abcd1234/foo/bar.txt"));
    }

    #[test]
    fn parent_segments_cannot_escape_root() {
        let root = Path::new("/srv/sftp/abcd1234");
        let mapped = map_path(root, "../../etc/passwd").unwrap();
        assert!(mapped.starts_with(root));
        assert_eq!(mapped, Path::new("/srv/sftp/abcd1234/etc/passwd"));
    }

    #[test]
    fn absolute_path_is_rerooted_not_escaped() {
        let root = Path::new("/srv/sftp/abcd1234");
        let mapped = map_path(root, "/etc/shadow").unwrap();
        assert_eq!(mapped, Path::new("/srv/sftp/abcd1234/etc/shadow"));
    }

    #[test]
    fn virtualize_strips_root_prefix() {
        let root = Path::new("/srv/sftp/abcd1234");
        let host = Path::new("/srv/sftp/abcd1234/foo/bar.txt");
        assert_eq!(virtualize(root, host), "/foo/bar.txt");
    }
}
