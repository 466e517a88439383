use crate::error_handling::types::SshError;
use log::info;
use russh::keys::PrivateKey;
use std::path::Path;

/// Loads the single persistent host key. Missing or unreadable is fatal —
/// key provisioning is an operational concern handled outside the core
/// (see `scripts/` in a deployment of this crate), not something the
/// server generates for itself on the fly.
pub fn load_host_key(path: &Path) -> Result<PrivateKey, SshError> {
    if !path.exists() {
        return Err(SshError::HostKeyUnavailable(format!(
            "host key file not found: {}",
            path.display()
        )));
    }
    let key = russh::keys::load_secret_key(path, None)
        .map_err(|e| SshError::HostKeyUnavailable(e.to_string()))?;
    info!("loaded host key from {}", path.display());
    Ok(key)
}
