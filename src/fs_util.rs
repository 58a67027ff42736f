use std::io::Write;
use std::path::{Path, PathBuf};

/// Resolve the user's home directory, or error if unset.
pub fn home_dir() -> anyhow::Result<PathBuf> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| anyhow::anyhow!("HOME environment variable is not set"))
}

/// `~/.tattva`, falling back to the working directory when HOME is unset.
pub fn default_state_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".tattva")
}

/// Replace `path` with `contents` via a sibling temp file and rename, so a
/// crash mid-write never leaves a truncated document behind.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    {
        let mut file = std::fs::File::create(&temp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    std::fs::rename(&temp, path)
}

#[cfg(unix)]
pub fn set_secure_dir_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| anyhow::anyhow!("failed to chmod 700 {}: {e}", path.display()))
}

#[cfg(not(unix))]
pub fn set_secure_dir_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(unix)]
pub fn set_secure_file_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| anyhow::anyhow!("failed to chmod 600 {}: {e}", path.display()))
}

#[cfg(not(unix))]
pub fn set_secure_file_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
