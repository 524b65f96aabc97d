//! Owner-only file I/O for identity material
//!
//! The file-backed namespace holds a device private key in clear text, so it
//! is always written with mode 0600 on Unix and replaced atomically: a crash
//! mid-write leaves either the previous file or the new one, never a torn
//! record.
//!
//! # Example
//!
//! ```no_run
//! use certprov::secure_file;
//! use std::path::Path;
//!
//! secure_file::write_atomic(Path::new("/var/lib/certprov/tarameteo_certs.json"), b"{}")?;
//! let text = secure_file::read_secure_string(Path::new("/var/lib/certprov/tarameteo_certs.json"))?;
//! # Ok::<(), certprov::CPError>(())
//! ```

use crate::error::CPError;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Owner read/write only.
#[cfg(unix)]
pub const SECURE_FILE_MODE: u32 = 0o600;

/// Warn if group or others can access `path`. Never fails on loose
/// permissions, only on I/O errors.
#[cfg(unix)]
pub fn check_permissions(path: &Path) -> Result<(), CPError> {
    use std::os::unix::fs::PermissionsExt;

    let perm_bits = fs::metadata(path)?.permissions().mode() & 0o777;
    if perm_bits & 0o077 != 0 {
        log::warn!(
            "SECURITY WARNING: '{}' has mode {:o}; identity files should be 0600. \
             Consider running: chmod 600 '{}'",
            path.display(),
            perm_bits,
            path.display()
        );
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn check_permissions(path: &Path) -> Result<(), CPError> {
    log::debug!("Permission check skipped for '{}'", path.display());
    Ok(())
}

/// Create (or truncate) a file that is owner-only from the first byte.
#[cfg(unix)]
pub fn create_secure_file(path: &Path) -> Result<File, CPError> {
    use std::os::unix::fs::OpenOptionsExt;

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(SECURE_FILE_MODE)
        .open(path)?;
    Ok(file)
}

#[cfg(not(unix))]
pub fn create_secure_file(path: &Path) -> Result<File, CPError> {
    log::warn!(
        "Creating '{}' without restrictive permissions: not supported on this platform",
        path.display()
    );
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    Ok(file)
}

/// Write `data` to `path` with owner-only permissions and fsync it.
pub fn write_secure(path: &Path, data: &[u8]) -> Result<(), CPError> {
    let mut file = create_secure_file(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` atomically: write a sibling temp file, then rename over.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CPError> {
    let staging = staging_path(path);
    if let Err(e) = write_secure(&staging, data) {
        fs::remove_file(&staging).ok();
        return Err(e);
    }
    if let Err(e) = fs::rename(&staging, path) {
        fs::remove_file(&staging).ok();
        return Err(e.into());
    }
    Ok(())
}

/// Read a file as UTF-8, warning about loose permissions first.
pub fn read_secure_string(path: &Path) -> Result<String, CPError> {
    check_permissions(path)?;
    let mut contents = String::new();
    File::open(path)?.read_to_string(&mut contents).map_err(|e| {
        CPError::StorageError(format!("Unreadable file '{}': {}", path.display(), e))
    })?;
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        write_atomic(&path, b"{\"a\":1}").unwrap();
        assert_eq!(read_secure_string(&path).unwrap(), "{\"a\":1}");

        write_atomic(&path, b"{}").unwrap();
        assert_eq!(read_secure_string(&path).unwrap(), "{}");
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_staging_path() {
        let path = Path::new("/tmp/state/tarameteo_certs.json");
        assert_eq!(
            staging_path(path),
            PathBuf::from("/tmp/state/tarameteo_certs.json.tmp")
        );
    }

    #[test]
    fn test_write_atomic_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("identity.json");
        assert!(write_atomic(&path, b"{}").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_secure_permissions_set_correctly() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        write_atomic(&path, b"{}").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, SECURE_FILE_MODE);
    }

    #[cfg(unix)]
    #[test]
    fn test_check_permissions_insecure_still_reads() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loose.json");
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        assert!(check_permissions(&path).is_ok());
        assert_eq!(read_secure_string(&path).unwrap(), "{}");
    }
}
