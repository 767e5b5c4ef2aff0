//! Filesystem abstraction layer for the hosts file.
//!
//! The hosts file is a host-wide shared resource, so tests never touch the
//! real one: they either point [`RealFileSystem`] at a temporary directory or
//! inject a `MockFileSystem` (generated by mockall in test builds) to simulate
//! permission errors.

use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Filesystem operations the hosts editor needs.
///
/// # Example (testing)
/// ```ignore
/// use blockd::fs_abstraction::MockFileSystem;
///
/// let mut mock_fs = MockFileSystem::new();
/// mock_fs.expect_read_to_string()
///     .returning(|_| Ok("127.0.0.1 localhost\n".to_string()));
/// ```
#[cfg_attr(test, automock)]
pub trait FileSystem: Send + Sync {
    /// Read file contents as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Replace the file contents, creating it if it doesn't exist.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// Real filesystem implementation using std::fs.
///
/// Writes replace the file through a synced temp file and a rename, keeping
/// the old permissions, so a crash never leaves a truncated hosts file. When
/// the rename is refused (bind mounts, a file held open on Windows) the
/// contents are written in place instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Err(e) = replace_atomically(path, contents) {
            debug!(
                "Atomic replace of {} failed ({}), writing in place",
                path.display(),
                e
            );
            return std::fs::write(path, contents);
        }
        Ok(())
    }
}

fn replace_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(contents)?;
    if let Ok(metadata) = std::fs::metadata(path) {
        temp_file.as_file().set_permissions(metadata.permissions())?;
    }
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
