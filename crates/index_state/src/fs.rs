//! crates/index_state/src/fs.rs
//! Directory operations used by the commit protocol.
//!
//! The index state never touches the filesystem directly for its
//! generation directories; it goes through [`StateFs`] so tests can inject a
//! failure at any single rename.

use std::fmt::Debug;
use std::io;
use std::path::Path;

/// Directory-level filesystem operations.
pub trait StateFs: Send + Sync + Debug {
    /// Reports whether anything exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Reports whether `path` is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Creates one directory.
    fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Renames `from` to `to`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Removes a directory tree.
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// [`StateFs`] backed by `std::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFs;

impl StateFs for OsFs {
    fn exists(&self, path: &Path) -> bool {
        path.symlink_metadata().is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }
}

/// Treats `NotFound` as success.
pub(crate) fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
