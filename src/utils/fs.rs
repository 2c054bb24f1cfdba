//! File system helpers for the replacement transaction
//!
//! Everything in here is synchronous: the transaction runs on a blocking
//! thread and performs one file operation at a time.
//!
//! # Path safety
//!
//! [`is_safe_path`] is the zip-slip guard. It joins the untrusted relative path
//! onto the base directory, normalizes `.` and `..` lexically and checks that
//! the result still starts with the base. No symlink resolution happens, so the
//! check works before the file exists.
//!
//! # Moves
//!
//! [`FileMover`] is the seam through which every backup, commit and rollback
//! move goes. [`RetryingMover`] is the production implementation; tests swap in
//! movers that fail on chosen paths.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::utils::backoff::blocking_backoff_with_delay;

/// Ensures a directory exists, creating it and all parents if necessary.
///
/// Fails if the path exists but is not a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
        }
        return Ok(());
    }
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    Ok(())
}

/// Removes a directory tree if it exists.
///
/// A missing directory is not an error.
pub fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to remove directory: {}", path.display()))
        }
    }
}

/// Normalizes a path lexically, resolving `.` and `..` components.
///
/// A `..` pops the previous component. Popping past the root drops the root
/// too, so an escaping path never normalizes to something under its base.
///
/// ```rust
/// use inplace_updater::utils::fs::normalize_path;
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(normalize_path(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
/// ```
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                components.pop();
            }
            c => components.push(c),
        }
    }

    components.iter().collect()
}

/// Checks that `path` stays inside `base` once joined and normalized.
///
/// Absolute paths are normalized as-is, so they only pass if they already
/// point inside `base`.
///
/// ```rust
/// use inplace_updater::utils::fs::is_safe_path;
/// use std::path::Path;
///
/// let base = Path::new("/opt/app/.update-staging");
/// assert!(is_safe_path(base, Path::new("bin/app")));
/// assert!(!is_safe_path(base, Path::new("../../etc/passwd")));
/// ```
#[must_use]
pub fn is_safe_path(base: &Path, path: &Path) -> bool {
    let normalized_base = normalize_path(base);
    let normalized_path = if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    };

    normalized_path.starts_with(&normalized_base) && normalized_path != normalized_base
}

/// Moves a single file, overwriting the destination.
///
/// Uses a rename when source and destination share a volume. Falls back to
/// copy-then-delete across volumes. Parent directories of `to` must exist.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!("Cross-device move, copying {} to {}", from.display(), to.display());
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

/// Moves files on behalf of the replacement transaction.
pub trait FileMover: Send + Sync {
    /// Moves `from` to `to`, replacing any existing file at `to`.
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// Production [`FileMover`] that retries failed moves with a short backoff.
///
/// Retries absorb transient sharing violations, for example an antivirus
/// scanner briefly holding a freshly written file.
#[derive(Debug, Clone)]
pub struct RetryingMover {
    attempts: u32,
}

impl RetryingMover {
    /// Create a mover that tries each move up to `attempts` times (at least once).
    #[must_use]
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }
}

impl FileMover for RetryingMover {
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut attempt = 0;
        loop {
            match move_file(from, to) {
                Ok(()) => return Ok(()),
                // A vanished source will not come back
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(e),
                Err(e) if attempt + 1 >= self.attempts => return Err(e),
                Err(e) => {
                    warn!(
                        "Move attempt {} of {} failed for {}: {}",
                        attempt + 1,
                        self.attempts,
                        from.display(),
                        e
                    );
                    attempt = blocking_backoff_with_delay(attempt);
                }
            }
        }
    }
}

/// Removes now-empty directories left behind by moved files.
///
/// For every directory in `dirs`, removes it and then each ancestor while
/// they are empty, stopping at `root` (which is never removed). Deeper
/// directories are handled first. Returns the number of directories removed.
pub fn remove_empty_parents(root: &Path, dirs: impl IntoIterator<Item = PathBuf>) -> usize {
    let mut dirs: Vec<PathBuf> = dirs.into_iter().filter(|d| d.starts_with(root)).collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    dirs.dedup();

    let mut removed = 0;
    for dir in dirs {
        let mut current = Some(dir.as_path());
        while let Some(path) = current {
            if path == root || !path.starts_with(root) {
                break;
            }
            // remove_dir only succeeds on empty directories
            if fs::remove_dir(path).is_err() {
                break;
            }
            removed += 1;
            current = path.parent();
        }
    }
    removed
}
