//! In-place replacement of the installed files
//!
//! The transaction swaps the live install directory from the old version to
//! the new one so that, whatever fails, the directory ends up as either the
//! old version or the new version.
//!
//! # States
//!
//! ```text
//! Idle ──stage──▶ Staged ──backup──▶ BackedUp ──commit──▶ Committed
//!                   │                   │
//!                   └──────failure──────┴──▶ RollingBack ──▶ RolledBack
//! ```
//!
//! - **stage**: clear leftovers of a crashed run, extract the package into
//!   the staging directory. Live files are not touched.
//! - **backup**: move every live file (outside the reserved names) into the
//!   backup directory, keeping relative paths.
//! - **commit**: move every staged file into the install directory.
//! - **rollback**: remove committed files that had no original, then move
//!   every backed-up file back. Individual failures are logged and counted,
//!   never fatal.
//!
//! A failure while staging needs no rollback because nothing live was moved.
//! Staging and backup directories are removed at the end of every run, except
//! a backup still holding originals that rollback could not put back.
//!
//! All work is synchronous; async callers run [`ReplacementTransaction::run`]
//! on a blocking thread.

mod extract;
mod layout;

pub use extract::{ExtractionReport, extract_package};
pub use layout::TransactionLayout;

use anyhow::{Result, anyhow};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::core::UpdateError;
use crate::utils::fs::{FileMover, ensure_dir, remove_dir_all, remove_empty_parents};

/// Position of a transaction in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Nothing done yet.
    Idle,
    /// Package extracted into staging.
    Staged,
    /// Live files moved into backup.
    BackedUp,
    /// Staged files moved into place. Terminal.
    Committed,
    /// Restoring the backup after a failure.
    RollingBack,
    /// Backup restored. Terminal.
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Staged => "staged",
            Self::BackedUp => "backed up",
            Self::Committed => "committed",
            Self::RollingBack => "rolling back",
            Self::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// Outcome of a rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    /// Backed-up files moved back to their original path.
    pub restored: usize,
    /// Newly committed files without an original that were deleted.
    pub removed: usize,
    /// Files that could not be restored or removed.
    pub failed: usize,
}

/// Outcome of a committed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionReport {
    /// Extraction counts.
    pub extraction: ExtractionReport,
    /// Live files moved into backup.
    pub backed_up: usize,
    /// Staged files moved into place.
    pub committed: usize,
}

/// Replaces the files of one install directory.
pub struct ReplacementTransaction {
    layout: TransactionLayout,
    mover: Box<dyn FileMover>,
    state: TransactionState,
    /// Relative paths moved into backup, in order.
    backed_up: Vec<PathBuf>,
    /// Relative paths moved from staging into place, in order.
    committed: Vec<PathBuf>,
    /// Set when rollback left originals in the backup directory.
    keep_backup: bool,
}

impl fmt::Debug for ReplacementTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplacementTransaction")
            .field("layout", &self.layout)
            .field("state", &self.state)
            .field("backed_up", &self.backed_up.len())
            .field("committed", &self.committed.len())
            .finish_non_exhaustive()
    }
}

impl ReplacementTransaction {
    /// New transaction in the [`Idle`](TransactionState::Idle) state.
    #[must_use]
    pub fn new(layout: TransactionLayout, mover: Box<dyn FileMover>) -> Self {
        Self {
            layout,
            mover,
            state: TransactionState::Idle,
            backed_up: Vec::new(),
            committed: Vec::new(),
            keep_backup: false,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TransactionState {
        self.state
    }

    /// Directory layout.
    #[must_use]
    pub const fn layout(&self) -> &TransactionLayout {
        &self.layout
    }

    /// Run the whole transaction for `archive`, then clean up.
    ///
    /// On a backup or commit failure the install directory is rolled back and
    /// the failure is returned as [`UpdateError::TransactionError`] carrying
    /// the rollback counts. Staging and backup directories are removed in
    /// every case.
    pub fn run(mut self, archive: &Path) -> Result<TransactionReport> {
        let result = self.execute(archive);
        self.cleanup();
        result
    }

    fn execute(&mut self, archive: &Path) -> Result<TransactionReport> {
        let extraction = self.stage(archive)?;

        let backed_up = match self.backup() {
            Ok(count) => count,
            Err(e) => return Err(self.abort(e)),
        };

        let committed = match self.commit() {
            Ok(count) => count,
            Err(e) => return Err(self.abort(e)),
        };

        info!("Update committed: {committed} files installed, {backed_up} replaced");
        Ok(TransactionReport {
            extraction,
            backed_up,
            committed,
        })
    }

    /// Roll back and attach the rollback counts to `error`.
    fn abort(&mut self, error: anyhow::Error) -> anyhow::Error {
        warn!("Update failed, rolling back: {error:#}");
        let report = self.rollback();

        match error.downcast::<UpdateError>() {
            Ok(UpdateError::TransactionError {
                phase,
                path,
                reason,
                ..
            }) => UpdateError::TransactionError {
                phase,
                path,
                reason,
                restored: report.restored,
                unrestored: report.failed,
            }
            .into(),
            Ok(other) => other.into(),
            Err(error) => error,
        }
    }

    fn expect_state(&self, expected: TransactionState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(anyhow!("Cannot {operation} a transaction that is {}", self.state))
        }
    }

    fn set_state(&mut self, state: TransactionState) {
        debug!("Transaction {} -> {}", self.state, state);
        self.state = state;
    }

    /// `Idle → Staged`: clear leftovers and extract `archive` into staging.
    pub fn stage(&mut self, archive: &Path) -> Result<ExtractionReport> {
        self.expect_state(TransactionState::Idle, "stage")?;

        let staging = self.layout.staging_dir();
        let backup = self.layout.backup_dir();
        for dir in [&staging, &backup] {
            if dir.exists() {
                warn!("Removing leftover directory from an interrupted update: {}", dir.display());
                remove_dir_all(dir)?;
            }
        }
        ensure_dir(&staging)?;

        let report = extract_package(archive, &self.layout)?;
        self.set_state(TransactionState::Staged);
        Ok(report)
    }

    /// `Staged → BackedUp`: move every live file into the backup directory.
    pub fn backup(&mut self) -> Result<usize> {
        self.expect_state(TransactionState::Staged, "back up")?;

        let install_dir = self.layout.install_dir().to_path_buf();
        let backup_dir = self.layout.backup_dir();
        let live_files = enumerate_files(&install_dir, |rel| self.layout.is_reserved(rel))
            .map_err(|e| transaction_error("backup", &install_dir, &e))?;

        debug!("Backing up {} live files", live_files.len());
        for relative in live_files {
            let source = install_dir.join(&relative);
            let target = backup_dir.join(&relative);
            self.move_into(&source, &target)
                .map_err(|e| transaction_error("backup", &relative, &e))?;
            self.backed_up.push(relative);
        }

        // Folders that only held old files must not block a staged file of the same name
        let emptied: Vec<PathBuf> = self
            .backed_up
            .iter()
            .filter_map(|rel| install_dir.join(rel).parent().map(Path::to_path_buf))
            .collect();
        let pruned = remove_empty_parents(&install_dir, emptied);
        if pruned > 0 {
            debug!("Removed {pruned} folders emptied by the backup");
        }

        self.set_state(TransactionState::BackedUp);
        Ok(self.backed_up.len())
    }

    /// `BackedUp → Committed`: move every staged file into place.
    pub fn commit(&mut self) -> Result<usize> {
        self.expect_state(TransactionState::BackedUp, "commit")?;

        let install_dir = self.layout.install_dir().to_path_buf();
        let staging_dir = self.layout.staging_dir();
        let staged_files = enumerate_files(&staging_dir, |_| false)
            .map_err(|e| transaction_error("commit", &staging_dir, &e))?;

        for relative in staged_files {
            let source = staging_dir.join(&relative);
            let target = install_dir.join(&relative);
            self.move_into(&source, &target)
                .map_err(|e| transaction_error("commit", &relative, &e))?;
            self.committed.push(relative);
        }

        self.set_state(TransactionState::Committed);
        Ok(self.committed.len())
    }

    /// `Staged/BackedUp → RollingBack → RolledBack`: restore the backup.
    ///
    /// Best effort: every file is attempted even if others fail. Calling this
    /// in any other state does nothing and returns an empty report.
    pub fn rollback(&mut self) -> RollbackReport {
        let mut report = RollbackReport::default();
        if !matches!(self.state, TransactionState::Staged | TransactionState::BackedUp) {
            return report;
        }
        self.set_state(TransactionState::RollingBack);

        let install_dir = self.layout.install_dir().to_path_buf();
        let backup_dir = self.layout.backup_dir();
        let originals: HashSet<&PathBuf> = self.backed_up.iter().collect();

        // New files with no original would otherwise survive the rollback
        let mut touched_dirs = Vec::new();
        for relative in self.committed.iter().rev().filter(|rel| !originals.contains(rel)) {
            let path = install_dir.join(relative);
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    report.removed += 1;
                    if let Some(parent) = path.parent() {
                        touched_dirs.push(parent.to_path_buf());
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Rollback could not remove {}: {e}", relative.display());
                    report.failed += 1;
                }
            }
        }

        // A removed new file may leave a folder where an original file goes back
        remove_empty_parents(&install_dir, touched_dirs);

        let backed_up = match enumerate_files(&backup_dir, |_| false) {
            Ok(files) => files,
            Err(_) if !backup_dir.exists() => Vec::new(),
            Err(e) => {
                warn!("Rollback could not read {}: {e}", backup_dir.display());
                // Fall back to what this run recorded
                self.backed_up.clone()
            }
        };
        for relative in backed_up {
            let source = backup_dir.join(&relative);
            let target = install_dir.join(&relative);
            match self.move_into(&source, &target) {
                Ok(()) => report.restored += 1,
                Err(e) => {
                    warn!("Rollback could not restore {}: {e}", relative.display());
                    report.failed += 1;
                }
            }
        }

        if report.failed == 0 {
            info!("Rollback restored {} files", report.restored);
        } else {
            warn!(
                "Rollback restored {} files, {} could not be restored; originals remain in {}",
                report.restored,
                report.failed,
                backup_dir.display()
            );
            self.keep_backup = true;
        }
        self.set_state(TransactionState::RolledBack);
        report
    }

    /// Remove the staging and backup directories. Errors are logged only.
    ///
    /// The backup directory is kept when a rollback could not restore every
    /// original, since it then holds the only copy of those files.
    pub fn cleanup(&self) {
        let mut dirs = vec![self.layout.staging_dir()];
        if self.keep_backup {
            warn!("Keeping {} with unrestored original files", self.layout.backup_dir().display());
        } else {
            dirs.push(self.layout.backup_dir());
        }
        for dir in dirs {
            if let Err(e) = remove_dir_all(&dir) {
                warn!("Could not remove {}: {e:#}", dir.display());
            }
        }
    }

    fn move_into(&self, source: &Path, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }
        if target.is_dir() {
            // Only an empty folder gives way to a file; anything else fails the move
            let _ = std::fs::remove_dir(target);
        }
        self.mover.move_file(source, target)?;
        Ok(())
    }
}

fn transaction_error(phase: &str, path: &Path, error: &anyhow::Error) -> anyhow::Error {
    UpdateError::TransactionError {
        phase: phase.to_string(),
        path: path.display().to_string(),
        reason: format!("{error:#}"),
        restored: 0,
        unrestored: 0,
    }
    .into()
}

/// Relative paths of all files below `root`, sorted, skipping excluded subtrees.
///
/// Symlinks are listed as files and never followed.
fn enumerate_files(root: &Path, excluded: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.path().strip_prefix(root).map_or(true, |rel| !excluded(rel)));

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    Ok(files)
}
