//! Where the transaction keeps its working directories.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::config::UpdaterConfig;

/// Directory layout of one transaction.
///
/// Staging and backup live inside the install directory so every move is a
/// same-volume rename. Together with the protected subtree they form the
/// *reserved* top-level names that the transaction never enumerates as live
/// files and never accepts from a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionLayout {
    install_dir: PathBuf,
    staging_name: String,
    backup_name: String,
    protected_name: String,
}

impl TransactionLayout {
    /// Layout with explicit folder names.
    #[must_use]
    pub fn new(
        install_dir: impl Into<PathBuf>,
        staging_name: impl Into<String>,
        backup_name: impl Into<String>,
        protected_name: impl Into<String>,
    ) -> Self {
        Self {
            install_dir: install_dir.into(),
            staging_name: staging_name.into(),
            backup_name: backup_name.into(),
            protected_name: protected_name.into(),
        }
    }

    /// Layout for `install_dir` using the folder names from `config`.
    #[must_use]
    pub fn from_config(install_dir: &Path, config: &UpdaterConfig) -> Self {
        Self::new(install_dir, &config.staging_dir, &config.backup_dir, &config.protected_dir)
    }

    /// The live install directory.
    #[must_use]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Directory holding the extracted package.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.install_dir.join(&self.staging_name)
    }

    /// Directory holding displaced live files.
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.install_dir.join(&self.backup_name)
    }

    /// Whether `relative` lies in the protected subtree.
    ///
    /// Compared case-insensitively on the first path component, so `Data/x`
    /// is protected on every platform.
    #[must_use]
    pub fn is_protected(&self, relative: &Path) -> bool {
        first_component_is(relative, &self.protected_name)
    }

    /// Whether `relative` lies in the protected subtree or a working directory.
    #[must_use]
    pub fn is_reserved(&self, relative: &Path) -> bool {
        self.is_protected(relative)
            || first_component_is(relative, &self.staging_name)
            || first_component_is(relative, &self.backup_name)
    }
}

fn first_component_is(relative: &Path, name: &str) -> bool {
    match relative.components().find(|c| !matches!(c, Component::CurDir)) {
        Some(Component::Normal(first)) => eq_ignore_case(first, name),
        _ => false,
    }
}

fn eq_ignore_case(a: &OsStr, b: &str) -> bool {
    a.to_string_lossy().to_lowercase() == b.to_lowercase()
}
