//! The validated input of one updater run.

use anyhow::Result;
use reqwest::Url;
use std::path::{Path, PathBuf};

use crate::core::UpdateError;

/// Install directory and package URL, validated once at startup.
///
/// Immutable for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    install_dir: PathBuf,
    download_url: Url,
}

impl UpdateRequest {
    /// Validate raw arguments into a request.
    ///
    /// The install directory must exist and be a directory; it is made
    /// absolute (without resolving symlinks) so later stages can change the
    /// working directory freely. The URL must be `http` or `https`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Usage`] for any invalid argument.
    pub fn new(install_dir: &Path, download_url: &str) -> Result<Self> {
        if !install_dir.is_dir() {
            return Err(UpdateError::Usage {
                message: format!("install directory does not exist: {}", install_dir.display()),
            }
            .into());
        }

        let install_dir = std::path::absolute(install_dir).map_err(|e| UpdateError::Usage {
            message: format!("cannot resolve install directory {}: {e}", install_dir.display()),
        })?;

        let download_url = Url::parse(download_url.trim()).map_err(|e| UpdateError::Usage {
            message: format!("invalid download URL '{download_url}': {e}"),
        })?;

        if !matches!(download_url.scheme(), "http" | "https") {
            return Err(UpdateError::Usage {
                message: format!(
                    "unsupported URL scheme '{}', expected http or https",
                    download_url.scheme()
                ),
            }
            .into());
        }

        Ok(Self {
            install_dir,
            download_url,
        })
    }

    /// Absolute install directory.
    #[must_use]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Package URL.
    #[must_use]
    pub const fn download_url(&self) -> &Url {
        &self.download_url
    }
}
