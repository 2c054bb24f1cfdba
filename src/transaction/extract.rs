//! Extraction of the package into the staging directory
//!
//! Every entry name is treated as untrusted. An entry is written only if its
//! joined and normalized destination stays strictly inside the staging
//! directory and its relative path is outside the reserved names (protected
//! subtree, staging, backup). Rejected entries are skipped and counted; only
//! an archive that cannot be read at all fails the extraction.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

use super::TransactionLayout;
use crate::core::UpdateError;
use crate::utils::fs::{ensure_dir, is_safe_path, normalize_path};

/// Outcome of extracting one package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Files written to the staging directory.
    pub extracted: usize,
    /// Entries skipped because they would escape the staging directory or are links.
    pub skipped_unsafe: usize,
    /// Entries skipped because they target a protected or reserved path.
    pub skipped_protected: usize,
}

/// Extract `archive` into the staging directory of `layout`.
///
/// The staging directory must already exist. Directory entries are not
/// materialized; parent directories are created for each file.
///
/// # Errors
///
/// [`UpdateError::ExtractionError`] if the archive or an entry's data cannot be
/// read, or if the package contains no installable file.
pub fn extract_package(archive: &Path, layout: &TransactionLayout) -> Result<ExtractionReport> {
    let staging = layout.staging_dir();
    let normalized_staging = normalize_path(&staging);
    let extraction_error = |reason: String| UpdateError::ExtractionError {
        archive: archive.display().to_string(),
        reason,
    };

    let file = File::open(archive)
        .with_context(|| format!("Failed to open update package {}", archive.display()))?;
    let mut zip = ZipArchive::new(file).map_err(|e| extraction_error(e.to_string()))?;

    let mut report = ExtractionReport::default();
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| extraction_error(format!("entry #{index}: {e}")))?;
        let name = entry.name().to_string();

        if entry.is_dir() {
            continue;
        }

        if entry.is_symlink() || !is_safe_path(&staging, Path::new(&name)) {
            warn!("Skipping unsafe archive entry: {name}");
            report.skipped_unsafe += 1;
            continue;
        }

        let destination = normalize_path(&staging.join(&name));
        let relative: PathBuf = match destination.strip_prefix(&normalized_staging) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => {
                warn!("Skipping unsafe archive entry: {name}");
                report.skipped_unsafe += 1;
                continue;
            }
        };

        if layout.is_reserved(&relative) {
            debug!("Skipping protected archive entry: {name}");
            report.skipped_protected += 1;
            continue;
        }

        if let Some(parent) = destination.parent() {
            ensure_dir(parent)?;
        }

        let output = File::create(&destination)
            .with_context(|| format!("Failed to create staged file {}", destination.display()))?;
        let mut writer = BufWriter::new(output);
        io::copy(&mut entry, &mut writer).map_err(|e| {
            // Read errors here mean corrupt entry data, not a disk problem
            if e.kind() == io::ErrorKind::InvalidData {
                anyhow::Error::from(extraction_error(format!("{name}: {e}")))
            } else {
                anyhow::Error::from(e).context(format!("Failed to extract {name}"))
            }
        })?;
        writer.flush().with_context(|| format!("Failed to write {}", destination.display()))?;
        drop(writer);

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&destination, std::fs::Permissions::from_mode(mode & 0o7777))
                .with_context(|| format!("Failed to set permissions on {}", destination.display()))?;
        }

        report.extracted += 1;
    }

    if report.extracted == 0 {
        return Err(extraction_error("package contains no installable files".to_string()).into());
    }

    debug!(
        "Extracted {} files ({} unsafe, {} protected entries skipped)",
        report.extracted, report.skipped_unsafe, report.skipped_protected
    );
    Ok(report)
}
