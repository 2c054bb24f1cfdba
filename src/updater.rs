//! The update pipeline
//!
//! Runs the stages strictly in order, each relying on what the previous one
//! established:
//!
//! 1. privilege gate - the install directory is writable (or an elevated copy took over)
//! 2. download - the package is on local disk
//! 3. process reaper - no running instance holds file locks
//! 4. replacement transaction - the new version is in place, or the old one restored
//! 5. restart - the new version is started
//!
//! The downloaded package is deleted when [`Updater::run`] returns, whatever
//! the outcome.

use anyhow::{Context, Result};
use std::ffi::OsString;
use tracing::{debug, info};

use crate::config::UpdaterConfig;
use crate::core::UpdateRequest;
use crate::fetch::{DownloadProgress, LocalArchive, PackageFetcher, progress_bar_reporter};
use crate::privilege::{GateOutcome, PrivilegeGate};
use crate::process::ProcessReaper;
use crate::restart;
use crate::transaction::{ReplacementTransaction, TransactionLayout, TransactionReport};
use crate::utils::{FileMover, ProgressBar, RetryingMover};

/// How a run ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The new version is installed.
    Updated {
        /// Transaction counts.
        report: TransactionReport,
        /// Whether the application was started again.
        restarted: bool,
    },
    /// An elevated copy of the updater took over the run.
    RelaunchedElevated,
}

/// One updater run, configured and ready to go.
pub struct Updater {
    config: UpdaterConfig,
    gate: PrivilegeGate,
    mover: Option<Box<dyn FileMover>>,
    show_progress: bool,
}

impl Updater {
    /// Updater with the real privilege gate and file mover.
    #[must_use]
    pub fn new(config: UpdaterConfig) -> Self {
        Self {
            config,
            gate: PrivilegeGate::default(),
            mover: None,
            show_progress: true,
        }
    }

    /// Replace the privilege gate.
    #[must_use]
    pub fn with_gate(mut self, gate: PrivilegeGate) -> Self {
        self.gate = gate;
        self
    }

    /// Replace the file mover used by the transaction.
    #[must_use]
    pub fn with_mover(mut self, mover: Box<dyn FileMover>) -> Self {
        self.mover = Some(mover);
        self
    }

    /// Enable or disable the download progress bar.
    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Run the pipeline for `request`.
    ///
    /// `relaunch_args` are the original command-line arguments, forwarded to
    /// an elevated copy if one is needed.
    pub async fn run(
        self,
        request: &UpdateRequest,
        relaunch_args: &[OsString],
    ) -> Result<UpdateOutcome> {
        let install_dir = request.install_dir();
        info!("Updating {} from {}", install_dir.display(), request.download_url());

        if self.gate.ensure_writable(install_dir, relaunch_args)? == GateOutcome::RelaunchedElevated
        {
            return Ok(UpdateOutcome::RelaunchedElevated);
        }

        let archive = LocalArchive::create()?;
        let fetcher =
            PackageFetcher::new(self.config.download_timeout(), self.config.progress_interval())?;
        let mut bar = self.show_progress.then(progress_bar_reporter);
        fetcher
            .download(request.download_url(), archive.path(), |progress: &DownloadProgress| {
                log_progress(progress);
                if let Some(bar) = bar.as_mut() {
                    bar(progress);
                }
            })
            .await
            .context("Failed to download the update package")?;

        let spinner =
            if self.show_progress { ProgressBar::new_spinner() } else { ProgressBar::hidden() };
        spinner.set_message("Closing the running application");
        let reaper = ProcessReaper::from_config(&self.config);
        let terminated = reaper.terminate_running_instances().await;
        debug!("Terminated {terminated} running instance(s)");

        let layout = TransactionLayout::from_config(install_dir, &self.config);
        let mover =
            self.mover.unwrap_or_else(|| Box::new(RetryingMover::new(self.config.move_attempts)));
        let transaction = ReplacementTransaction::new(layout, mover);
        let archive_path = archive.path().to_path_buf();
        spinner.set_message("Replacing application files");
        let result = tokio::task::spawn_blocking(move || transaction.run(&archive_path)).await;
        spinner.finish_and_clear();
        let report = result.context("Replacement task panicked")??;
        drop(archive);

        let restarted = self.config.restart
            && restart::relaunch(install_dir, &self.config.main_executable);

        info!("Update complete");
        Ok(UpdateOutcome::Updated {
            report,
            restarted,
        })
    }
}

fn log_progress(progress: &DownloadProgress) {
    match progress.percent() {
        Some(percent) => debug!(
            "Downloaded {} bytes ({percent:.0}%, {:.0} B/s)",
            progress.bytes_read,
            progress.bytes_per_second()
        ),
        None => debug!(
            "Downloaded {} bytes ({:.0} B/s)",
            progress.bytes_read,
            progress.bytes_per_second()
        ),
    }
}
