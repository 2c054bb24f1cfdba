//! Progress indicators for the download and replacement stages
//!
//! Thin wrapper over `indicatif` so the rest of the updater never touches
//! progress styling directly.
//!
//! # Environment Variables
//!
//! - `UPDATER_NO_PROGRESS`: Set to any value to disable all progress indicators.
//!   `--no-progress` and `--quiet` have the same effect for a single run.
//!
//! # Examples
//!
//! ```rust,no_run
//! use inplace_updater::utils::progress::ProgressBar;
//!
//! let progress = ProgressBar::new_download(Some(4096));
//! progress.set_message("Downloading update");
//! progress.set_position(2048);
//! progress.finish_and_clear();
//! ```

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

use crate::constants::ENV_NO_PROGRESS;

/// Checks if progress bars should be disabled.
fn is_progress_disabled() -> bool {
    std::env::var_os(ENV_NO_PROGRESS).is_some()
}

/// A progress indicator with consistent styling.
///
/// When progress is disabled the wrapped bar is hidden and silently ignores
/// every update.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Creates a byte-based indicator for a download.
    ///
    /// With a known total this is a bar with percentage, throughput and ETA.
    /// Without one it is a spinner showing bytes so far and throughput.
    #[must_use]
    pub fn new_download(total_bytes: Option<u64>) -> Self {
        if is_progress_disabled() {
            return Self::hidden();
        }

        let bar = match total_bytes {
            Some(total) => {
                let bar = IndicatifBar::new(total);
                bar.set_style(download_style());
                bar
            }
            None => {
                let bar = IndicatifBar::new_spinner();
                bar.set_style(download_spinner_style());
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            }
        };
        Self {
            inner: bar,
        }
    }

    /// Creates a spinner for steps without measurable progress.
    #[must_use]
    pub fn new_spinner() -> Self {
        if is_progress_disabled() {
            return Self::hidden();
        }

        let bar = IndicatifBar::new_spinner();
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            inner: bar,
        }
    }

    /// Creates an indicator that draws nothing.
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    /// Sets the message displayed alongside the indicator.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Sets the absolute position (bytes downloaded so far).
    pub fn set_position(&self, pos: u64) {
        self.inner.set_position(pos);
    }

    /// Finishes the indicator and removes it from the terminal.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }

    /// Whether this indicator draws anything.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }
}

fn download_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template(
            "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {percent}% ({bytes_per_sec}, {eta})",
        )
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("━╸━")
}

fn download_spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{spinner:.cyan} {msg} {bytes} ({bytes_per_sec})")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}
