//! Streaming download of the update package
//!
//! The package is streamed chunk by chunk into a temporary file; the body is
//! never held in memory as a whole. A single fixed timeout covers the entire
//! request, so a stalled connection fails the run instead of hanging it.
//!
//! Progress is reported through a callback at a bounded, time-based rate.
//! Whatever the chunk sizes, the callback fires at most once per interval
//! while the body streams, plus exactly once more when the body completes.

use anyhow::{Context, Result};
use reqwest::{Client, Url};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::constants::{ARCHIVE_FILE_PREFIX, CONNECT_TIMEOUT, DOWNLOAD_BUFFER_SIZE};
use crate::core::UpdateError;
use crate::utils::ProgressBar;

/// Snapshot of a running download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// Bytes written to disk so far.
    pub bytes_read: u64,
    /// Size announced by the server, if any.
    pub total_bytes: Option<u64>,
    /// Time since the request was sent.
    pub elapsed: Duration,
    /// Set on the last report, after the whole body was written.
    pub finished: bool,
}

impl DownloadProgress {
    /// Completion percentage, or `None` when the total size is unknown.
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        self.total_bytes.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.bytes_read as f64 * 100.0 / total as f64).min(100.0)
            }
        })
    }

    /// Average throughput since the start of the download.
    #[must_use]
    pub fn bytes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.bytes_read as f64 / secs } else { 0.0 }
    }
}

/// The downloaded package on disk.
///
/// Lives in the system temp directory under a random name, so concurrent runs
/// never collide. The file is deleted when this value is dropped, on success
/// and on failure alike.
#[derive(Debug)]
pub struct LocalArchive {
    path: TempPath,
}

impl LocalArchive {
    /// Reserve a new uniquely named temporary file.
    pub fn create() -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(ARCHIVE_FILE_PREFIX)
            .suffix(".zip")
            .tempfile()
            .context("Failed to create temporary file for the update package")?;
        // Keep only the path; the handle is reopened for async writes
        let (_, path) = file.into_parts();
        Ok(Self {
            path,
        })
    }

    /// Location of the archive.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Downloads packages over HTTP(S).
#[derive(Debug, Clone)]
pub struct PackageFetcher {
    client: Client,
    timeout: Duration,
    progress_interval: Duration,
}

impl PackageFetcher {
    /// Build a fetcher with a whole-request `timeout` and a minimum
    /// `progress_interval` between progress reports.
    pub fn new(timeout: Duration, progress_interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            timeout,
            progress_interval,
        })
    }

    /// Stream `url` into `dest`, reporting progress through `on_progress`.
    ///
    /// Returns the number of bytes written. On failure the partially written
    /// file is left in place for the caller to clean up.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Timeout`] when the request exceeds the timeout
    /// - [`UpdateError::NetworkError`] for connection failures, non-success
    ///   statuses and truncated bodies
    pub async fn download<F>(&self, url: &Url, dest: &Path, mut on_progress: F) -> Result<u64>
    where
        F: FnMut(&DownloadProgress),
    {
        info!("Downloading update package from {url}");
        let started = Instant::now();

        let mut response =
            self.client.get(url.clone()).send().await.map_err(|e| self.map_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::NetworkError {
                operation: format!("download {url}"),
                reason: format!("server responded with HTTP {status}"),
            }
            .into());
        }

        let total_bytes = response.content_length();
        debug!("Response headers received, content length: {total_bytes:?}");

        let file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFFER_SIZE, file);

        let mut bytes_read = 0u64;
        let mut last_report = started;
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(url, e))? {
            writer
                .write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write to {}", dest.display()))?;
            bytes_read += chunk.len() as u64;

            let now = Instant::now();
            if now.duration_since(last_report) >= self.progress_interval {
                last_report = now;
                on_progress(&DownloadProgress {
                    bytes_read,
                    total_bytes,
                    elapsed: now.duration_since(started),
                    finished: false,
                });
            }
        }

        writer.flush().await.with_context(|| format!("Failed to flush {}", dest.display()))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .with_context(|| format!("Failed to sync {}", dest.display()))?;

        if let Some(total) = total_bytes.filter(|total| *total != bytes_read) {
            return Err(UpdateError::NetworkError {
                operation: format!("download {url}"),
                reason: format!("connection closed after {bytes_read} of {total} bytes"),
            }
            .into());
        }

        on_progress(&DownloadProgress {
            bytes_read,
            total_bytes,
            elapsed: started.elapsed(),
            finished: true,
        });

        info!("Downloaded {bytes_read} bytes in {:.1}s", started.elapsed().as_secs_f64());
        Ok(bytes_read)
    }

    fn map_error(&self, url: &Url, error: reqwest::Error) -> anyhow::Error {
        if error.is_timeout() {
            UpdateError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
            .into()
        } else {
            UpdateError::NetworkError {
                operation: format!("download {url}"),
                reason: format!("{error:#}"),
            }
            .into()
        }
    }
}

/// Progress callback that drives a terminal progress bar.
///
/// The bar is created on the first report, once the total size is known.
pub fn progress_bar_reporter() -> impl FnMut(&DownloadProgress) {
    let mut bar: Option<ProgressBar> = None;
    move |progress: &DownloadProgress| {
        let bar = bar.get_or_insert_with(|| {
            let bar = ProgressBar::new_download(progress.total_bytes);
            bar.set_message("Downloading update");
            bar
        });
        bar.set_position(progress.bytes_read);
        if progress.finished {
            bar.finish_and_clear();
        }
    }
}
