//! Global constants used throughout the updater.
//!
//! This module contains timeout durations, retry parameters, and other
//! numeric constants that are used across multiple modules. Values that users
//! may want to tune are surfaced through [`crate::config::UpdaterConfig`]; the
//! constants here are the defaults and the fixed limits behind them.

use std::time::Duration;

/// Default timeout for the whole package download (30 minutes).
///
/// Generous enough for large packages on slow links, but bounded so a
/// stalled connection cannot hang the update forever.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Timeout for establishing the TCP/TLS connection (30 seconds).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum interval between two progress callbacks (250ms).
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Buffer size used when writing the downloaded body to disk (64 KiB).
pub const DOWNLOAD_BUFFER_SIZE: usize = 64 * 1024;

/// How long to wait for each terminated process to exit (10 seconds).
pub const DEFAULT_PROCESS_EXIT_WAIT: Duration = Duration::from_secs(10);

/// Polling interval while waiting for a terminated process to go away.
pub const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pause after terminating the application so the OS releases file handles.
pub const DEFAULT_HANDLE_RELEASE_DELAY: Duration = Duration::from_millis(1500);

/// Attempts per file move before the move counts as failed.
pub const DEFAULT_MOVE_ATTEMPTS: u32 = 3;

/// Maximum backoff delay between move attempts (500ms).
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Starting delay for move retries (50ms), doubled on each attempt.
pub const STARTING_BACKOFF_DELAY_MS: u64 = 50;

/// Delay before exiting after a usage error so the message stays visible.
pub const USAGE_EXIT_DELAY: Duration = Duration::from_secs(3);

/// Delay before exiting when stdin is not interactive.
pub const NON_INTERACTIVE_EXIT_DELAY: Duration = Duration::from_secs(3);

/// Default name of the protected user-data subtree.
pub const DEFAULT_PROTECTED_DIR: &str = "data";

/// Default name of the staging directory inside the install directory.
pub const DEFAULT_STAGING_DIR: &str = ".update-staging";

/// Default name of the backup directory inside the install directory.
pub const DEFAULT_BACKUP_DIR: &str = ".update-backup";

/// Default file stem of the main application executable.
pub const DEFAULT_APP_STEM: &str = "app";

/// File name looked up next to the updater executable for configuration.
pub const CONFIG_FILE_NAME: &str = "updater.toml";

/// Prefix of the write-probe file created by the privilege gate.
pub const PROBE_FILE_PREFIX: &str = ".updater-probe-";

/// Prefix of the temporary file holding the downloaded package.
pub const ARCHIVE_FILE_PREFIX: &str = "updater-package-";

/// Environment variable pointing at an explicit configuration file.
pub const ENV_CONFIG_PATH: &str = "UPDATER_CONFIG_PATH";

/// Environment variable that disables progress bars when set.
pub const ENV_NO_PROGRESS: &str = "UPDATER_NO_PROGRESS";

/// Environment variable that disables every exit pause when set.
pub const ENV_NO_PAUSE: &str = "UPDATER_NO_PAUSE";
