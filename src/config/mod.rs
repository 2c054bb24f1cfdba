//! Configuration for the updater
//!
//! Every setting has a built-in default, so the updater works with no
//! configuration file at all. Deployments that need a different executable
//! name, data folder or timing can ship an `updater.toml` next to the updater
//! binary.
//!
//! # Resolution order
//!
//! 1. `--config <PATH>` on the command line
//! 2. `UPDATER_CONFIG_PATH` environment variable
//! 3. `updater.toml` in the directory of the running executable
//! 4. Built-in defaults
//!
//! Paths from (1) and (2) must exist. A file found at any step that cannot be
//! read or parsed is a fatal configuration error; the updater never falls back
//! to defaults over a broken file.
//!
//! # Example
//!
//! ```toml
//! main_executable = "MyApp.exe"
//! protected_dir = "userdata"
//! process_exit_wait_secs = 20
//! restart = true
//! ```
//!
//! The configuration is passed explicitly through the pipeline; there is no
//! process-wide configuration state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_APP_STEM, DEFAULT_BACKUP_DIR, DEFAULT_DOWNLOAD_TIMEOUT,
    DEFAULT_HANDLE_RELEASE_DELAY, DEFAULT_MOVE_ATTEMPTS, DEFAULT_PROCESS_EXIT_WAIT,
    DEFAULT_PROGRESS_INTERVAL, DEFAULT_PROTECTED_DIR, DEFAULT_STAGING_DIR, ENV_CONFIG_PATH,
};
use crate::core::UpdateError;

/// Settings for one updater run.
///
/// Deserialized from TOML; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdaterConfig {
    /// Main application executable, relative to the install directory.
    ///
    /// Restarted after a successful update.
    #[serde(default = "default_main_executable")]
    pub main_executable: String,

    /// Process name to terminate before replacing files.
    ///
    /// Defaults to the file stem of [`main_executable`](Self::main_executable).
    #[serde(default)]
    pub process_name: Option<String>,

    /// Name of the user-data folder the update never touches.
    #[serde(default = "default_protected_dir")]
    pub protected_dir: String,

    /// Name of the staging folder created inside the install directory.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Name of the backup folder created inside the install directory.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,

    /// Timeout for the whole download, in seconds.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Minimum interval between two progress reports, in milliseconds.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// How long to wait for each terminated process to exit, in seconds.
    #[serde(default = "default_process_exit_wait_secs")]
    pub process_exit_wait_secs: u64,

    /// Pause after terminating processes, in milliseconds.
    #[serde(default = "default_handle_release_delay_ms")]
    pub handle_release_delay_ms: u64,

    /// Attempts per file move before it counts as failed.
    #[serde(default = "default_move_attempts")]
    pub move_attempts: u32,

    /// Whether to start the application again after a successful update.
    #[serde(default = "default_true")]
    pub restart: bool,

    /// Whether to wait for the user before exiting.
    #[serde(default = "default_true")]
    pub pause_on_exit: bool,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            main_executable: default_main_executable(),
            process_name: None,
            protected_dir: default_protected_dir(),
            staging_dir: default_staging_dir(),
            backup_dir: default_backup_dir(),
            download_timeout_secs: default_download_timeout_secs(),
            progress_interval_ms: default_progress_interval_ms(),
            process_exit_wait_secs: default_process_exit_wait_secs(),
            handle_release_delay_ms: default_handle_release_delay_ms(),
            move_attempts: default_move_attempts(),
            restart: true,
            pause_on_exit: true,
        }
    }
}

impl UpdaterConfig {
    /// Resolve and load the configuration for this run.
    ///
    /// `explicit` is the `--config` argument, if any. See the module docs for
    /// the full resolution order.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path).await;
        }

        if let Some(path) = std::env::var_os(ENV_CONFIG_PATH) {
            return Self::load_from(Path::new(&path)).await;
        }

        if let Some(path) = Self::adjacent_path().filter(|p| p.is_file()) {
            return Self::load_from(&path).await;
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await.map_err(|e| UpdateError::ConfigError {
            message: format!("cannot read {}: {e}", path.display()),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| UpdateError::ConfigError {
            message: format!("cannot parse {}: {e}", path.display()),
        })?;
        config.validate().with_context(|| format!("Invalid configuration in {}", path.display()))?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// `updater.toml` next to the running executable.
    fn adjacent_path() -> Option<PathBuf> {
        let exe = std::env::current_exe().ok()?;
        Some(exe.parent()?.join(CONFIG_FILE_NAME))
    }

    /// Reject values that would make the transaction unsafe.
    ///
    /// Folder names must be single, plain path components so staging and
    /// backup always stay inside the install directory.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("protected_dir", &self.protected_dir),
            ("staging_dir", &self.staging_dir),
            ("backup_dir", &self.backup_dir),
        ] {
            if !is_plain_name(value) {
                return Err(UpdateError::ConfigError {
                    message: format!("{key} must be a plain folder name, got '{value}'"),
                }
                .into());
            }
        }

        let names = [&self.protected_dir, &self.staging_dir, &self.backup_dir];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                if a.eq_ignore_ascii_case(b) {
                    return Err(UpdateError::ConfigError {
                        message: format!("folder name '{a}' is used twice"),
                    }
                    .into());
                }
            }
        }

        if self.main_executable.trim().is_empty() {
            return Err(UpdateError::ConfigError {
                message: "main_executable must not be empty".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Process name probed by the reaper.
    #[must_use]
    pub fn process_name(&self) -> String {
        if let Some(name) = &self.process_name {
            return name.clone();
        }
        Path::new(&self.main_executable)
            .file_stem()
            .map_or_else(|| DEFAULT_APP_STEM.to_string(), |s| s.to_string_lossy().into_owned())
    }

    /// Download timeout as a [`Duration`].
    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Progress interval as a [`Duration`].
    #[must_use]
    pub const fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Per-process exit wait as a [`Duration`].
    #[must_use]
    pub const fn process_exit_wait(&self) -> Duration {
        Duration::from_secs(self.process_exit_wait_secs)
    }

    /// Handle release delay as a [`Duration`].
    #[must_use]
    pub const fn handle_release_delay(&self) -> Duration {
        Duration::from_millis(self.handle_release_delay_ms)
    }
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

fn default_main_executable() -> String {
    format!("{DEFAULT_APP_STEM}{}", std::env::consts::EXE_SUFFIX)
}

fn default_protected_dir() -> String {
    DEFAULT_PROTECTED_DIR.to_string()
}

fn default_staging_dir() -> String {
    DEFAULT_STAGING_DIR.to_string()
}

fn default_backup_dir() -> String {
    DEFAULT_BACKUP_DIR.to_string()
}

const fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT.as_secs()
}

const fn default_progress_interval_ms() -> u64 {
    DEFAULT_PROGRESS_INTERVAL.as_millis() as u64
}

const fn default_process_exit_wait_secs() -> u64 {
    DEFAULT_PROCESS_EXIT_WAIT.as_secs()
}

const fn default_handle_release_delay_ms() -> u64 {
    DEFAULT_HANDLE_RELEASE_DELAY.as_millis() as u64
}

const fn default_move_attempts() -> u32 {
    DEFAULT_MOVE_ATTEMPTS
}

const fn default_true() -> bool {
    true
}
