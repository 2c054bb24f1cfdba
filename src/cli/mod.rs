//! Command-line interface for the updater
//!
//! The host application starts the updater as a separate process:
//!
//! ```text
//! updater [OPTIONS] <INSTALL_DIR> <DOWNLOAD_URL>
//! ```
//!
//! # Global Options
//!
//! - `--verbose` / `-v`: Debug logging
//! - `--quiet` / `-q`: Errors only, no progress bar
//! - `--no-progress`: Disable the download progress bar
//! - `--config` / `-c`: Explicit `updater.toml`
//! - `--no-pause`: Exit immediately on failure instead of waiting for the user
//!
//! # Exit codes
//!
//! | code | meaning |
//! |---|---|
//! | 0 | update installed, or handed over to an elevated copy |
//! | 1 | update failed (the previous version is still installed) |
//! | 2 | invalid invocation (missing arguments, no such install directory, unsupported URL) |
//!
//! # Environment
//!
//! - `RUST_LOG` overrides the log filter chosen by `--verbose` / `--quiet`
//! - `UPDATER_NO_PROGRESS` disables progress bars
//! - `UPDATER_NO_PAUSE` disables every exit pause
//! - `UPDATER_CONFIG_PATH` points at a configuration file

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::UpdaterConfig;
use crate::constants::{ENV_NO_PAUSE, ENV_NO_PROGRESS, NON_INTERACTIVE_EXIT_DELAY, USAGE_EXIT_DELAY};
use crate::core::{UpdateError, UpdateRequest, user_friendly_error};
use crate::updater::{UpdateOutcome, Updater};

/// Exit code for a successful run or an elevation hand-off.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for a failed update.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for an invalid invocation.
pub const EXIT_USAGE: i32 = 2;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "updater",
    about = "Replace an installed application with a new version, in place",
    version,
    long_about = "Downloads an update package and swaps it into the install directory. \
                  If anything fails while files are being replaced, the previous version \
                  is restored."
)]
pub struct Cli {
    /// Install directory of the application to update
    #[arg(value_name = "INSTALL_DIR")]
    install_dir: PathBuf,

    /// URL of the update package (zip)
    #[arg(value_name = "DOWNLOAD_URL")]
    download_url: String,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors
    #[arg(short, long)]
    quiet: bool,

    /// Disable the download progress bar
    #[arg(long)]
    no_progress: bool,

    /// Path to an updater.toml configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Exit immediately on failure instead of waiting for the user
    #[arg(long)]
    no_pause: bool,
}

/// Settings derived from the command line that shape the run itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// Log filter used when `RUST_LOG` is not set.
    pub log_level: &'static str,
    /// Whether to draw progress bars.
    pub show_progress: bool,
    /// Explicit configuration file.
    pub config_path: Option<PathBuf>,
    /// Whether failures may wait for the user (still subject to `pause_on_exit`).
    pub allow_pause: bool,
}

impl Cli {
    /// Derive the run settings from the flags and environment.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        };

        CliConfig {
            log_level,
            show_progress: !self.no_progress
                && !self.quiet
                && std::env::var_os(ENV_NO_PROGRESS).is_none(),
            config_path: self.config.clone(),
            allow_pause: !self.no_pause && std::env::var_os(ENV_NO_PAUSE).is_none(),
        }
    }

    /// Run the updater and return the process exit code.
    ///
    /// Errors are printed with suggestions; on failure the process waits for
    /// the user before returning so the message can be read.
    pub async fn run(self) -> i32 {
        let cli_config = self.build_config();
        init_logging(cli_config.log_level);
        let quiet = self.quiet;

        let mut pause_on_exit = true;
        let result = self.execute(&cli_config, &mut pause_on_exit).await;

        match result {
            Ok(UpdateOutcome::Updated {
                report,
                ..
            }) => {
                if !quiet {
                    println!(
                        "{} Update installed ({} files)",
                        "✓".green().bold(),
                        report.committed
                    );
                }
                EXIT_SUCCESS
            }
            Ok(UpdateOutcome::RelaunchedElevated) => EXIT_SUCCESS,
            Err(e) => {
                let code = exit_code_for(&e);
                user_friendly_error(e).display();
                if cli_config.allow_pause && pause_on_exit {
                    wait_for_user();
                }
                code
            }
        }
    }

    async fn execute(
        self,
        cli_config: &CliConfig,
        pause_on_exit: &mut bool,
    ) -> Result<UpdateOutcome> {
        let config = UpdaterConfig::load(cli_config.config_path.as_deref()).await?;
        *pause_on_exit = config.pause_on_exit;

        let request = UpdateRequest::new(&self.install_dir, &self.download_url)?;
        let relaunch_args: Vec<OsString> = std::env::args_os().skip(1).collect();

        Updater::new(config)
            .with_progress(cli_config.show_progress)
            .run(&request, &relaunch_args)
            .await
    }
}

/// Exit code for a failed run: [`EXIT_USAGE`] for invalid arguments,
/// [`EXIT_FAILURE`] for everything else.
#[must_use]
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<UpdateError>() {
        Some(UpdateError::Usage {
            ..
        }) => EXIT_USAGE,
        _ => EXIT_FAILURE,
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Parse the command line, handling invalid invocations.
///
/// `--help` and `--version` print and exit normally. Any other parse error
/// prints the usage, waits briefly so a double-clicked updater does not vanish
/// instantly, and exits with [`EXIT_USAGE`].
#[must_use]
pub fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            use clap::error::ErrorKind;
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                err.exit();
            }
            let _ = err.print();
            if std::env::var_os(ENV_NO_PAUSE).is_none() {
                std::thread::sleep(USAGE_EXIT_DELAY);
            }
            std::process::exit(EXIT_USAGE);
        }
    }
}

/// Keep the console open until the user acknowledges the failure.
///
/// Waits for Enter on an interactive terminal, otherwise sleeps briefly.
fn wait_for_user() {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprintln!("Press Enter to close...");
        let mut line = String::new();
        let _ = stdin.read_line(&mut line);
    } else {
        std::thread::sleep(NON_INTERACTIVE_EXIT_DELAY);
    }
}
