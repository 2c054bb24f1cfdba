//! Error handling for the updater
//!
//! This module provides the error taxonomy and user-facing error reporting for
//! the update pipeline. It follows two principles:
//! 1. **Strongly-typed errors** so the pipeline can tell a rollback-worthy
//!    failure from a fatal-but-harmless one
//! 2. **User-friendly messages** with actionable suggestions, because the
//!    updater is usually run by a desktop user, not a developer
//!
//! # Architecture
//!
//! - [`UpdateError`] - one variant per failure category of the pipeline
//! - [`ErrorContext`] - wrapper that adds details and a suggestion for display
//! - [`user_friendly_error`] - converts any [`anyhow::Error`] into an
//!   [`ErrorContext`], walking the error chain for known error types
//!
//! Engine functions return [`anyhow::Result`]; typed failures are raised as
//! [`UpdateError`] values and decorated with `.context(..)` on the way up.
//! Individual rollback failures are not errors at all: they are logged and
//! counted in a [`RollbackReport`](crate::transaction::RollbackReport).
//!
//! # Examples
//!
//! ```rust,no_run
//! use inplace_updater::core::{UpdateError, user_friendly_error};
//!
//! let error = UpdateError::PermissionDenied {
//!     path: "/opt/app".to_string(),
//!     reason: "probe file could not be created".to_string(),
//! };
//! let context = user_friendly_error(anyhow::Error::from(error));
//! context.display(); // Shows colored error with a suggestion
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for update operations
///
/// Each variant maps to one category of the update pipeline's error taxonomy.
/// Payloads are plain strings so the error stays [`Clone`] and can be
/// re-raised after a rollback.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Invocation was malformed (missing or invalid arguments)
    #[error("Invalid usage: {message}")]
    Usage {
        /// What was wrong with the invocation
        message: String,
    },

    /// The install directory is not writable, even with elevated rights
    #[error("Permission denied: cannot write to {path}")]
    PermissionDenied {
        /// Install directory that failed the write probe
        path: String,
        /// Underlying reason reported by the OS
        reason: String,
    },

    /// The elevated relaunch could not be started
    #[error("Failed to relaunch the updater with elevated rights")]
    ElevationFailed {
        /// Reason the relaunch could not be started
        reason: String,
    },

    /// Download failed because of a network or HTTP error
    #[error("Network error: {operation}")]
    NetworkError {
        /// The network operation that failed
        operation: String,
        /// Reason for the network failure
        reason: String,
    },

    /// Download exceeded the fixed request timeout
    #[error("Download timed out after {timeout_secs}s: {url}")]
    Timeout {
        /// URL that was being downloaded
        url: String,
        /// Timeout that was exceeded, in seconds
        timeout_secs: u64,
    },

    /// The downloaded package could not be read as an archive
    #[error("Failed to extract update package {archive}")]
    ExtractionError {
        /// Path of the archive that failed
        archive: String,
        /// Reason the archive could not be read
        reason: String,
    },

    /// Backup or commit failed; the install directory was rolled back
    #[error("Update failed during {phase}: {path}")]
    TransactionError {
        /// Transaction phase that failed (`backup` or `commit`)
        phase: String,
        /// File being moved when the failure happened
        path: String,
        /// Underlying I/O failure
        reason: String,
        /// Number of files restored by the rollback
        restored: usize,
        /// Number of files the rollback could not restore
        unrestored: usize,
    },

    /// Configuration file exists but could not be used
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl Clone for UpdateError {
    fn clone(&self) -> Self {
        match self {
            Self::Usage {
                message,
            } => Self::Usage {
                message: message.clone(),
            },
            Self::PermissionDenied {
                path,
                reason,
            } => Self::PermissionDenied {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ElevationFailed {
                reason,
            } => Self::ElevationFailed {
                reason: reason.clone(),
            },
            Self::NetworkError {
                operation,
                reason,
            } => Self::NetworkError {
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::Timeout {
                url,
                timeout_secs,
            } => Self::Timeout {
                url: url.clone(),
                timeout_secs: *timeout_secs,
            },
            Self::ExtractionError {
                archive,
                reason,
            } => Self::ExtractionError {
                archive: archive.clone(),
                reason: reason.clone(),
            },
            Self::TransactionError {
                phase,
                path,
                reason,
                restored,
                unrestored,
            } => Self::TransactionError {
                phase: phase.clone(),
                path: path.clone(),
                reason: reason.clone(),
                restored: *restored,
                unrestored: *unrestored,
            },
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            // io::Error is not Clone; keep kind and message
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// Bundles an [`UpdateError`] with optional details and a suggestion. The
/// top-level handler prints it with [`display`](Self::display) before the
/// interactive exit pause.
///
/// # Examples
///
/// ```rust,no_run
/// use inplace_updater::core::{ErrorContext, UpdateError};
///
/// let context = ErrorContext::new(UpdateError::Other { message: "boom".into() })
///     .with_suggestion("Run the updater again")
///     .with_details("The previous version is still installed");
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying update error
    pub error: UpdateError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no details or suggestion.
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: red and bold
    /// - Details: yellow
    /// - Suggestion: green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// Walks the error chain looking for an [`UpdateError`] first, then for a raw
/// [`std::io::Error`]. Anything else is reported with its full context chain
/// as the message.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    for cause in error.chain() {
        if let Some(update_error) = cause.downcast_ref::<UpdateError>() {
            let ctx = create_error_context(update_error);
            // Keep the outermost context if it adds information
            let outer = error.to_string();
            if ctx.details.is_none() && outer != update_error.to_string() {
                return ctx.with_details(outer);
            }
            return ctx;
        }
    }

    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            return match io_error.kind() {
                std::io::ErrorKind::PermissionDenied => ErrorContext::new(
                    UpdateError::PermissionDenied {
                        path: "install directory".to_string(),
                        reason: io_error.to_string(),
                    },
                )
                .with_suggestion(elevation_suggestion())
                .with_details(format!("{error:#}")),
                std::io::ErrorKind::NotFound => ErrorContext::new(UpdateError::Other {
                    message: format!("File not found: {io_error}"),
                })
                .with_suggestion("Check that the install directory still exists and try again")
                .with_details(format!("{error:#}")),
                _ => ErrorContext::new(UpdateError::Other {
                    message: format!("{error:#}"),
                }),
            };
        }
    }

    ErrorContext::new(UpdateError::Other {
        message: format!("{error:#}"),
    })
}

fn elevation_suggestion() -> &'static str {
    if cfg!(windows) {
        "Run the updater as Administrator or check the folder permissions in File Explorer"
    } else {
        "Run the updater with 'sudo' or check the folder permissions with 'ls -la'"
    }
}

/// Attach details and a suggestion to a known [`UpdateError`].
#[must_use]
pub fn create_error_context(error: &UpdateError) -> ErrorContext {
    match error {
        UpdateError::Usage {
            ..
        } => ErrorContext::new(error.clone())
            .with_suggestion("Usage: updater <INSTALL_DIR> <DOWNLOAD_URL>"),

        UpdateError::PermissionDenied {
            reason,
            ..
        } => ErrorContext::new(error.clone())
            .with_suggestion(elevation_suggestion())
            .with_details(format!(
                "The updater is already running with elevated rights and still cannot write: {reason}"
            )),

        UpdateError::ElevationFailed {
            reason,
        } => ErrorContext::new(error.clone())
            .with_suggestion("Accept the elevation prompt, or start the updater as an administrator")
            .with_details(reason.clone()),

        UpdateError::NetworkError {
            reason,
            ..
        } => ErrorContext::new(error.clone())
            .with_suggestion("Check your internet connection and run the update again")
            .with_details(format!("{reason}. The installed version was not modified")),

        UpdateError::Timeout {
            ..
        } => ErrorContext::new(error.clone())
            .with_suggestion("Try again on a faster or more stable connection")
            .with_details("The installed version was not modified"),

        UpdateError::ExtractionError {
            reason,
            ..
        } => ErrorContext::new(error.clone())
            .with_suggestion("The download may be corrupted. Run the update again")
            .with_details(format!("{reason}. The installed version was not modified")),

        UpdateError::TransactionError {
            reason,
            restored,
            unrestored,
            ..
        } => {
            let details = if *unrestored == 0 {
                format!("{reason}. The previous version was restored ({restored} files)")
            } else {
                format!(
                    "{reason}. Rollback restored {restored} files but {unrestored} could not be restored"
                )
            };
            let suggestion = if *unrestored == 0 {
                "Close every running copy of the application and run the update again"
            } else {
                "Reinstall the application; some files of the previous version are missing"
            };
            ErrorContext::new(error.clone()).with_suggestion(suggestion).with_details(details)
        }

        UpdateError::ConfigError {
            ..
        } => ErrorContext::new(error.clone())
            .with_suggestion("Fix or remove updater.toml, or pass a valid file with --config"),

        _ => ErrorContext::new(error.clone()),
    }
}
