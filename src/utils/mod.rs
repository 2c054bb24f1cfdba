//! Cross-platform utilities and helpers
//!
//! # Modules
//!
//! - [`fs`] - Path containment checks, file moves with retry, directory cleanup
//! - [`backoff`] - Retry delays for file moves
//! - [`progress`] - Progress bars and spinners for the download
//!
//! # Example
//!
//! ```rust,no_run
//! use inplace_updater::utils::{is_safe_path, ProgressBar};
//! use std::path::Path;
//!
//! assert!(!is_safe_path(Path::new("/opt/app/.update-staging"), Path::new("../../etc/passwd")));
//!
//! let progress = ProgressBar::new_spinner();
//! progress.set_message("Working...");
//! ```

pub mod backoff;
pub mod fs;
pub mod progress;

pub use fs::{
    FileMover, RetryingMover, ensure_dir, is_safe_path, normalize_path, remove_dir_all,
    remove_empty_parents,
};
pub use progress::ProgressBar;
