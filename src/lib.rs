//! In-place application updater
//!
//! A small companion program that a desktop or server application launches to
//! replace itself with a newer version. It is handed an install directory and
//! a download URL, and either leaves the new version in place or puts the old
//! one back.
//!
//! # Architecture Overview
//!
//! A run is a fixed pipeline of stages, each of which may stop the run:
//!
//! 1. [`privilege`] - verify the install directory is writable, relaunching
//!    elevated if it is not
//! 2. [`fetch`] - stream the update package to a temporary file
//! 3. [`process`] - terminate running instances of the application
//! 4. [`transaction`] - stage, back up, commit, and on failure roll back
//! 5. [`restart`] - start the updated application
//!
//! [`updater`] wires the stages together; [`cli`] is the process entry point.
//!
//! ## Key Properties
//!
//! - **All or nothing**: once files start moving, a failure restores the
//!   previous version
//! - **Protected data**: the `data` subtree of the install directory is never
//!   read, moved, or overwritten
//! - **Zip-slip safe**: package entries that would land outside the staging
//!   area are skipped
//! - **Self-cleaning**: staging and backup areas are removed after every run,
//!   and stale ones from an interrupted run are cleared first
//!
//! # Install Directory Layout
//!
//! ```text
//! <install_dir>/
//! ├── app.exe              replaced by the update
//! ├── lib.dll              replaced or removed by the update
//! ├── data/                protected, never touched
//! ├── .update-staging/     exists only during a run
//! └── .update-backup/      exists only during a run
//! ```
//!
//! # Configuration (updater.toml)
//!
//! ```toml
//! main_executable = "app.exe"
//! protected_dir = "data"
//! restart = true
//! download_timeout_secs = 300
//! ```
//!
//! # Command-Line Usage
//!
//! ```bash
//! updater /opt/myapp https://example.com/releases/myapp-2.0.zip
//! updater --verbose --no-progress "C:\Program Files\MyApp" https://example.com/myapp.zip
//! ```

// Pipeline stages
pub mod fetch;
pub mod privilege;
pub mod process;
pub mod restart;
pub mod transaction;
pub mod updater;

// Entry point and configuration
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;

// Supporting modules
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
