//! Test utilities for the updater
//!
//! Helpers shared by unit tests and the integration suite: one-time logging
//! setup, update packages built in memory, and snapshots of an install
//! directory for byte-for-byte comparisons.
//!
//! # Example
//!
//! ```rust,no_run
//! use inplace_updater::test_utils::{PackageBuilder, snapshot_tree};
//! use std::path::Path;
//!
//! let package = PackageBuilder::new()
//!     .file("app.exe", b"v2")
//!     .file("../escape.txt", b"evil")
//!     .build();
//! std::fs::write("pkg.zip", &package).unwrap();
//! let before = snapshot_tree(Path::new("/opt/app"));
//! ```

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use zip::write::SimpleFileOptions;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` if given, else `RUST_LOG`; with neither, logging stays off.
/// Output goes through the test writer so it is captured per test.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_ansi(true)
            .try_init();
    });
}

/// Builds zip packages in memory.
///
/// Entry names are written verbatim, so hostile names like `../x` can be
/// produced on purpose.
#[derive(Debug, Default, Clone)]
pub struct PackageBuilder {
    entries: Vec<(String, Option<Vec<u8>>)>,
}

impl PackageBuilder {
    /// Empty package.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file entry.
    #[must_use]
    pub fn file(mut self, name: &str, content: &[u8]) -> Self {
        self.entries.push((name.to_string(), Some(content.to_vec())));
        self
    }

    /// Add a directory entry.
    #[must_use]
    pub fn dir(mut self, name: &str) -> Self {
        self.entries.push((name.to_string(), None));
        self
    }

    /// Zip bytes of the package.
    ///
    /// # Panics
    ///
    /// Panics if the zip writer fails, which only happens on invalid input.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in &self.entries {
            match content {
                Some(content) => {
                    zip.start_file(name.as_str(), SimpleFileOptions::default())
                        .expect("start zip entry");
                    zip.write_all(content).expect("write zip entry");
                }
                None => {
                    zip.add_directory(name.as_str(), SimpleFileOptions::default())
                        .expect("add zip directory");
                }
            }
        }
        zip.finish().expect("finish zip").into_inner()
    }

    /// Write the package to `path`.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write_to(&self, path: &Path) {
        std::fs::write(path, self.build()).expect("write package");
    }
}

/// Create the files in `entries` below `root`, creating parent directories.
///
/// # Panics
///
/// Panics on any I/O error.
pub fn write_tree(root: &Path, entries: &[(&str, &[u8])]) {
    std::fs::create_dir_all(root).expect("create root");
    for (name, content) in entries {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, content).expect("write file");
    }
}

/// Every file below `root` keyed by `/`-separated relative path.
///
/// # Panics
///
/// Panics on any I/O error.
#[must_use]
pub fn snapshot_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| entry.expect("walk install dir"))
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry
                .path()
                .strip_prefix(root)
                .expect("entry below root")
                .to_string_lossy()
                .replace('\\', "/");
            (relative, std::fs::read(entry.path()).expect("read file"))
        })
        .collect()
}
