//! Failures during replacement restore the previous version.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use inplace_updater::core::{UpdateError, UpdateRequest};
use inplace_updater::test_utils::{PackageBuilder, snapshot_tree};
use inplace_updater::updater::Updater;
use inplace_updater::utils::{FileMover, RetryingMover};

use crate::common::{PackageServer, Reply, TestInstall, test_config};

/// Fails every move into `target_dir` whose file name is `file_name`.
struct FailOn {
    target_dir: &'static str,
    file_name: &'static str,
    failures: Arc<AtomicUsize>,
    inner: RetryingMover,
}

impl FailOn {
    fn new(target_dir: &'static str, file_name: &'static str) -> (Self, Arc<AtomicUsize>) {
        let failures = Arc::new(AtomicUsize::new(0));
        let mover = Self {
            target_dir,
            file_name,
            failures: Arc::clone(&failures),
            inner: RetryingMover::new(1),
        };
        (mover, failures)
    }
}

impl FileMover for FailOn {
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        let into_target = to.components().any(|c| c.as_os_str() == self.target_dir);
        if into_target && to.file_name().is_some_and(|name| name == self.file_name) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file is locked"));
        }
        self.inner.move_file(from, to)
    }
}

/// Fails every move from the staging directory into the install directory
/// for `file_name`.
struct FailCommitOf {
    file_name: &'static str,
    inner: RetryingMover,
}

impl FileMover for FailCommitOf {
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        let from_staging = from.components().any(|c| c.as_os_str() == ".update-staging");
        if from_staging && to.file_name().is_some_and(|name| name == self.file_name) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file is locked"));
        }
        self.inner.move_file(from, to)
    }
}

fn package() -> Vec<u8> {
    PackageBuilder::new()
        .file("app.exe", b"app v2")
        .file("lib2.dll", b"lib2 v2")
        .file("zzz.bin", b"last file committed")
        .build()
}

async fn run_with_mover(
    install: &TestInstall,
    mover: Box<dyn FileMover>,
) -> anyhow::Result<inplace_updater::updater::UpdateOutcome> {
    let server = PackageServer::start(Reply::Package(package())).await;
    let request = UpdateRequest::new(&install.install_dir, &server.url())?;
    Updater::new(test_config()).with_mover(mover).with_progress(false).run(&request, &[]).await
}

#[tokio::test]
async fn test_commit_failure_restores_previous_version() {
    let install = TestInstall::v1();
    let before = snapshot_tree(&install.install_dir);

    // Files commit in name order, so app.exe and lib2.dll are already live
    let mover = FailCommitOf {
        file_name: "zzz.bin",
        inner: RetryingMover::new(1),
    };
    let err = run_with_mover(&install, Box::new(mover)).await.unwrap_err();

    match err.downcast_ref::<UpdateError>() {
        Some(UpdateError::TransactionError {
            phase,
            restored,
            unrestored,
            ..
        }) => {
            assert_eq!(phase, "commit");
            assert_eq!(*restored, 2);
            assert_eq!(*unrestored, 0);
        }
        other => panic!("expected a transaction error, got {other:?}"),
    }

    assert_eq!(snapshot_tree(&install.install_dir), before);
    assert!(!install.install_dir.join(".update-staging").exists());
    assert!(!install.install_dir.join(".update-backup").exists());
}

#[tokio::test]
async fn test_backup_failure_restores_previous_version() {
    let install = TestInstall::v1();
    let before = snapshot_tree(&install.install_dir);

    // app.exe moves to backup first, then lib.dll fails
    let (mover, failures) = FailOn::new(".update-backup", "lib.dll");
    let err = run_with_mover(&install, Box::new(mover)).await.unwrap_err();

    assert_eq!(failures.load(Ordering::SeqCst), 1);
    match err.downcast_ref::<UpdateError>() {
        Some(UpdateError::TransactionError {
            phase,
            restored,
            ..
        }) => {
            assert_eq!(phase, "backup");
            assert_eq!(*restored, 1);
        }
        other => panic!("expected a transaction error, got {other:?}"),
    }

    assert_eq!(snapshot_tree(&install.install_dir), before);
}

#[tokio::test]
async fn test_corrupt_package_leaves_install_untouched() {
    let install = TestInstall::v1();
    let before = snapshot_tree(&install.install_dir);

    let server = PackageServer::start(Reply::Package(b"definitely not a zip".to_vec())).await;
    let request = UpdateRequest::new(&install.install_dir, &server.url()).unwrap();
    let err = Updater::new(test_config())
        .with_progress(false)
        .run(&request, &[])
        .await
        .unwrap_err();

    assert!(matches!(err.downcast_ref::<UpdateError>(), Some(UpdateError::ExtractionError { .. })));
    assert_eq!(snapshot_tree(&install.install_dir), before);
}
