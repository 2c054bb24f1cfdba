//! End-to-end update runs that succeed.

use inplace_updater::core::UpdateRequest;
use inplace_updater::test_utils::{PackageBuilder, init_test_logging, snapshot_tree, write_tree};
use inplace_updater::updater::{UpdateOutcome, Updater};

use crate::common::{PackageServer, Reply, TestInstall, test_config};

async fn run_update(install: &TestInstall, package: Vec<u8>) -> anyhow::Result<UpdateOutcome> {
    let server = PackageServer::start(Reply::Package(package)).await;
    let request = UpdateRequest::new(&install.install_dir, &server.url())?;
    Updater::new(test_config()).with_progress(false).run(&request, &[]).await
}

fn v2_package() -> Vec<u8> {
    PackageBuilder::new().file("app.exe", b"app v2").file("lib2.dll", b"lib2 v2").build()
}

#[tokio::test]
async fn test_update_replaces_application_files() {
    init_test_logging(None);
    let install = TestInstall::v1();

    let outcome = run_update(&install, v2_package()).await.unwrap();

    match outcome {
        UpdateOutcome::Updated {
            report,
            restarted,
        } => {
            assert_eq!(report.extraction.extracted, 2);
            assert_eq!(report.backed_up, 2);
            assert_eq!(report.committed, 2);
            assert!(!restarted);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let tree = snapshot_tree(&install.install_dir);
    let names: Vec<&str> = tree.keys().map(String::as_str).collect();
    assert_eq!(names, ["app.exe", "data/config.json", "lib2.dll"]);
    assert_eq!(tree["app.exe"], b"app v2");
    assert_eq!(tree["lib2.dll"], b"lib2 v2");
    assert_eq!(tree["data/config.json"], br#"{"theme":"dark"}"#);
}

#[tokio::test]
async fn test_update_leaves_no_work_directories() {
    let install = TestInstall::v1();

    run_update(&install, v2_package()).await.unwrap();

    assert!(!install.install_dir.join(".update-staging").exists());
    assert!(!install.install_dir.join(".update-backup").exists());
}

#[tokio::test]
async fn test_protected_data_is_never_touched() {
    let install = TestInstall::with_files(&[
        ("app.exe", b"app v1"),
        ("data/config.json", b"user settings"),
        ("data/saves/slot1.bin", &[0u8, 1, 2, 3]),
    ]);
    let data_before = snapshot_tree(&install.install_dir.join("data"));

    // The package tries to overwrite and add user data, in two spellings
    let package = PackageBuilder::new()
        .file("app.exe", b"app v2")
        .file("data/config.json", b"factory defaults")
        .file("Data/new.txt", b"should not appear")
        .build();
    let outcome = run_update(&install, package).await.unwrap();

    let UpdateOutcome::Updated {
        report,
        ..
    } = outcome
    else {
        panic!("expected an update");
    };
    assert_eq!(report.extraction.skipped_protected, 2);
    assert_eq!(snapshot_tree(&install.install_dir.join("data")), data_before);
    assert_eq!(std::fs::read(install.install_dir.join("app.exe")).unwrap(), b"app v2");
}

#[tokio::test]
async fn test_zip_slip_entries_are_skipped() {
    let install = TestInstall::v1();

    let package = PackageBuilder::new()
        .file("app.exe", b"app v2")
        .file("../escape.txt", b"evil")
        .file("../../escape.txt", b"evil")
        .file("nested/../../../escape.txt", b"evil")
        .build();
    let outcome = run_update(&install, package).await.unwrap();

    let UpdateOutcome::Updated {
        report,
        ..
    } = outcome
    else {
        panic!("expected an update");
    };
    assert_eq!(report.extraction.extracted, 1);
    assert_eq!(report.extraction.skipped_unsafe, 3);
    assert!(!install.install_dir.join("escape.txt").exists());
    assert!(!install.temp.path().join("escape.txt").exists());
    assert_eq!(std::fs::read(install.install_dir.join("app.exe")).unwrap(), b"app v2");
}

#[tokio::test]
async fn test_update_is_repeatable() {
    let install = TestInstall::v1();

    run_update(&install, v2_package()).await.unwrap();
    let after_first = snapshot_tree(&install.install_dir);

    run_update(&install, v2_package()).await.unwrap();

    assert_eq!(snapshot_tree(&install.install_dir), after_first);
    assert!(!install.install_dir.join(".update-staging").exists());
    assert!(!install.install_dir.join(".update-backup").exists());
}

#[tokio::test]
async fn test_stale_work_directories_are_cleared() {
    let install = TestInstall::v1();
    // Left behind by an interrupted run
    write_tree(
        &install.install_dir,
        &[(".update-staging/junk.txt", b"stale"), (".update-backup/app.exe", b"app v0")],
    );

    run_update(&install, v2_package()).await.unwrap();

    let tree = snapshot_tree(&install.install_dir);
    let names: Vec<&str> = tree.keys().map(String::as_str).collect();
    assert_eq!(names, ["app.exe", "data/config.json", "lib2.dll"]);
    assert_eq!(tree["app.exe"], b"app v2");
}

#[tokio::test]
async fn test_nested_directories_are_installed_and_pruned() {
    let install = TestInstall::with_files(&[
        ("app.exe", b"app v1"),
        ("plugins/old/plugin.dll", b"old plugin"),
    ]);

    let package = PackageBuilder::new()
        .dir("plugins/")
        .file("app.exe", b"app v2")
        .file("plugins/new/plugin.dll", b"new plugin")
        .build();
    run_update(&install, package).await.unwrap();

    assert_eq!(
        std::fs::read(install.install_dir.join("plugins/new/plugin.dll")).unwrap(),
        b"new plugin"
    );
    assert!(!install.install_dir.join("plugins/old").exists());
}
