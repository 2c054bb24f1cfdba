//! Invoking the `updater` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use inplace_updater::test_utils::{PackageBuilder, write_tree};

use crate::common::{PackageServer, Reply};

fn updater() -> Command {
    let mut cmd = Command::cargo_bin("updater").unwrap();
    cmd.env("UPDATER_NO_PAUSE", "1")
        .env("UPDATER_NO_PROGRESS", "1")
        .env_remove("UPDATER_CONFIG_PATH")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_missing_arguments_print_usage() {
    updater().assert().code(2).stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_missing_url_prints_usage() {
    let temp = TempDir::new().unwrap();
    updater()
        .arg(temp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("DOWNLOAD_URL"));
}

#[test]
fn test_help_succeeds() {
    updater()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("INSTALL_DIR"));
}

#[test]
fn test_nonexistent_install_dir_is_usage_error() {
    let temp = TempDir::new().unwrap();
    updater()
        .arg(temp.path().join("missing"))
        .arg("http://127.0.0.1:9/package.zip")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_unsupported_url_scheme_is_usage_error() {
    let temp = TempDir::new().unwrap();
    updater()
        .arg(temp.path())
        .arg("ftp://example.com/package.zip")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("ftp"));
}

#[test]
fn test_broken_config_file_fails() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("updater.toml");
    std::fs::write(&config, "restart = \"sometimes\"\n").unwrap();

    updater()
        .arg("--config")
        .arg(&config)
        .arg(temp.path())
        .arg("http://127.0.0.1:9/package.zip")
        .assert()
        .code(1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_installs_update() {
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("install");
    write_tree(&install_dir, &[("app.exe", b"v1"), ("data/user.db", b"keep me")]);

    let config = temp.path().join("updater.toml");
    std::fs::write(
        &config,
        "restart = false\npause_on_exit = false\nhandle_release_delay_ms = 0\n\
         process_name = \"updater-cli-test-no-such-process\"\n",
    )
    .unwrap();

    let server =
        PackageServer::start(Reply::Package(PackageBuilder::new().file("app.exe", b"v2").build()))
            .await;
    let url = server.url();

    // The server runs on this runtime, so the blocking child runs elsewhere
    let output = tokio::task::spawn_blocking(move || {
        updater().arg("--config").arg(&config).arg(&install_dir).arg(url).output()
    })
    .await
    .unwrap()
    .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Update installed"));

    let install_dir = temp.path().join("install");
    assert_eq!(std::fs::read(install_dir.join("app.exe")).unwrap(), b"v2");
    assert_eq!(std::fs::read(install_dir.join("data/user.db")).unwrap(), b"keep me");
}
