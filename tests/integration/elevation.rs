//! Privilege gate hand-off to an elevated copy.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use inplace_updater::core::{UpdateError, UpdateRequest};
use inplace_updater::privilege::{Elevation, PrivilegeGate, WriteProbe};
use inplace_updater::test_utils::{PackageBuilder, snapshot_tree};
use inplace_updater::updater::{UpdateOutcome, Updater};

use crate::common::{PackageServer, Reply, TestInstall, test_config};

struct ReadOnly;

impl WriteProbe for ReadOnly {
    fn probe(&self, _dir: &Path) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "access denied"))
    }
}

/// Records relaunch requests instead of performing them.
#[derive(Default)]
struct RecordingElevation {
    elevated: bool,
    relaunches: Arc<Mutex<Vec<Vec<OsString>>>>,
}

impl Elevation for RecordingElevation {
    fn is_elevated(&self) -> bool {
        self.elevated
    }

    fn relaunch_elevated(&self, _exe: &Path, args: &[OsString]) -> anyhow::Result<()> {
        self.relaunches.lock().unwrap().push(args.to_vec());
        Ok(())
    }
}

#[tokio::test]
async fn test_unwritable_install_relaunches_once_and_stops() {
    let install = TestInstall::v1();
    let before = snapshot_tree(&install.install_dir);
    let server =
        PackageServer::start(Reply::Package(PackageBuilder::new().file("app.exe", b"v2").build()))
            .await;

    let elevation = RecordingElevation::default();
    let relaunches = Arc::clone(&elevation.relaunches);
    let gate = PrivilegeGate::new(Box::new(ReadOnly), Box::new(elevation));

    let args: Vec<OsString> =
        vec![install.install_dir.clone().into_os_string(), server.url().into(), "--quiet".into()];
    let request = UpdateRequest::new(&install.install_dir, &server.url()).unwrap();
    let outcome = Updater::new(test_config())
        .with_gate(gate)
        .with_progress(false)
        .run(&request, &args)
        .await
        .unwrap();

    assert_eq!(outcome, UpdateOutcome::RelaunchedElevated);
    assert_eq!(*relaunches.lock().unwrap(), vec![args]);
    assert_eq!(server.hits(), 0, "nothing may be downloaded before the hand-off");
    assert_eq!(snapshot_tree(&install.install_dir), before);
}

#[tokio::test]
async fn test_unwritable_while_elevated_is_fatal() {
    let install = TestInstall::v1();
    let server = PackageServer::start(Reply::NotFound).await;

    let elevation = RecordingElevation {
        elevated: true,
        ..RecordingElevation::default()
    };
    let relaunches = Arc::clone(&elevation.relaunches);
    let gate = PrivilegeGate::new(Box::new(ReadOnly), Box::new(elevation));

    let request = UpdateRequest::new(&install.install_dir, &server.url()).unwrap();
    let err = Updater::new(test_config())
        .with_gate(gate)
        .with_progress(false)
        .run(&request, &[])
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<UpdateError>(),
        Some(UpdateError::PermissionDenied { .. })
    ));
    assert!(relaunches.lock().unwrap().is_empty());
    assert_eq!(server.hits(), 0);
}
