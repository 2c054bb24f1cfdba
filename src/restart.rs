//! Restart of the updated application.
//!
//! By the time this runs the update is committed, so nothing here can fail
//! the run: a missing executable or a failed spawn is logged and ignored.

use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Start `install_dir/main_executable` detached, with `install_dir` as its
/// working directory.
///
/// Returns `true` if the process was started.
pub fn relaunch(install_dir: &Path, main_executable: &str) -> bool {
    let exe = install_dir.join(main_executable);
    if !exe.is_file() {
        warn!("Updated application not found at {}, not restarting", exe.display());
        return false;
    }

    let mut command = Command::new(&exe);
    command
        .current_dir(install_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    detach(&mut command);

    match command.spawn() {
        Ok(child) => {
            info!("Restarted {} (pid {})", exe.display(), child.id());
            true
        }
        Err(e) => {
            warn!("Could not restart {}: {e}", exe.display());
            false
        }
    }
}

#[cfg(windows)]
fn detach(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    use windows::Win32::System::Threading::{CREATE_NEW_PROCESS_GROUP, DETACHED_PROCESS};

    command.creation_flags((DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP).0);
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    // Own process group, so the app survives the updater's terminal closing
    command.process_group(0);
}
