//! Termination of running application instances
//!
//! Files of a running program are often locked (always on Windows), so the
//! application must be gone before the transaction starts moving files.
//! The reaper never fails: a process that already exited, refuses the signal,
//! or outlives its wait is logged and skipped.

use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use crate::config::UpdaterConfig;
use crate::constants::PROCESS_POLL_INTERVAL;

/// Finds and terminates processes by name.
#[derive(Debug, Clone)]
pub struct ProcessReaper {
    process_name: String,
    exit_wait: Duration,
    release_delay: Duration,
}

impl ProcessReaper {
    /// Reaper for `process_name` with explicit timings.
    #[must_use]
    pub fn new(process_name: impl Into<String>, exit_wait: Duration, release_delay: Duration) -> Self {
        Self {
            process_name: process_name.into(),
            exit_wait,
            release_delay,
        }
    }

    /// Reaper configured from an [`UpdaterConfig`].
    #[must_use]
    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self::new(config.process_name(), config.process_exit_wait(), config.handle_release_delay())
    }

    /// Terminate every running instance and return how many were signalled.
    ///
    /// Each process gets a bounded wait to exit; one that is still alive
    /// afterwards produces a warning and the run continues. If anything was
    /// terminated, a short pause follows so the OS can release file handles.
    pub async fn terminate_running_instances(&self) -> usize {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let own_pid = sysinfo::get_current_pid().ok();
        let targets: Vec<Pid> = system
            .processes()
            .iter()
            .filter(|(pid, _)| Some(**pid) != own_pid)
            .filter(|(_, process)| {
                matches_name(process.name(), &self.process_name)
                    || process
                        .exe()
                        .and_then(Path::file_name)
                        .is_some_and(|exe| matches_name(exe, &self.process_name))
            })
            .map(|(pid, _)| *pid)
            .collect();

        if targets.is_empty() {
            debug!("No running instances of '{}'", self.process_name);
            return 0;
        }

        info!("Terminating {} running instance(s) of '{}'", targets.len(), self.process_name);

        let mut terminated = 0;
        for pid in targets {
            let signalled = system.process(pid).is_some_and(sysinfo::Process::kill);
            if !signalled {
                debug!("Could not signal process {pid}, it may have exited already");
                continue;
            }
            terminated += 1;

            if !self.wait_for_exit(&mut system, pid).await {
                warn!(
                    "Process {pid} did not exit within {}s, continuing anyway",
                    self.exit_wait.as_secs()
                );
            }
        }

        if terminated > 0 {
            tokio::time::sleep(self.release_delay).await;
        }
        terminated
    }

    async fn wait_for_exit(&self, system: &mut System, pid: Pid) -> bool {
        let deadline = Instant::now() + self.exit_wait;
        loop {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            let gone = system
                .process(pid)
                .is_none_or(|p| matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead));
            if gone {
                debug!("Process {pid} exited");
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(PROCESS_POLL_INTERVAL).await;
        }
    }
}

/// Name comparison that ignores a trailing `.exe`.
///
/// Case-insensitive on Windows, exact elsewhere, following how each platform
/// treats executable names.
#[must_use]
pub fn matches_name(candidate: &OsStr, target: &str) -> bool {
    let candidate = candidate.to_string_lossy();
    let (candidate, target) = (strip_exe_suffix(&candidate), strip_exe_suffix(target));
    if cfg!(windows) { candidate.eq_ignore_ascii_case(target) } else { candidate == target }
}

fn strip_exe_suffix(name: &str) -> &str {
    let len = name.len();
    if len > 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".exe") {
        &name[..len - 4]
    } else {
        name
    }
}
