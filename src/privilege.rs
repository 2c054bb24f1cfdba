//! Write-access gate for the install directory
//!
//! Before anything is downloaded the updater proves it can write to the
//! install directory by creating and deleting a uniquely named probe file.
//! When that fails and the process is not elevated, it starts a second,
//! elevated copy of itself with the same arguments and hands the run over.
//! When the process is already elevated the failure is final, so a broken
//! directory can never cause an elevation loop.
//!
//! # Platform behavior
//!
//! | | elevated when | relaunch via |
//! |---|---|---|
//! | Windows | token elevation is set | `ShellExecuteW` with the `runas` verb |
//! | Unix | effective uid is 0 | `pkexec`, else `sudo` (found on `PATH`) |
//!
//! Both checks sit behind the [`WriteProbe`] and [`Elevation`] traits so the
//! decision logic can be exercised without touching real permissions.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::constants::PROBE_FILE_PREFIX;
use crate::core::UpdateError;

/// Result of [`PrivilegeGate::ensure_writable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// The directory is writable; continue in this process.
    Writable,
    /// An elevated copy was started; this process must exit without doing anything else.
    RelaunchedElevated,
}

/// Checks whether a directory accepts writes.
pub trait WriteProbe: Send + Sync {
    /// Succeeds only if a file can be created in `dir`.
    fn probe(&self, dir: &Path) -> io::Result<()>;
}

/// Creates and deletes `.updater-probe-<uuid>` in the directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileProbe;

impl WriteProbe for FileProbe {
    fn probe(&self, dir: &Path) -> io::Result<()> {
        let path = dir.join(format!("{PROBE_FILE_PREFIX}{}", uuid::Uuid::new_v4()));
        OpenOptions::new().write(true).create_new(true).open(&path)?;
        std::fs::remove_file(&path)
    }
}

/// Elevation status and elevated relaunch.
pub trait Elevation: Send + Sync {
    /// Whether the current process already runs with elevated rights.
    fn is_elevated(&self) -> bool;

    /// Start `exe` with `args` and elevated rights, without waiting for it.
    fn relaunch_elevated(&self, exe: &Path, args: &[OsString]) -> Result<()>;
}

/// The real operating system elevation mechanism.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemElevation;

impl Elevation for SystemElevation {
    fn is_elevated(&self) -> bool {
        platform::is_elevated()
    }

    fn relaunch_elevated(&self, exe: &Path, args: &[OsString]) -> Result<()> {
        platform::relaunch_elevated(exe, args)
    }
}

/// Decides whether the run may proceed in this process.
pub struct PrivilegeGate {
    probe: Box<dyn WriteProbe>,
    elevation: Box<dyn Elevation>,
}

impl Default for PrivilegeGate {
    fn default() -> Self {
        Self::new(Box::new(FileProbe), Box::new(SystemElevation))
    }
}

impl PrivilegeGate {
    /// Build a gate from explicit probe and elevation implementations.
    #[must_use]
    pub fn new(probe: Box<dyn WriteProbe>, elevation: Box<dyn Elevation>) -> Self {
        Self {
            probe,
            elevation,
        }
    }

    /// Make sure this process can write to `install_dir`.
    ///
    /// `relaunch_args` are the original command-line arguments (without the
    /// program name), forwarded unchanged to the elevated copy.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::PermissionDenied`] when the probe fails in an elevated process
    /// - [`UpdateError::ElevationFailed`] when the elevated copy could not be started
    pub fn ensure_writable(
        &self,
        install_dir: &Path,
        relaunch_args: &[OsString],
    ) -> Result<GateOutcome> {
        let probe_error = match self.probe.probe(install_dir) {
            Ok(()) => {
                debug!("Install directory is writable: {}", install_dir.display());
                return Ok(GateOutcome::Writable);
            }
            Err(e) => e,
        };

        if self.elevation.is_elevated() {
            return Err(UpdateError::PermissionDenied {
                path: install_dir.display().to_string(),
                reason: probe_error.to_string(),
            }
            .into());
        }

        warn!(
            "Cannot write to {} ({}), relaunching with elevated rights",
            install_dir.display(),
            probe_error
        );

        let exe = std::env::current_exe().context("Failed to locate the running executable")?;
        self.elevation.relaunch_elevated(&exe, relaunch_args).map_err(|e| {
            UpdateError::ElevationFailed {
                reason: format!("{e:#}"),
            }
        })?;

        info!("Elevated updater started, handing over");
        Ok(GateOutcome::RelaunchedElevated)
    }
}

/// Quote one argument for a Windows command line.
///
/// The result always survives `CommandLineToArgvW` unchanged: the argument is
/// wrapped in double quotes, embedded quotes are escaped, and backslashes that
/// precede a quote (including the closing one) are doubled.
///
/// ```rust
/// use inplace_updater::privilege::quote_argument;
///
/// assert_eq!(quote_argument(r"C:\Program Files\App"), r#""C:\Program Files\App""#);
/// assert_eq!(quote_argument(r#"say "hi""#), r#""say \"hi\"""#);
/// ```
#[must_use]
pub fn quote_argument(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');

    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat_n('\\', backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(std::iter::repeat_n('\\', backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }

    quoted.extend(std::iter::repeat_n('\\', backslashes * 2));
    quoted.push('"');
    quoted
}

/// Join arguments into one parameter string, each individually quoted.
#[must_use]
pub fn build_parameters(args: &[OsString]) -> String {
    args.iter().map(|a| quote_argument(&a.to_string_lossy())).collect::<Vec<_>>().join(" ")
}

#[cfg(windows)]
mod platform {
    use anyhow::{Result, anyhow};
    use std::ffi::{OsStr, OsString};
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    use super::build_parameters;

    fn to_wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    pub fn is_elevated() -> bool {
        use windows::Win32::Foundation::{CloseHandle, HANDLE};
        use windows::Win32::Security::{
            GetTokenInformation, TOKEN_ELEVATION, TOKEN_QUERY, TokenElevation,
        };
        use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

        unsafe {
            let mut token = HANDLE::default();
            if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token).is_err() {
                return false;
            }

            let mut elevation = TOKEN_ELEVATION::default();
            let mut return_length = 0u32;
            let result = GetTokenInformation(
                token,
                TokenElevation,
                Some(&mut elevation as *mut _ as *mut _),
                std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                &mut return_length,
            );

            let _ = CloseHandle(token);
            result.is_ok() && elevation.TokenIsElevated != 0
        }
    }

    pub fn relaunch_elevated(exe: &Path, args: &[OsString]) -> Result<()> {
        use windows::Win32::UI::Shell::ShellExecuteW;
        use windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;
        use windows::core::PCWSTR;

        let op = to_wide(OsStr::new("runas"));
        let file = to_wide(exe.as_os_str());
        let params = to_wide(OsStr::new(&build_parameters(args)));
        let cwd = std::env::current_dir().unwrap_or_else(|_| {
            exe.parent().map(Path::to_path_buf).unwrap_or_default()
        });
        let dir = to_wide(cwd.as_os_str());

        let result = unsafe {
            ShellExecuteW(
                None,
                PCWSTR(op.as_ptr()),
                PCWSTR(file.as_ptr()),
                PCWSTR(params.as_ptr()),
                PCWSTR(dir.as_ptr()),
                SW_SHOWNORMAL,
            )
        };
        // Values up to 32 are error codes; 5 means the user declined the prompt
        let code = result.0 as isize;
        if code <= 32 {
            return Err(anyhow!("ShellExecuteW failed with code {code}"));
        }
        Ok(())
    }
}

#[cfg(unix)]
mod platform {
    use anyhow::{Context, Result, anyhow};
    use std::ffi::OsString;
    use std::path::Path;
    use std::process::{Command, Stdio};
    use tracing::debug;

    pub fn is_elevated() -> bool {
        nix::unistd::geteuid().is_root()
    }

    pub fn relaunch_elevated(exe: &Path, args: &[OsString]) -> Result<()> {
        let tool = ["pkexec", "sudo"]
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| anyhow!("neither pkexec nor sudo is available"))?;

        debug!("Relaunching through {}", tool.display());
        Command::new(&tool)
            .arg(exe)
            .args(args)
            .stdin(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to start {}", tool.display()))?;
        Ok(())
    }
}
