//! Process helpers shared across the workspace.
//!
//! Commands are created without a console window on Windows, and the
//! [`run_captured`] / [`run_checked`] helpers spawn an external tool, collect
//! its stdout and stderr while it runs, and map every failure mode onto a
//! typed [`ProcessError`].

#[cfg(feature = "tokio")]
mod capture;

#[cfg(feature = "tokio")]
pub use capture::{
    CapturedOutput, DEFAULT_STDERR_CAPTURE, ProcessError, run_captured, run_checked,
    truncate_output,
};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
    }
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<std::ffi::OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}
