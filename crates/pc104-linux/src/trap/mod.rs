//! `SIGSEGV` handler that turns window faults into bus transfers.
//!
//! The handler only reads the process-wide bridge state, never allocates,
//! never logs and writes diagnostics with a raw `write(2)`.

#[cfg(all(target_arch = "arm", target_os = "linux"))]
mod arm;
#[cfg(all(target_arch = "arm", target_os = "linux"))]
pub use arm::ArmTrapFrame;

use pc104_core::{Termination, TrapError};

use crate::SetupError;

/// Checks that this target has an A32 trap-frame implementation.
///
/// # Errors
///
/// Returns [`SetupError::UnsupportedPlatform`] everywhere except 32-bit ARM
/// Linux.
pub const fn ensure_supported() -> Result<(), SetupError> {
    if cfg!(all(target_arch = "arm", target_os = "linux")) {
        Ok(())
    } else {
        Err(SetupError::UnsupportedPlatform {
            arch: std::env::consts::ARCH,
        })
    }
}

/// Registers the fault handler for `SIGSEGV`.
///
/// # Errors
///
/// Returns [`SetupError::InstallHandler`] when `sigaction(2)` fails, or
/// [`SetupError::UnsupportedPlatform`] off 32-bit ARM Linux.
#[cfg(all(target_arch = "arm", target_os = "linux"))]
pub(crate) fn install() -> Result<(), SetupError> {
    arm::install()
}

#[cfg(not(all(target_arch = "arm", target_os = "linux")))]
pub(crate) const fn install() -> Result<(), SetupError> {
    ensure_supported()
}

/// Ends the process according to the fault policy of `error`.
///
/// The diagnostic, if any, goes straight to file descriptor 2 so this is
/// callable from the signal handler.
pub fn terminate(error: &TrapError) -> ! {
    if let Some(message) = error.diagnostic() {
        write_stderr(message);
    }
    match error.termination() {
        Termination::Abort => std::process::abort(),
        // SAFETY: `_exit` skips atexit handlers and stdio flushing, both of
        // which are unsafe to run from a signal handler.
        Termination::Exit => unsafe { libc::_exit(1) },
    }
}

fn write_stderr(message: &str) {
    // SAFETY: the buffer is valid for `message.len()` bytes; a partial or
    // failed write only loses the diagnostic.
    unsafe {
        libc::write(libc::STDERR_FILENO, message.as_ptr().cast(), message.len());
    }
}
