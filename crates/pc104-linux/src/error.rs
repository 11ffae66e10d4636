use std::io;
use std::path::PathBuf;

use pc104_core::WindowError;
use thiserror::Error;

/// Failures while bringing the bridge up.
///
/// These are returned to the caller; only faults taken after a successful
/// [`crate::mmap_init`] are handled by the process-terminating trap policy.
#[derive(Debug, Error)]
pub enum SetupError {
    /// A port device file could not be opened.
    #[error("cannot open bus device {}: {source}", path.display())]
    OpenDevice {
        /// Device file path.
        path: PathBuf,
        /// Underlying OS error.
        source: io::Error,
    },
    /// The inaccessible window reservation failed.
    #[error("cannot reserve a {size:#x}-byte bus window: {source}")]
    Reserve {
        /// Requested reservation size.
        size: usize,
        /// Underlying OS error.
        source: io::Error,
    },
    /// Registering the fault handler failed.
    #[error("cannot install the bus fault handler: {source}")]
    InstallHandler {
        /// Underlying OS error.
        source: io::Error,
    },
    /// No trap-frame implementation exists for this target.
    #[error("trapped bus window is not supported on {arch}")]
    UnsupportedPlatform {
        /// Target architecture name.
        arch: &'static str,
    },
    /// Window geometry is invalid.
    #[error(transparent)]
    Window(#[from] WindowError),
}
