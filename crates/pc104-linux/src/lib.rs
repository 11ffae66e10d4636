//! Linux side of the PC/104 bus bridge.
//!
//! [`init`] opens the FPGA ISA bridge's port files for direct access.
//! [`mmap_init`] additionally reserves an inaccessible window and installs a
//! `SIGSEGV` handler, so plain loads and stores into the window become bus
//! transfers. The trapped window needs 32-bit ARM Linux with code compiled
//! in A32 (`-marm`) mode; elsewhere it reports
//! [`SetupError::UnsupportedPlatform`] and the direct calls keep working.

/// Setup failures.
pub mod error;
pub use error::SetupError;

/// Port-file bus driver.
pub mod bus;
pub use bus::SysfsBus;

/// Inaccessible address-space reservation backing the window.
pub mod sentinel;
pub use sentinel::SentinelRegion;

/// Fault handler and termination policy.
pub mod trap;
#[cfg(all(target_arch = "arm", target_os = "linux"))]
pub use trap::ArmTrapFrame;
pub use trap::{ensure_supported, terminate};

/// Process-wide setup entry points.
pub mod bridge;
pub use bridge::{init, mapped, mmap_init, MappedBus};

#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tempfile as _;
