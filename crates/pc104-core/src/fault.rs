//! Trap failure taxonomy, stderr diagnostics and termination policy.

use thiserror::Error;

use crate::{AccessWidth, BusError, BusSpace, EncodingMode};

/// Fault classes used for termination policy and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Fault address outside the bus window.
    Range,
    /// Instruction could not be decoded in the expected encoding mode.
    Decode,
    /// Access width and bus address disagree on alignment.
    Alignment,
    /// Bus transfer failed.
    Bus,
}

/// How the trap handler ends the process after an unrecoverable fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// Raise `SIGABRT` so the failing state is preserved in a core dump.
    Abort,
    /// Exit with status 1 after printing the diagnostic.
    Exit,
}

/// Reasons the trap path refuses to emulate a faulting access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrapError {
    /// Fault unrelated to the bus window.
    #[error("fault at {address:#x} is outside the bus window")]
    OutsideWindow {
        /// Faulting data address.
        address: usize,
    },
    /// Faulting code was not executing A32 instructions.
    #[error("trapped access was executed in {mode} mode")]
    UnsupportedMode {
        /// Instruction set in use.
        mode: EncodingMode,
    },
    /// Instruction is not one of the emulated load/store forms.
    #[error("instruction {word:#010x} is not an emulated load/store")]
    UnsupportedEncoding {
        /// Raw instruction word.
        word: u32,
    },
    /// Load/store whose register side effects cannot be replayed, such as
    /// `pc` as the transfer register.
    #[error("instruction {word:#010x} is a load/store the trap path cannot replay")]
    UnreplayableTransfer {
        /// Raw instruction word.
        word: u32,
    },
    /// 16/32-bit access at an odd bus address.
    #[error("{width} access at {address:#x} in {space} space is misaligned")]
    Misaligned {
        /// Access width.
        width: AccessWidth,
        /// Target space.
        space: BusSpace,
        /// Local bus address.
        address: u32,
    },
    /// Bus transfer failed mid-emulation.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl TrapError {
    /// Diagnostics class of this error.
    #[must_use]
    pub const fn class(&self) -> FaultClass {
        match self {
            Self::OutsideWindow { .. } => FaultClass::Range,
            Self::UnsupportedMode { .. }
            | Self::UnsupportedEncoding { .. }
            | Self::UnreplayableTransfer { .. } => FaultClass::Decode,
            Self::Misaligned { .. } => FaultClass::Alignment,
            Self::Bus(_) => FaultClass::Bus,
        }
    }

    /// Static message written to stderr before termination.
    ///
    /// Out-of-window faults carry no message: they are defects elsewhere in
    /// the program, not bridge conditions.
    #[must_use]
    pub const fn diagnostic(&self) -> Option<&'static str> {
        if let Self::UnreplayableTransfer { .. } = self {
            return Some(
                "pc104: trapped bus access uses pc or writes back a register it cannot \
                 replay; use a plain base register for bus window accesses\n",
            );
        }
        match self.class() {
            FaultClass::Range => None,
            FaultClass::Decode => Some(
                "pc104: trapped bus access is not an A32 ldr/ldrb/ldrh/str/strb/strh; \
                 code touching the bus window must be compiled with -marm\n",
            ),
            FaultClass::Alignment => {
                Some("pc104: 16/32-bit bus window access must use an even address\n")
            }
            FaultClass::Bus => {
                Some("pc104: bus transfer failed; device register state is undefined\n")
            }
        }
    }

    /// Termination action for this error.
    #[must_use]
    pub const fn termination(&self) -> Termination {
        match self.class() {
            FaultClass::Range | FaultClass::Bus => Termination::Abort,
            FaultClass::Decode | FaultClass::Alignment => Termination::Exit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FaultClass, Termination, TrapError};
    use crate::{AccessWidth, BusError, BusPort, BusSpace, EncodingMode, PortWidth};

    #[test]
    fn out_of_window_faults_abort_silently() {
        let error = TrapError::OutsideWindow { address: 0x10 };
        assert_eq!(error.class(), FaultClass::Range);
        assert_eq!(error.diagnostic(), None);
        assert_eq!(error.termination(), Termination::Abort);
    }

    #[test]
    fn decode_failures_name_the_required_compilation_mode() {
        for error in [
            TrapError::UnsupportedMode {
                mode: EncodingMode::Thumb,
            },
            TrapError::UnsupportedEncoding { word: 0xE280_0001 },
        ] {
            assert_eq!(error.class(), FaultClass::Decode);
            let message = error.diagnostic().expect("decode failures explain themselves");
            assert!(message.contains("-marm"));
            assert!(message.ends_with('\n'));
            assert_eq!(error.termination(), Termination::Exit);
        }
    }

    #[test]
    fn unreplayable_transfers_do_not_blame_the_compilation_mode() {
        let error = TrapError::UnreplayableTransfer { word: 0xE59F_F000 };
        assert_eq!(error.class(), FaultClass::Decode);
        let message = error.diagnostic().expect("explains itself");
        assert!(!message.contains("-marm"));
        assert!(message.ends_with('\n'));
        assert_eq!(error.termination(), Termination::Exit);
    }

    #[test]
    fn bus_failures_abort_with_a_diagnostic() {
        let error = TrapError::from(BusError::ShortTransfer {
            port: BusPort::new(BusSpace::Io, PortWidth::Bits16),
            address: 0x40,
            expected: 2,
            actual: 1,
        });
        assert_eq!(error.class(), FaultClass::Bus);
        assert!(error.diagnostic().is_some());
        assert_eq!(error.termination(), Termination::Abort);
        assert_eq!(
            error.to_string(),
            "short transfer at 0x40 on io16: 1 of 2 bytes"
        );
    }

    #[test]
    fn misaligned_errors_render_width_and_space() {
        let error = TrapError::Misaligned {
            width: AccessWidth::Word,
            space: BusSpace::Memory,
            address: 0x101,
        };
        assert_eq!(
            error.to_string(),
            "32-bit access at 0x101 in mem space is misaligned"
        );
        assert_eq!(error.termination(), Termination::Exit);
    }
}
