//! Core of the PC/104 bus bridge: bus port model, window translation,
//! A32 load/store decoding and the trap emulation pipeline.
//!
//! Nothing in this crate touches the operating system. Linux device files,
//! address-space reservation and signal handling live in `pc104-linux`.

/// PC/104 bus ports, errors and the transport contract.
pub mod bus;
pub use bus::{
    validate_halfword_alignment, validate_port_value, validate_transfer_len, BusAccess, BusError,
    BusPort, BusSpace, MemoryBus, PortWidth, Transfer, HALFWORD_BYTES, WORD_HIGH_HALF_OFFSET,
};

/// Bus window geometry and address translation.
pub mod window;
pub use window::{
    window_size, BusTarget, BusWindow, WindowError, DEFAULT_SPLIT_POINT, DEFAULT_WINDOW_SIZE,
};

/// Captured register context of a faulting thread.
pub mod state;
pub use state::{
    CapturedContext, EncodingMode, RegisterContext, RegisterIndex, TrapFrame,
    ARM_INSTRUCTION_BYTES, CPSR_THUMB, GENERAL_REGISTER_COUNT,
};

/// A32 single-register load/store decoder.
pub mod decoder;
pub use decoder::{
    decode_word, is_unreplayable_transfer, AccessKind, AccessWidth, Addressing, DecodedAccess,
    Decoder, Direction, EncodingSet, Indexing, Offset, ShiftKind,
};

/// Trap failure taxonomy and termination policy.
pub mod fault;
pub use fault::{FaultClass, Termination, TrapError};

/// Trap emulation pipeline.
pub mod emulate;
pub use emulate::{emulate_access, validate_alignment, Emulated};

/// Bridge configuration.
pub mod config;
pub use config::{BridgeConfig, DEFAULT_DEVICE_DIR, DEVICE_DIR_ENV};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
