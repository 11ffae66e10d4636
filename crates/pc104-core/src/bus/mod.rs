//! PC/104 bus port model and the transport contract served by bus drivers.
//!
//! The kernel exposes the bus as six independent byte-addressable ports, one
//! per (space, width) pair. Drivers only implement the raw seek+transfer
//! primitives of [`BusAccess`]; typed 8/16/32-bit operations, alignment
//! policy and 32-bit composition are provided on top of them.

/// Alignment and transfer-length policy helpers.
pub mod access;
/// In-memory recording bus used by host-side tests and simulations.
pub mod memory;

pub use access::{
    validate_halfword_alignment, validate_port_value, validate_transfer_len, HALFWORD_BYTES,
    WORD_HIGH_HALF_OFFSET,
};
pub use memory::{MemoryBus, Transfer};

use std::fmt;
use std::io;

use thiserror::Error;

/// Address space selected on the PC/104 bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum BusSpace {
    /// ISA I/O space.
    Io,
    /// ISA memory space.
    Memory,
}

impl fmt::Display for BusSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => f.write_str("io"),
            Self::Memory => f.write_str("mem"),
        }
    }
}

/// Transfer width and pinout of a bus port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PortWidth {
    /// 8-bit transfers.
    Bits8,
    /// 16-bit transfers on the standard pinout.
    Bits16,
    /// 16-bit transfers on the alternate pinout.
    Bits16Alt,
}

impl PortWidth {
    /// Number of bytes moved by one transfer on this port.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Bits8 => 1,
            Self::Bits16 | Self::Bits16Alt => HALFWORD_BYTES,
        }
    }
}

/// One of the six (space, width) ports backed by its own device file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BusPort {
    /// Address space served by the port.
    pub space: BusSpace,
    /// Transfer width of the port.
    pub width: PortWidth,
}

impl BusPort {
    /// Number of distinct bus ports.
    pub const COUNT: usize = 6;

    /// All ports in device-table order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::new(BusSpace::Io, PortWidth::Bits8),
        Self::new(BusSpace::Io, PortWidth::Bits16),
        Self::new(BusSpace::Io, PortWidth::Bits16Alt),
        Self::new(BusSpace::Memory, PortWidth::Bits8),
        Self::new(BusSpace::Memory, PortWidth::Bits16),
        Self::new(BusSpace::Memory, PortWidth::Bits16Alt),
    ];

    /// Creates a port descriptor.
    #[must_use]
    pub const fn new(space: BusSpace, width: PortWidth) -> Self {
        Self { space, width }
    }

    /// Position of this port in [`BusPort::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        let base = match self.space {
            BusSpace::Io => 0,
            BusSpace::Memory => 3,
        };
        let lane = match self.width {
            PortWidth::Bits8 => 0,
            PortWidth::Bits16 => 1,
            PortWidth::Bits16Alt => 2,
        };
        base + lane
    }

    /// File name of the kernel device node serving this port.
    #[must_use]
    pub const fn device_name(self) -> &'static str {
        match (self.space, self.width) {
            (BusSpace::Io, PortWidth::Bits8) => "io8",
            (BusSpace::Io, PortWidth::Bits16) => "io16",
            (BusSpace::Io, PortWidth::Bits16Alt) => "ioalt16",
            (BusSpace::Memory, PortWidth::Bits8) => "mem8",
            (BusSpace::Memory, PortWidth::Bits16) => "mem16",
            (BusSpace::Memory, PortWidth::Bits16Alt) => "memalt16",
        }
    }
}

impl fmt::Display for BusPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.device_name())
    }
}

/// Bus transfer failure. Every variant leaves device state undefined for
/// the trap path, which treats all of them as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    /// 16-bit port used with an odd address.
    #[error("{port} access at {address:#x} is not 16-bit aligned")]
    Unaligned {
        /// Port addressed.
        port: BusPort,
        /// Offending bus address.
        address: u32,
    },
    /// Address (or the high half of a 32-bit access) is not representable.
    #[error("address {address:#x} is out of range for the {space} space")]
    AddressOverflow {
        /// Space addressed.
        space: BusSpace,
        /// Offending bus address.
        address: u32,
    },
    /// Value does not fit the port width.
    #[error("value {value:#x} does not fit the {port} port")]
    ValueTooWide {
        /// Port addressed.
        port: BusPort,
        /// Rejected value.
        value: u16,
    },
    /// Absolute seek on the port descriptor failed.
    #[error("seek to {address:#x} on {port} failed: {kind}")]
    Seek {
        /// Port addressed.
        port: BusPort,
        /// Target bus address.
        address: u32,
        /// OS error category.
        kind: io::ErrorKind,
    },
    /// Read or write syscall on the port descriptor failed.
    #[error("transfer at {address:#x} on {port} failed: {kind}")]
    Transfer {
        /// Port addressed.
        port: BusPort,
        /// Target bus address.
        address: u32,
        /// OS error category.
        kind: io::ErrorKind,
    },
    /// Transfer moved fewer bytes than the port width.
    #[error("short transfer at {address:#x} on {port}: {actual} of {expected} bytes")]
    ShortTransfer {
        /// Port addressed.
        port: BusPort,
        /// Target bus address.
        address: u32,
        /// Bytes requested.
        expected: usize,
        /// Bytes actually moved.
        actual: usize,
    },
}

/// Seek+transfer contract for a PC/104 bus driver.
///
/// Implementors provide the two raw primitives. Each call must perform one
/// absolute seek to `address` followed by one transfer of exactly
/// `buf.len()` bytes, reporting short transfers as
/// [`BusError::ShortTransfer`]. Nothing is retried.
pub trait BusAccess {
    /// Reads `buf.len()` bytes from `port` at `address`.
    ///
    /// # Errors
    ///
    /// Returns a [`BusError`] when the seek or the transfer does not fully
    /// succeed.
    fn read_port(&mut self, port: BusPort, address: u32, buf: &mut [u8]) -> Result<(), BusError>;

    /// Writes `bytes` to `port` at `address`.
    ///
    /// # Errors
    ///
    /// Returns a [`BusError`] when the seek or the transfer does not fully
    /// succeed.
    fn write_port(&mut self, port: BusPort, address: u32, bytes: &[u8]) -> Result<(), BusError>;

    /// Reads one value from the `(space, width)` port.
    ///
    /// 8-bit values are zero-extended.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unaligned`] for odd 16-bit addresses, otherwise
    /// any transport error.
    fn read(&mut self, space: BusSpace, width: PortWidth, address: u32) -> Result<u16, BusError> {
        let port = BusPort::new(space, width);
        validate_halfword_alignment(port, address)?;
        let mut buf = [0u8; HALFWORD_BYTES];
        self.read_port(port, address, &mut buf[..width.bytes()])?;
        Ok(match width {
            PortWidth::Bits8 => u16::from(buf[0]),
            PortWidth::Bits16 | PortWidth::Bits16Alt => u16::from_ne_bytes(buf),
        })
    }

    /// Writes one value to the `(space, width)` port.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ValueTooWide`] when an 8-bit port receives a
    /// value above `0xFF`, [`BusError::Unaligned`] for odd 16-bit addresses,
    /// otherwise any transport error.
    fn write(
        &mut self,
        space: BusSpace,
        width: PortWidth,
        address: u32,
        value: u16,
    ) -> Result<(), BusError> {
        let port = BusPort::new(space, width);
        validate_port_value(port, value)?;
        validate_halfword_alignment(port, address)?;
        let buf = match width {
            PortWidth::Bits8 => value.to_le_bytes(),
            PortWidth::Bits16 | PortWidth::Bits16Alt => value.to_ne_bytes(),
        };
        self.write_port(port, address, &buf[..width.bytes()])
    }

    /// 8-bit read.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::read`].
    fn read8(&mut self, space: BusSpace, address: u32) -> Result<u8, BusError> {
        let mut byte = [0u8; 1];
        self.read_port(BusPort::new(space, PortWidth::Bits8), address, &mut byte)?;
        Ok(byte[0])
    }

    /// 16-bit read on the standard pinout.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::read`].
    fn read16(&mut self, space: BusSpace, address: u32) -> Result<u16, BusError> {
        self.read(space, PortWidth::Bits16, address)
    }

    /// 16-bit read on the alternate pinout.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::read`].
    fn read16_alt(&mut self, space: BusSpace, address: u32) -> Result<u16, BusError> {
        self.read(space, PortWidth::Bits16Alt, address)
    }

    /// 32-bit read composed of two 16-bit reads, low half first.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AddressOverflow`] when `address + 2` overflows;
    /// otherwise see [`BusAccess::read`]. A failed low half skips the high
    /// half.
    fn read32(&mut self, space: BusSpace, address: u32) -> Result<u32, BusError> {
        let high_address = address
            .checked_add(WORD_HIGH_HALF_OFFSET)
            .ok_or(BusError::AddressOverflow { space, address })?;
        let low = self.read16(space, address)?;
        let high = self.read16(space, high_address)?;
        Ok(u32::from(low) | (u32::from(high) << 16))
    }

    /// 8-bit write.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::write`].
    fn write8(&mut self, space: BusSpace, address: u32, value: u8) -> Result<(), BusError> {
        self.write_port(BusPort::new(space, PortWidth::Bits8), address, &[value])
    }

    /// 16-bit write on the standard pinout.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::write`].
    fn write16(&mut self, space: BusSpace, address: u32, value: u16) -> Result<(), BusError> {
        self.write(space, PortWidth::Bits16, address, value)
    }

    /// 16-bit write on the alternate pinout.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::write`].
    fn write16_alt(&mut self, space: BusSpace, address: u32, value: u16) -> Result<(), BusError> {
        self.write(space, PortWidth::Bits16Alt, address, value)
    }

    /// 32-bit write composed of two 16-bit writes, low half first.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AddressOverflow`] when `address + 2` overflows;
    /// otherwise see [`BusAccess::write`]. A failed low half skips the high
    /// half.
    fn write32(&mut self, space: BusSpace, address: u32, value: u32) -> Result<(), BusError> {
        let high_address = address
            .checked_add(WORD_HIGH_HALF_OFFSET)
            .ok_or(BusError::AddressOverflow { space, address })?;
        let [b0, b1, b2, b3] = value.to_le_bytes();
        self.write16(space, address, u16::from_le_bytes([b0, b1]))?;
        self.write16(space, high_address, u16::from_le_bytes([b2, b3]))
    }
}

#[cfg(test)]
mod tests {
    use super::{BusAccess, BusError, BusPort, BusSpace, MemoryBus, PortWidth};

    #[test]
    fn port_table_matches_kernel_device_names() {
        let names: Vec<_> = BusPort::ALL.iter().map(|port| port.device_name()).collect();
        assert_eq!(
            names,
            ["io8", "io16", "ioalt16", "mem8", "mem16", "memalt16"]
        );
    }

    #[test]
    fn port_index_matches_table_position() {
        for (position, port) in BusPort::ALL.iter().enumerate() {
            assert_eq!(port.index(), position);
        }
    }

    #[test]
    fn word_read_combines_low_then_high_half() {
        let mut bus = MemoryBus::new();
        bus.write16(BusSpace::Memory, 0x20, 0x5678).expect("low half");
        bus.write16(BusSpace::Memory, 0x22, 0x1234).expect("high half");
        bus.clear_transfers();

        assert_eq!(bus.read32(BusSpace::Memory, 0x20), Ok(0x1234_5678));

        let addresses: Vec<_> = bus.transfers().iter().map(|t| t.address).collect();
        assert_eq!(addresses, [0x20, 0x22]);
    }

    #[test]
    fn word_write_issues_low_half_first() {
        let mut bus = MemoryBus::new();
        bus.write32(BusSpace::Io, 0x100, 0xDEAD_BEEF)
            .expect("word write");

        let halves: Vec<_> = bus
            .transfers()
            .iter()
            .map(|t| (t.address, t.value))
            .collect();
        assert_eq!(halves, [(0x100, 0xBEEF), (0x102, 0xDEAD)]);
    }

    #[test]
    fn word_access_near_top_of_address_range_overflows() {
        let mut bus = MemoryBus::new();
        assert_eq!(
            bus.read32(BusSpace::Io, u32::MAX - 1),
            Err(BusError::AddressOverflow {
                space: BusSpace::Io,
                address: u32::MAX - 1,
            })
        );
        assert!(bus.transfers().is_empty());
    }

    #[test]
    fn byte_port_rejects_wide_values_before_transfer() {
        let mut bus = MemoryBus::new();
        let result = bus.write(BusSpace::Io, PortWidth::Bits8, 0x10, 0x1FF);
        assert_eq!(
            result,
            Err(BusError::ValueTooWide {
                port: BusPort::new(BusSpace::Io, PortWidth::Bits8),
                value: 0x1FF,
            })
        );
        assert!(bus.transfers().is_empty());
    }

    #[test]
    fn byte_port_moves_one_byte_at_any_address() {
        let mut bus = MemoryBus::new();
        bus.write(BusSpace::Memory, PortWidth::Bits8, 0x11, 0xA5)
            .expect("odd byte address");
        assert_eq!(bus.read(BusSpace::Memory, PortWidth::Bits8, 0x11), Ok(0xA5));
        assert_eq!(bus.read(BusSpace::Memory, PortWidth::Bits8, 0x12), Ok(0));
        assert_eq!(PortWidth::Bits8.bytes(), 1);
        assert_eq!(PortWidth::Bits16Alt.bytes(), 2);
    }

    #[test]
    fn alternate_pinout_is_a_separate_port() {
        let mut bus = MemoryBus::new();
        bus.write16_alt(BusSpace::Io, 0x40, 0xAAAA).expect("alt write");
        assert_eq!(bus.read16(BusSpace::Io, 0x40), Ok(0));
        assert_eq!(bus.read16_alt(BusSpace::Io, 0x40), Ok(0xAAAA));
    }
}
