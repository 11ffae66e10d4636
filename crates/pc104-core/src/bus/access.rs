//! Deterministic alignment and transfer-length policy for bus ports.

use crate::{BusError, BusPort, PortWidth};

/// Byte width of one 16-bit bus transfer.
pub const HALFWORD_BYTES: usize = 2;

/// Offset of the high half of a composed 32-bit access.
pub const WORD_HIGH_HALF_OFFSET: u32 = 2;

/// Validates that a 16-bit port is addressed on an even byte.
///
/// 8-bit ports accept any address.
///
/// # Errors
///
/// Returns [`BusError::Unaligned`] when a 16-bit port is used with an odd
/// address.
pub const fn validate_halfword_alignment(port: BusPort, address: u32) -> Result<(), BusError> {
    match port.width {
        PortWidth::Bits8 => Ok(()),
        PortWidth::Bits16 | PortWidth::Bits16Alt => {
            if address & 1 == 0 {
                Ok(())
            } else {
                Err(BusError::Unaligned { port, address })
            }
        }
    }
}

/// Validates that `value` fits the port width.
///
/// # Errors
///
/// Returns [`BusError::ValueTooWide`] when an 8-bit port receives a value
/// above `0xFF`.
pub const fn validate_port_value(port: BusPort, value: u16) -> Result<(), BusError> {
    match port.width {
        PortWidth::Bits8 if value > 0xFF => Err(BusError::ValueTooWide { port, value }),
        _ => Ok(()),
    }
}

/// Validates that a transfer moved exactly the requested number of bytes.
///
/// # Errors
///
/// Returns [`BusError::ShortTransfer`] when `actual != expected`.
pub const fn validate_transfer_len(
    port: BusPort,
    address: u32,
    expected: usize,
    actual: usize,
) -> Result<(), BusError> {
    if actual == expected {
        Ok(())
    } else {
        Err(BusError::ShortTransfer {
            port,
            address,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::{
        validate_halfword_alignment, validate_port_value, validate_transfer_len, BusError,
        BusPort, BusSpace, PortWidth,
    };

    #[rstest]
    #[case(PortWidth::Bits16)]
    #[case(PortWidth::Bits16Alt)]
    fn halfword_ports_reject_odd_addresses(#[case] width: PortWidth) {
        let port = BusPort::new(BusSpace::Memory, width);
        assert_eq!(validate_halfword_alignment(port, 0x0000), Ok(()));
        assert_eq!(validate_halfword_alignment(port, 0x0142), Ok(()));
        assert_eq!(
            validate_halfword_alignment(port, 0x0143),
            Err(BusError::Unaligned {
                port,
                address: 0x0143
            })
        );
    }

    #[test]
    fn byte_ports_accept_any_address() {
        let port = BusPort::new(BusSpace::Io, PortWidth::Bits8);
        for address in 0_u32..=0x0F {
            assert_eq!(validate_halfword_alignment(port, address), Ok(()));
        }
    }

    #[test]
    fn byte_port_value_limit_is_0xff() {
        let port = BusPort::new(BusSpace::Io, PortWidth::Bits8);
        assert_eq!(validate_port_value(port, 0xFF), Ok(()));
        assert!(validate_port_value(port, 0x100).is_err());

        let wide = BusPort::new(BusSpace::Io, PortWidth::Bits16);
        assert_eq!(validate_port_value(wide, u16::MAX), Ok(()));
    }

    #[test]
    fn short_transfers_are_reported_with_counts() {
        let port = BusPort::new(BusSpace::Io, PortWidth::Bits16);
        assert_eq!(validate_transfer_len(port, 0x10, 2, 2), Ok(()));
        assert_eq!(
            validate_transfer_len(port, 0x10, 2, 1),
            Err(BusError::ShortTransfer {
                port,
                address: 0x10,
                expected: 2,
                actual: 1,
            })
        );
    }
}
