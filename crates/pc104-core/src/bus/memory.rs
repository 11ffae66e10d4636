//! In-memory bus backing that records every transfer in issue order.

use std::collections::HashMap;

use crate::{validate_transfer_len, BusAccess, BusError, BusPort, Direction};

/// One transfer observed by a [`MemoryBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transfer {
    /// Load for reads, store for writes.
    pub direction: Direction,
    /// Port used.
    pub port: BusPort,
    /// Bus address the port was seeked to.
    pub address: u32,
    /// Value moved, zero-extended for 8-bit ports.
    pub value: u16,
}

/// Byte-addressable bus model with one independent backing per port.
///
/// Unwritten locations read as zero. A failure can be injected for a port
/// to exercise the fatal transfer paths.
#[derive(Debug, Default, Clone)]
pub struct MemoryBus {
    cells: HashMap<(BusPort, u32), u8>,
    transfers: Vec<Transfer>,
    failing_ports: u8,
}

impl MemoryBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later transfer on `port` fail as a zero-length transfer.
    pub const fn fail_port(&mut self, port: BusPort) {
        self.failing_ports |= 1 << port.index();
    }

    /// Transfers issued so far, oldest first.
    #[must_use]
    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    /// Forgets recorded transfers while keeping the stored values.
    pub fn clear_transfers(&mut self) {
        self.transfers.clear();
    }

    fn check_failure(&self, port: BusPort, address: u32, len: usize) -> Result<(), BusError> {
        if self.failing_ports & (1 << port.index()) != 0 {
            validate_transfer_len(port, address, len, 0)
        } else {
            Ok(())
        }
    }

    fn record(&mut self, direction: Direction, port: BusPort, address: u32, bytes: &[u8]) {
        let value = match *bytes {
            [byte] => u16::from(byte),
            [low, high] => u16::from_ne_bytes([low, high]),
            _ => 0,
        };
        self.transfers.push(Transfer {
            direction,
            port,
            address,
            value,
        });
    }
}

impl BusAccess for MemoryBus {
    fn read_port(&mut self, port: BusPort, address: u32, buf: &mut [u8]) -> Result<(), BusError> {
        self.check_failure(port, address, buf.len())?;
        for (offset, byte) in (0_u32..).zip(buf.iter_mut()) {
            let cell = address.wrapping_add(offset);
            *byte = self.cells.get(&(port, cell)).copied().unwrap_or(0);
        }
        self.record(Direction::Load, port, address, buf);
        Ok(())
    }

    fn write_port(&mut self, port: BusPort, address: u32, bytes: &[u8]) -> Result<(), BusError> {
        self.check_failure(port, address, bytes.len())?;
        for (offset, byte) in (0_u32..).zip(bytes.iter()) {
            self.cells.insert((port, address.wrapping_add(offset)), *byte);
        }
        self.record(Direction::Store, port, address, bytes);
        Ok(())
    }
}
