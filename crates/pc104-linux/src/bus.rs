//! Bus driver over the FPGA ISA bridge's sysfs device files.
//!
//! Each port is one file; a transfer is an absolute seek to the bus address
//! followed by a single `read(2)`/`write(2)` of the port width. Files are
//! used through `&File`, so one [`SysfsBus`] can serve direct callers and
//! the fault handler without locking. Two threads interleaving transfers on
//! the same port race on the shared file offset.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use pc104_core::{
    validate_transfer_len, BridgeConfig, BusAccess, BusError, BusPort, BusSpace, PortWidth,
};
use tracing::{debug, info};

use crate::SetupError;

/// The six open port descriptors.
#[derive(Debug)]
pub struct SysfsBus {
    ports: [File; BusPort::COUNT],
    device_dir: PathBuf,
}

impl SysfsBus {
    /// Opens every port under `config.device_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::OpenDevice`] for the first port that cannot be
    /// opened read/write.
    pub fn open(config: &BridgeConfig) -> Result<Self, SetupError> {
        Self::open_dir(&config.device_dir)
    }

    /// Opens every port under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::OpenDevice`] for the first port that cannot be
    /// opened read/write.
    pub fn open_dir(dir: &Path) -> Result<Self, SetupError> {
        let [io8, io16, ioalt16, mem8, mem16, memalt16] =
            BusPort::ALL.map(|port| open_port(dir, port));
        let ports = [io8?, io16?, ioalt16?, mem8?, mem16?, memalt16?];
        info!(device_dir = %dir.display(), "opened PC/104 bus ports");
        Ok(Self {
            ports,
            device_dir: dir.to_path_buf(),
        })
    }

    /// Directory the ports were opened from.
    #[must_use]
    pub fn device_dir(&self) -> &Path {
        &self.device_dir
    }

    const fn file(&self, port: BusPort) -> &File {
        &self.ports[port.index()]
    }

    /// Reads one value from the `(space, width)` port.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::read`].
    pub fn read(&self, space: BusSpace, width: PortWidth, address: u32) -> Result<u16, BusError> {
        let mut bus = self;
        BusAccess::read(&mut bus, space, width, address)
    }

    /// Writes one value to the `(space, width)` port.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::write`].
    pub fn write(
        &self,
        space: BusSpace,
        width: PortWidth,
        address: u32,
        value: u16,
    ) -> Result<(), BusError> {
        let mut bus = self;
        BusAccess::write(&mut bus, space, width, address, value)
    }

    /// 8-bit I/O read.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::read`].
    pub fn io_8_read(&self, address: u32) -> Result<u8, BusError> {
        let mut bus = self;
        bus.read8(BusSpace::Io, address)
    }

    /// 16-bit I/O read.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::read`].
    pub fn io_16_read(&self, address: u32) -> Result<u16, BusError> {
        self.read(BusSpace::Io, PortWidth::Bits16, address)
    }

    /// 16-bit I/O read on the alternate pinout.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::read`].
    pub fn io_16_alt_read(&self, address: u32) -> Result<u16, BusError> {
        self.read(BusSpace::Io, PortWidth::Bits16Alt, address)
    }

    /// 8-bit memory read.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::read`].
    pub fn mem_8_read(&self, address: u32) -> Result<u8, BusError> {
        let mut bus = self;
        bus.read8(BusSpace::Memory, address)
    }

    /// 16-bit memory read.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::read`].
    pub fn mem_16_read(&self, address: u32) -> Result<u16, BusError> {
        self.read(BusSpace::Memory, PortWidth::Bits16, address)
    }

    /// 16-bit memory read on the alternate pinout.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::read`].
    pub fn mem_16_alt_read(&self, address: u32) -> Result<u16, BusError> {
        self.read(BusSpace::Memory, PortWidth::Bits16Alt, address)
    }

    /// 8-bit I/O write.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::write`].
    pub fn io_8_write(&self, address: u32, value: u8) -> Result<(), BusError> {
        let mut bus = self;
        bus.write8(BusSpace::Io, address, value)
    }

    /// 16-bit I/O write.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::write`].
    pub fn io_16_write(&self, address: u32, value: u16) -> Result<(), BusError> {
        self.write(BusSpace::Io, PortWidth::Bits16, address, value)
    }

    /// 16-bit I/O write on the alternate pinout.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::write`].
    pub fn io_16_alt_write(&self, address: u32, value: u16) -> Result<(), BusError> {
        self.write(BusSpace::Io, PortWidth::Bits16Alt, address, value)
    }

    /// 8-bit memory write.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::write`].
    pub fn mem_8_write(&self, address: u32, value: u8) -> Result<(), BusError> {
        let mut bus = self;
        bus.write8(BusSpace::Memory, address, value)
    }

    /// 16-bit memory write.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::write`].
    pub fn mem_16_write(&self, address: u32, value: u16) -> Result<(), BusError> {
        self.write(BusSpace::Memory, PortWidth::Bits16, address, value)
    }

    /// 16-bit memory write on the alternate pinout.
    ///
    /// # Errors
    ///
    /// See [`BusAccess::write`].
    pub fn mem_16_alt_write(&self, address: u32, value: u16) -> Result<(), BusError> {
        self.write(BusSpace::Memory, PortWidth::Bits16Alt, address, value)
    }
}

impl BusAccess for &SysfsBus {
    fn read_port(&mut self, port: BusPort, address: u32, buf: &mut [u8]) -> Result<(), BusError> {
        let mut file = self.file(port);
        seek(&mut file, port, address)?;
        let actual = file.read(buf).map_err(|error| BusError::Transfer {
            port,
            address,
            kind: error.kind(),
        })?;
        validate_transfer_len(port, address, buf.len(), actual)
    }

    fn write_port(&mut self, port: BusPort, address: u32, bytes: &[u8]) -> Result<(), BusError> {
        let mut file = self.file(port);
        seek(&mut file, port, address)?;
        let actual = file.write(bytes).map_err(|error| BusError::Transfer {
            port,
            address,
            kind: error.kind(),
        })?;
        validate_transfer_len(port, address, bytes.len(), actual)
    }
}

fn seek(file: &mut &File, port: BusPort, address: u32) -> Result<(), BusError> {
    file.seek(SeekFrom::Start(u64::from(address)))
        .map(drop)
        .map_err(|error| BusError::Seek {
            port,
            address,
            kind: error.kind(),
        })
}

fn open_port(dir: &Path, port: BusPort) -> Result<File, SetupError> {
    let path = dir.join(port.device_name());
    debug!(path = %path.display(), %port, "opening bus port");
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_SYNC)
        .open(&path)
        .map_err(|source| SetupError::OpenDevice { path, source })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use pc104_core::{BusAccess, BusError, BusPort, BusSpace, PortWidth};
    use rstest::rstest;
    use tempfile::TempDir;

    use super::SysfsBus;
    use crate::SetupError;

    const PORT_BYTES: usize = 0x1000;

    fn device_dir() -> TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for port in BusPort::ALL {
            fs::write(dir.path().join(port.device_name()), vec![0u8; PORT_BYTES])
                .expect("create port file");
        }
        dir
    }

    fn port_bytes(dir: &Path, name: &str, offset: usize, len: usize) -> Vec<u8> {
        let bytes = fs::read(dir.join(name)).expect("read port file");
        bytes[offset..offset + len].to_vec()
    }

    #[test]
    fn byte_write_lands_at_the_bus_address_of_the_right_port() {
        let dir = device_dir();
        let bus = SysfsBus::open_dir(dir.path()).expect("open");

        bus.io_8_write(0x140, 0x7F).expect("write");

        assert_eq!(port_bytes(dir.path(), "io8", 0x140, 1), [0x7F]);
        assert_eq!(port_bytes(dir.path(), "mem8", 0x140, 1), [0x00]);
        assert_eq!(bus.io_8_read(0x140), Ok(0x7F));
    }

    #[rstest]
    #[case(BusSpace::Io, PortWidth::Bits16, "io16")]
    #[case(BusSpace::Io, PortWidth::Bits16Alt, "ioalt16")]
    #[case(BusSpace::Memory, PortWidth::Bits16, "mem16")]
    #[case(BusSpace::Memory, PortWidth::Bits16Alt, "memalt16")]
    fn halfword_writes_use_native_byte_order(
        #[case] space: BusSpace,
        #[case] width: PortWidth,
        #[case] file: &str,
    ) {
        let dir = device_dir();
        let bus = SysfsBus::open_dir(dir.path()).expect("open");

        bus.write(space, width, 0x20, 0xBEEF).expect("write");

        assert_eq!(
            port_bytes(dir.path(), file, 0x20, 2),
            0xBEEF_u16.to_ne_bytes()
        );
        assert_eq!(bus.read(space, width, 0x20), Ok(0xBEEF));
    }

    #[test]
    fn named_accessors_route_to_their_ports() {
        let dir = device_dir();
        let bus = SysfsBus::open_dir(dir.path()).expect("open");

        bus.io_16_write(0x10, 0x1111).expect("io16");
        bus.io_16_alt_write(0x10, 0x2222).expect("ioalt16");
        bus.mem_8_write(0x10, 0x33).expect("mem8");
        bus.mem_16_write(0x10, 0x4444).expect("mem16");
        bus.mem_16_alt_write(0x10, 0x5555).expect("memalt16");

        assert_eq!(bus.io_16_read(0x10), Ok(0x1111));
        assert_eq!(bus.io_16_alt_read(0x10), Ok(0x2222));
        assert_eq!(bus.mem_8_read(0x10), Ok(0x33));
        assert_eq!(bus.mem_16_read(0x10), Ok(0x4444));
        assert_eq!(bus.mem_16_alt_read(0x10), Ok(0x5555));
    }

    #[test]
    fn word_access_splits_into_two_halfwords() {
        let dir = device_dir();
        let bus = SysfsBus::open_dir(dir.path()).expect("open");
        let mut port = &bus;

        port.write32(BusSpace::Memory, 0x100, 0x1234_5678).expect("write32");

        assert_eq!(
            port_bytes(dir.path(), "mem16", 0x100, 2),
            0x5678_u16.to_ne_bytes()
        );
        assert_eq!(
            port_bytes(dir.path(), "mem16", 0x102, 2),
            0x1234_u16.to_ne_bytes()
        );
        assert_eq!(port.read32(BusSpace::Memory, 0x100), Ok(0x1234_5678));
    }

    #[test]
    fn reads_past_end_of_file_are_short_transfers() {
        let dir = device_dir();
        let bus = SysfsBus::open_dir(dir.path()).expect("open");
        let address = u32::try_from(PORT_BYTES).expect("fits");

        assert_eq!(
            bus.io_16_read(address),
            Err(BusError::ShortTransfer {
                port: BusPort::new(BusSpace::Io, PortWidth::Bits16),
                address,
                expected: 2,
                actual: 0,
            })
        );
    }

    #[test]
    fn odd_halfword_address_is_rejected_before_any_transfer() {
        let dir = device_dir();
        let bus = SysfsBus::open_dir(dir.path()).expect("open");

        assert!(matches!(
            bus.mem_16_write(0x11, 0xFFFF),
            Err(BusError::Unaligned { .. })
        ));
        assert_eq!(port_bytes(dir.path(), "mem16", 0x10, 4), [0; 4]);
    }

    #[test]
    fn missing_port_file_fails_open_with_its_path() {
        let dir = device_dir();
        fs::remove_file(dir.path().join("memalt16")).expect("remove");

        match SysfsBus::open_dir(dir.path()) {
            Err(SetupError::OpenDevice { path, .. }) => {
                assert_eq!(path, dir.path().join("memalt16"));
            }
            other => panic!("expected OpenDevice, got {other:?}"),
        }
    }

    #[test]
    fn device_dir_is_remembered() {
        let dir = device_dir();
        let bus = SysfsBus::open_dir(dir.path()).expect("open");
        assert_eq!(bus.device_dir(), dir.path());
    }
}
