//! Process-wide bridge setup: direct port access and the trapped window.

use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use pc104_core::{
    validate_halfword_alignment, AccessWidth, BridgeConfig, BusError, BusPort, BusSpace,
    BusTarget, BusWindow, Decoder, PortWidth,
};
use tracing::info;

use crate::{trap, SentinelRegion, SetupError, SysfsBus};

static BUS: OnceLock<SysfsBus> = OnceLock::new();
static MAPPED: OnceLock<MappedBus> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());
static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Opens the six bus ports for direct access.
///
/// The ports are opened once per process; later calls return the same
/// handle and ignore their configuration.
///
/// # Errors
///
/// Returns [`SetupError::OpenDevice`] when a port file cannot be opened.
pub fn init(config: &BridgeConfig) -> Result<&'static SysfsBus, SetupError> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    open_shared(config)
}

fn open_shared(config: &BridgeConfig) -> Result<&'static SysfsBus, SetupError> {
    if let Some(bus) = BUS.get() {
        return Ok(bus);
    }
    let bus = SysfsBus::open(config)?;
    Ok(BUS.get_or_init(|| bus))
}

/// Brings up the trapped bus window and returns it.
///
/// Performs [`init`], reserves the sentinel region and installs the fault
/// handler. Repeated calls return the first window; later configurations
/// are ignored.
///
/// # Errors
///
/// Returns [`SetupError::UnsupportedPlatform`] before doing anything on
/// targets without an A32 trap frame, otherwise the first setup step that
/// failed.
pub fn mmap_init(config: &BridgeConfig) -> Result<&'static MappedBus, SetupError> {
    trap::ensure_supported()?;
    let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    let mapped = if let Some(mapped) = MAPPED.get() {
        mapped
    } else {
        let created = MappedBus::create(config)?;
        MAPPED.get_or_init(|| created)
    };

    if !HANDLER_INSTALLED.load(Ordering::Acquire) {
        trap::install()?;
        HANDLER_INSTALLED.store(true, Ordering::Release);
        info!(
            base = mapped.window.base(),
            size = mapped.window.size(),
            split_point = mapped.window.split_point(),
            "PC/104 bus window armed"
        );
    }
    Ok(mapped)
}

/// Window armed by an earlier successful [`mmap_init`], if any.
#[must_use]
pub fn mapped() -> Option<&'static MappedBus> {
    MAPPED.get()
}

/// State shared between window users and the fault handler.
#[derive(Debug)]
pub struct MappedBus {
    bus: &'static SysfsBus,
    region: SentinelRegion,
    window: BusWindow,
    decoder: Decoder,
}

#[allow(clippy::cast_ptr_alignment)]
impl MappedBus {
    fn create(config: &BridgeConfig) -> Result<Self, SetupError> {
        let bus = open_shared(config)?;
        let size = config.window_size()?;
        let region = SentinelRegion::reserve(size)?;
        let window = BusWindow::new(region.base(), config.split_point)?;
        Ok(Self {
            bus,
            region,
            window,
            decoder: config.decoder(),
        })
    }

    /// Direct port access sharing the handler's descriptors.
    #[must_use]
    pub const fn bus(&self) -> &'static SysfsBus {
        self.bus
    }

    /// Window geometry.
    #[must_use]
    pub const fn window(&self) -> &BusWindow {
        &self.window
    }

    /// Decoder used by the fault handler.
    #[must_use]
    pub const fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// First address of the window; I/O space starts here and memory space
    /// starts `split_point` bytes later.
    #[must_use]
    pub const fn base(&self) -> *mut u8 {
        self.region.as_ptr()
    }

    fn pointer(
        &self,
        width: AccessWidth,
        space: BusSpace,
        address: u32,
    ) -> Result<*mut u8, BusError> {
        let offset = window_offset(&self.window, width, space, address)?;
        Ok(self.base().wrapping_add(offset))
    }

    /// 8-bit read through the window.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AddressOverflow`] when `address` lies beyond the
    /// space's half of the window.
    pub fn peek8(&self, space: BusSpace, address: u32) -> Result<u8, BusError> {
        let pointer = self.pointer(AccessWidth::Byte, space, address)?;
        // SAFETY: the pointer is inside the reserved window; the access traps
        // and the handler completes it.
        Ok(unsafe { ptr::read_volatile(pointer) })
    }

    /// 16-bit read through the window.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AddressOverflow`] outside the window and
    /// [`BusError::Unaligned`] for odd addresses.
    pub fn peek16(&self, space: BusSpace, address: u32) -> Result<u16, BusError> {
        let pointer = self.pointer(AccessWidth::Halfword, space, address)?;
        // SAFETY: in-window and even, so aligned for u16.
        Ok(unsafe { ptr::read_volatile(pointer.cast::<u16>()) })
    }

    /// 32-bit read through the window, low half first on the bus.
    ///
    /// Addresses that are even but not word aligned are read as two 16-bit
    /// accesses, which produces the same bus traffic.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AddressOverflow`] outside the window and
    /// [`BusError::Unaligned`] for odd addresses.
    pub fn peek32(&self, space: BusSpace, address: u32) -> Result<u32, BusError> {
        let pointer = self.pointer(AccessWidth::Word, space, address)?;
        if address % 4 == 0 {
            // SAFETY: in-window and word aligned.
            return Ok(unsafe { ptr::read_volatile(pointer.cast::<u32>()) });
        }
        // SAFETY: both halves are in-window and even.
        let (low, high) = unsafe {
            let low = ptr::read_volatile(pointer.cast::<u16>());
            let high = ptr::read_volatile(pointer.wrapping_add(2).cast::<u16>());
            (low, high)
        };
        Ok((u32::from(high) << 16) | u32::from(low))
    }

    /// 8-bit write through the window.
    ///
    /// # Errors
    ///
    /// See [`MappedBus::peek8`].
    pub fn poke8(&self, space: BusSpace, address: u32, value: u8) -> Result<(), BusError> {
        let pointer = self.pointer(AccessWidth::Byte, space, address)?;
        // SAFETY: see `peek8`.
        unsafe { ptr::write_volatile(pointer, value) };
        Ok(())
    }

    /// 16-bit write through the window.
    ///
    /// # Errors
    ///
    /// See [`MappedBus::peek16`].
    pub fn poke16(&self, space: BusSpace, address: u32, value: u16) -> Result<(), BusError> {
        let pointer = self.pointer(AccessWidth::Halfword, space, address)?;
        // SAFETY: see `peek16`.
        unsafe { ptr::write_volatile(pointer.cast::<u16>(), value) };
        Ok(())
    }

    /// 32-bit write through the window.
    ///
    /// # Errors
    ///
    /// See [`MappedBus::peek32`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn poke32(&self, space: BusSpace, address: u32, value: u32) -> Result<(), BusError> {
        let pointer = self.pointer(AccessWidth::Word, space, address)?;
        if address % 4 == 0 {
            // SAFETY: see `peek32`.
            unsafe { ptr::write_volatile(pointer.cast::<u32>(), value) };
            return Ok(());
        }
        // SAFETY: see `peek32`.
        unsafe {
            ptr::write_volatile(pointer.cast::<u16>(), value as u16);
            ptr::write_volatile(pointer.wrapping_add(2).cast::<u16>(), (value >> 16) as u16);
        }
        Ok(())
    }
}

/// Offset from the window base of a `width` access at `address` in
/// `space`. The whole access must stay inside that space's sub-window so
/// both halves of a split word land in the same space.
fn window_offset(
    window: &BusWindow,
    width: AccessWidth,
    space: BusSpace,
    address: u32,
) -> Result<usize, BusError> {
    let absolute = window
        .span_of(BusTarget { space, address }, width.bytes())
        .ok_or(BusError::AddressOverflow { space, address })?;
    if width != AccessWidth::Byte {
        validate_halfword_alignment(BusPort::new(space, PortWidth::Bits16), address)?;
    }
    Ok(absolute - window.base())
}

#[cfg(test)]
mod tests {
    use pc104_core::{
        AccessWidth, BridgeConfig, BusError, BusPort, BusSpace, BusWindow, PortWidth,
        DEFAULT_SPLIT_POINT,
    };
    use rstest::rstest;

    use super::{init, window_offset};
    use crate::SetupError;

    fn window() -> BusWindow {
        BusWindow::new(0x4000_0000, DEFAULT_SPLIT_POINT).expect("default geometry")
    }

    #[rstest]
    #[case(AccessWidth::Byte, BusSpace::Io, 0xF_FFFF, 0xF_FFFF)]
    #[case(AccessWidth::Halfword, BusSpace::Io, 0xF_FFFE, 0xF_FFFE)]
    #[case(AccessWidth::Word, BusSpace::Io, 0xF_FFFC, 0xF_FFFC)]
    #[case(AccessWidth::Word, BusSpace::Memory, 0x2, 0x10_0002)]
    fn window_offsets_stay_in_their_space(
        #[case] width: AccessWidth,
        #[case] space: BusSpace,
        #[case] address: u32,
        #[case] expected: usize,
    ) {
        assert_eq!(window_offset(&window(), width, space, address), Ok(expected));
    }

    #[test]
    fn io_word_at_the_split_does_not_spill_into_memory_space() {
        assert_eq!(
            window_offset(&window(), AccessWidth::Word, BusSpace::Io, 0xF_FFFE),
            Err(BusError::AddressOverflow {
                space: BusSpace::Io,
                address: 0xF_FFFE,
            })
        );
        assert_eq!(
            window_offset(&window(), AccessWidth::Halfword, BusSpace::Memory, 0xF_FFFF),
            Err(BusError::AddressOverflow {
                space: BusSpace::Memory,
                address: 0xF_FFFF,
            })
        );
    }

    #[test]
    fn odd_wide_window_access_is_unaligned() {
        assert_eq!(
            window_offset(&window(), AccessWidth::Halfword, BusSpace::Io, 0x141),
            Err(BusError::Unaligned {
                port: BusPort::new(BusSpace::Io, PortWidth::Bits16),
                address: 0x141,
            })
        );
    }

    #[test]
    #[cfg(not(all(target_arch = "arm", target_os = "linux")))]
    fn mmap_init_refuses_unsupported_targets_without_side_effects() {
        use super::{mapped, mmap_init};

        let config = BridgeConfig {
            device_dir: "/nonexistent/pc104".into(),
            ..BridgeConfig::default()
        };
        assert!(matches!(
            mmap_init(&config),
            Err(SetupError::UnsupportedPlatform { .. })
        ));
        assert!(mapped().is_none());
    }

    #[test]
    fn init_reports_the_missing_device() {
        let config = BridgeConfig {
            device_dir: "/nonexistent/pc104".into(),
            ..BridgeConfig::default()
        };
        assert!(matches!(
            init(&config),
            Err(SetupError::OpenDevice { .. })
        ));
    }
}
