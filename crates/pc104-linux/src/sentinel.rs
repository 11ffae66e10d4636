//! Inaccessible address-space reservation backing the bus window.

use std::io;
use std::ptr::{self, NonNull};

use tracing::debug;

use crate::SetupError;

/// Private anonymous reservation that faults on every access.
///
/// The pages are never backed; each load or store inside the region raises
/// `SIGSEGV`, which is what routes window accesses to the trap handler.
#[derive(Debug)]
pub struct SentinelRegion {
    base: NonNull<u8>,
    size: usize,
}

// SAFETY: the region is an address range with no readable contents; the
// handle only carries its bounds.
unsafe impl Send for SentinelRegion {}
// SAFETY: as above, nothing is ever dereferenced through a shared handle.
unsafe impl Sync for SentinelRegion {}

impl SentinelRegion {
    /// Reserves `size` bytes with no access rights.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Reserve`] when `mmap(2)` refuses the mapping.
    pub fn reserve(size: usize) -> Result<Self, SetupError> {
        // SAFETY: a fresh anonymous mapping at a kernel-chosen address
        // cannot alias any existing Rust object.
        let mapped = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if mapped == libc::MAP_FAILED {
            return Err(SetupError::Reserve {
                size,
                source: io::Error::last_os_error(),
            });
        }
        let base = NonNull::new(mapped.cast::<u8>()).ok_or_else(|| SetupError::Reserve {
            size,
            source: io::Error::from(io::ErrorKind::AddrNotAvailable),
        })?;
        debug!(base = ?base, size, "reserved sentinel region");
        Ok(Self { base, size })
    }

    /// First address of the region.
    #[must_use]
    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Length of the region in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Pointer to the first byte; dereferencing it traps.
    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }
}

impl Drop for SentinelRegion {
    fn drop(&mut self) {
        // SAFETY: `base`/`size` describe exactly the mapping created in
        // `reserve`, and nothing outlives the handle.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SentinelRegion;
    use crate::SetupError;

    #[test]
    fn reservation_is_page_aligned_and_sized() {
        let region = SentinelRegion::reserve(0x20_0000).expect("reserve");
        // SAFETY: sysconf has no preconditions.
        let page = usize::try_from(unsafe { libc::sysconf(libc::_SC_PAGESIZE) }).expect("page");

        assert_eq!(region.size(), 0x20_0000);
        assert_eq!(region.base() % page, 0);
        assert_eq!(region.as_ptr() as usize, region.base());
    }

    #[test]
    fn zero_sized_reservation_is_refused() {
        assert!(matches!(
            SentinelRegion::reserve(0),
            Err(SetupError::Reserve { size: 0, .. })
        ));
    }
}
