//! Sentinel window geometry and fault-address translation.
//!
//! The window is a reserved, unbacked virtual range. Its low half stands in
//! for the I/O space and its high half for the memory space, so an offset
//! into the window names exactly one bus space and local bus address.

use thiserror::Error;

use crate::BusSpace;

/// Default size of each sub-window (1 MiB).
pub const DEFAULT_SPLIT_POINT: usize = 0x10_0000;

/// Default total window size (2 MiB).
pub const DEFAULT_WINDOW_SIZE: usize = 2 * DEFAULT_SPLIT_POINT;

/// Invalid window geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WindowError {
    /// A zero split point leaves no addressable space.
    #[error("split point must be non-zero")]
    EmptySplit,
    /// Local addresses would not fit the 32-bit bus address type.
    #[error("split point {split_point:#x} exceeds the 32-bit bus address range")]
    SplitTooLarge {
        /// Rejected split point.
        split_point: usize,
    },
    /// The window does not fit in the address space.
    #[error("window of twice {split_point:#x} bytes at {base:#x} overflows the address space")]
    Overflow {
        /// Requested base.
        base: usize,
        /// Requested split point.
        split_point: usize,
    },
}

/// Returns the total window size for `split_point`.
///
/// # Errors
///
/// Returns a [`WindowError`] for a zero split, a split beyond the 32-bit
/// bus range, or a size that overflows `usize`.
pub fn window_size(split_point: usize) -> Result<usize, WindowError> {
    if split_point == 0 {
        return Err(WindowError::EmptySplit);
    }
    if u32::try_from(split_point - 1).is_err() {
        return Err(WindowError::SplitTooLarge { split_point });
    }
    split_point
        .checked_mul(2)
        .ok_or(WindowError::Overflow {
            base: 0,
            split_point,
        })
}

/// Bus space and local address an access resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BusTarget {
    /// Space selected by the sub-window.
    pub space: BusSpace,
    /// Address relative to the start of that sub-window.
    pub address: u32,
}

/// Reserved window `[base, base + size)` with `split_point == size / 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BusWindow {
    base: usize,
    size: usize,
    split_point: usize,
}

impl BusWindow {
    /// Describes a window at `base` whose sub-windows are `split_point`
    /// bytes each.
    ///
    /// # Errors
    ///
    /// Returns a [`WindowError`] when the geometry is empty, too large for
    /// 32-bit bus addresses, or wraps the address space.
    pub fn new(base: usize, split_point: usize) -> Result<Self, WindowError> {
        let size = window_size(split_point)?;
        if base.checked_add(size).is_none() {
            return Err(WindowError::Overflow { base, split_point });
        }
        Ok(Self {
            base,
            size,
            split_point,
        })
    }

    /// First address of the window.
    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Total window size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Offset where the memory sub-window starts.
    #[must_use]
    pub const fn split_point(&self) -> usize {
        self.split_point
    }

    /// Returns `true` when `address` lies inside `[base, base + size)`.
    #[must_use]
    pub const fn contains(&self, address: usize) -> bool {
        address >= self.base && address - self.base < self.size
    }

    /// Resolves an absolute address inside the window.
    ///
    /// Returns `None` for addresses outside the window.
    #[must_use]
    pub fn translate(&self, address: usize) -> Option<BusTarget> {
        if !self.contains(address) {
            return None;
        }
        self.translate_offset(address - self.base)
    }

    /// Resolves an offset from the window base.
    ///
    /// Returns `None` for offsets at or beyond the window size.
    #[must_use]
    pub fn translate_offset(&self, offset: usize) -> Option<BusTarget> {
        if offset >= self.size {
            return None;
        }
        let (space, local) = if offset >= self.split_point {
            (BusSpace::Memory, offset - self.split_point)
        } else {
            (BusSpace::Io, offset)
        };
        let address = u32::try_from(local).ok()?;
        Some(BusTarget { space, address })
    }

    /// Absolute address that resolves to `target`.
    ///
    /// Returns `None` when `target.address` lies beyond the sub-window.
    #[must_use]
    pub fn address_of(&self, target: BusTarget) -> Option<usize> {
        let local = usize::try_from(target.address).ok()?;
        if local >= self.split_point {
            return None;
        }
        let offset = match target.space {
            BusSpace::Io => local,
            BusSpace::Memory => self.split_point + local,
        };
        Some(self.base + offset)
    }

    /// Absolute address of a `bytes`-wide access at `target` that stays
    /// inside the target's own sub-window.
    ///
    /// Returns `None` when any byte of the access would fall past the end
    /// of that sub-window, even if it is still inside the window.
    #[must_use]
    pub fn span_of(&self, target: BusTarget, bytes: usize) -> Option<usize> {
        let last = u32::try_from(bytes.checked_sub(1)?).ok()?;
        let end = BusTarget {
            space: target.space,
            address: target.address.checked_add(last)?,
        };
        self.address_of(end)?;
        self.address_of(target)
    }
}

#[cfg(test)]
mod tests {
    use super::{window_size, BusTarget, BusWindow, WindowError, DEFAULT_SPLIT_POINT};
    use crate::BusSpace;

    const BASE: usize = 0x4000_0000;

    fn window() -> BusWindow {
        BusWindow::new(BASE, DEFAULT_SPLIT_POINT).expect("default geometry is valid")
    }

    #[test]
    fn default_geometry_is_two_mib_split_at_one_mib() {
        let window = window();
        assert_eq!(window.size(), 0x20_0000);
        assert_eq!(window.split_point(), window.size() / 2);
    }

    #[test]
    fn boundary_offsets_resolve_to_the_expected_space() {
        let window = window();
        let split = window.split_point();
        let size = window.size();

        assert_eq!(
            window.translate(BASE),
            Some(BusTarget {
                space: BusSpace::Io,
                address: 0,
            })
        );
        assert_eq!(
            window.translate(BASE + split - 1),
            Some(BusTarget {
                space: BusSpace::Io,
                address: 0x0F_FFFF,
            })
        );
        assert_eq!(
            window.translate(BASE + split),
            Some(BusTarget {
                space: BusSpace::Memory,
                address: 0,
            })
        );
        assert_eq!(
            window.translate(BASE + size - 1),
            Some(BusTarget {
                space: BusSpace::Memory,
                address: 0x0F_FFFF,
            })
        );
    }

    #[test]
    fn addresses_outside_the_window_do_not_resolve() {
        let window = window();
        assert_eq!(window.translate(BASE - 1), None);
        assert_eq!(window.translate(BASE + window.size()), None);
        assert_eq!(window.translate(0), None);
        assert_eq!(window.translate(usize::MAX), None);
    }

    #[test]
    fn address_of_inverts_translate() {
        let window = window();
        for target in [
            BusTarget {
                space: BusSpace::Io,
                address: 0x140,
            },
            BusTarget {
                space: BusSpace::Memory,
                address: 0xF_FFFE,
            },
        ] {
            let address = window.address_of(target).expect("inside sub-window");
            assert_eq!(window.translate(address), Some(target));
        }

        assert_eq!(
            window.address_of(BusTarget {
                space: BusSpace::Io,
                address: 0x10_0000,
            }),
            None
        );
    }

    #[test]
    fn spans_do_not_cross_into_the_next_sub_window() {
        let window = window();
        let split = u32::try_from(window.split_point()).expect("fits");
        let io_tail = BusTarget {
            space: BusSpace::Io,
            address: split - 2,
        };

        assert_eq!(window.span_of(io_tail, 2), Some(BASE + 0xF_FFFE));
        assert_eq!(window.span_of(io_tail, 4), None);
        assert_eq!(
            window.span_of(
                BusTarget {
                    space: BusSpace::Memory,
                    address: split - 4,
                },
                4
            ),
            Some(BASE + 2 * window.split_point() - 4)
        );
        assert_eq!(window.span_of(io_tail, 0), None);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        assert_eq!(window_size(0), Err(WindowError::EmptySplit));
        assert_eq!(
            BusWindow::new(usize::MAX - 0x10, DEFAULT_SPLIT_POINT),
            Err(WindowError::Overflow {
                base: usize::MAX - 0x10,
                split_point: DEFAULT_SPLIT_POINT,
            })
        );
    }
}
