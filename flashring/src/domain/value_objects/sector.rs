//! Type-safe sector index value object.

use core::fmt;

/// Index of an erasable sector, counted from the start of the device.
///
/// Sector `k` covers `[k * sector_size, (k + 1) * sector_size)`. Whether a
/// sector is erased or dirty is never stored; it follows from where the
/// ring cursor has been.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SectorIndex(u32);

impl SectorIndex {
    /// Create a new sector index.
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the underlying u32 value.
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// The following sector, wrapping after `count` sectors.
    #[inline]
    pub const fn next_wrapping(self, count: u32) -> Self {
        if self.0 + 1 >= count {
            Self(0)
        } else {
            Self(self.0 + 1)
        }
    }
}

impl fmt::Display for SectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sector({})", self.0)
    }
}

impl From<u32> for SectorIndex {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}
