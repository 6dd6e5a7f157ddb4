//! Device geometry value object.

use super::{Address, SectorIndex};

/// Sector size of the common 4KB-erase serial NOR parts.
pub const SECTOR_SIZE_4K: u32 = 4096;

/// Program page size. Only used to report the device page count.
pub const PAGE_SIZE: u32 = 256;

/// Immutable device geometry: total bytes and sector size.
///
/// The sector size always divides the total size evenly, so every address
/// belongs to exactly one whole sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capacity {
    total: u32,
    sector_size: u32,
}

impl Capacity {
    /// Create a new geometry.
    ///
    /// # Errors
    ///
    /// Returns an error if either size is zero or the sector size does not
    /// divide the total size.
    ///
    /// # Examples
    ///
    /// ```
    /// use flashring::domain::Capacity;
    ///
    /// let cap = Capacity::new(64 * 1024, 4096).unwrap();
    /// assert_eq!(cap.sector_count(), 16);
    /// assert!(Capacity::new(10_000, 4096).is_err());
    /// ```
    pub const fn new(total: u32, sector_size: u32) -> Result<Self, CapacityError> {
        if total == 0 {
            return Err(CapacityError::ZeroSize);
        }
        if sector_size == 0 {
            return Err(CapacityError::ZeroSectorSize);
        }
        if total % sector_size != 0 {
            return Err(CapacityError::Indivisible { total, sector_size });
        }
        Ok(Self { total, sector_size })
    }

    /// Geometry for a raw image of `len` bytes.
    pub fn from_len(len: usize, sector_size: u32) -> Result<Self, CapacityError> {
        let total = u32::try_from(len).map_err(|_| CapacityError::TooLarge { len })?;
        Self::new(total, sector_size)
    }

    /// Winbond W25Q32: 4MB with 4KB sectors.
    pub const fn w25q32() -> Self {
        Self {
            total: 4 * 1024 * 1024,
            sector_size: SECTOR_SIZE_4K,
        }
    }

    /// Total size in bytes.
    #[inline]
    pub const fn total_bytes(&self) -> u32 {
        self.total
    }

    /// Sector size in bytes.
    #[inline]
    pub const fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Number of sectors.
    #[inline]
    pub const fn sector_count(&self) -> u32 {
        self.total / self.sector_size
    }

    /// Number of program pages.
    #[inline]
    pub const fn page_count(&self) -> u32 {
        self.total.div_ceil(PAGE_SIZE)
    }

    /// Whether `addr` lies inside the device.
    #[inline]
    pub const fn contains(&self, addr: Address) -> bool {
        addr.value() < self.total
    }

    /// Whether `[addr, addr + len)` lies inside the device.
    #[inline]
    pub const fn fits(&self, addr: u32, len: usize) -> bool {
        match (addr as u64).checked_add(len as u64) {
            Some(end) => end <= self.total as u64,
            None => false,
        }
    }

    /// The sector containing `addr`.
    #[inline]
    pub const fn sector_of(&self, addr: Address) -> SectorIndex {
        SectorIndex::new(addr.value() / self.sector_size)
    }

    /// First byte of `sector`.
    #[inline]
    pub const fn sector_start(&self, sector: SectorIndex) -> Address {
        Address::new(sector.value() * self.sector_size)
    }

    /// One past the last byte of `sector`.
    #[inline]
    pub const fn sector_end(&self, sector: SectorIndex) -> u32 {
        (sector.value() + 1) * self.sector_size
    }

    /// Round `addr` down to the start of its sector.
    #[inline]
    pub const fn align_down(&self, addr: Address) -> Address {
        Address::new(addr.value() - addr.value() % self.sector_size)
    }

    /// Whether `addr` is the first byte of a sector.
    #[inline]
    pub const fn is_sector_aligned(&self, addr: Address) -> bool {
        addr.value() % self.sector_size == 0
    }

    /// Move `addr` forward by `len` bytes modulo the total size.
    ///
    /// # Examples
    ///
    /// ```
    /// use flashring::domain::{Address, Capacity};
    ///
    /// let cap = Capacity::new(4096, 4096).unwrap();
    /// assert_eq!(cap.advance(Address::new(4090), 6), Address::new(0));
    /// assert_eq!(cap.advance(Address::new(4090), 10), Address::new(4));
    /// ```
    #[inline]
    pub const fn advance(&self, addr: Address, len: u32) -> Address {
        Address::new(((addr.value() as u64 + len as u64) % self.total as u64) as u32)
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Self::w25q32()
    }
}

/// Errors that can occur when creating a [`Capacity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CapacityError {
    /// Total size is zero.
    ZeroSize,
    /// Sector size is zero.
    ZeroSectorSize,
    /// Sector size does not divide the total size.
    Indivisible {
        /// The requested total size.
        total: u32,
        /// The requested sector size.
        sector_size: u32,
    },
    /// Total size does not fit the 32-bit address space.
    TooLarge {
        /// The requested total size.
        len: usize,
    },
}

impl core::fmt::Display for CapacityError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ZeroSize => write!(f, "Capacity cannot be zero"),
            Self::ZeroSectorSize => write!(f, "Sector size cannot be zero"),
            Self::Indivisible { total, sector_size } => write!(
                f,
                "Capacity {} is not a multiple of sector size {}",
                total, sector_size
            ),
            Self::TooLarge { len } => {
                write!(f, "Capacity {} exceeds the 32-bit address space", len)
            }
        }
    }
}

impl core::error::Error for CapacityError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_validation() {
        assert_eq!(Capacity::new(0, 4096), Err(CapacityError::ZeroSize));
        assert_eq!(Capacity::new(4096, 0), Err(CapacityError::ZeroSectorSize));
        assert_eq!(
            Capacity::new(6000, 4096),
            Err(CapacityError::Indivisible {
                total: 6000,
                sector_size: 4096
            })
        );
        assert!(Capacity::new(8192, 4096).is_ok());
    }

    #[test]
    fn test_w25q32_preset() {
        let cap = Capacity::w25q32();
        assert_eq!(cap.total_bytes(), 4_194_304);
        assert_eq!(cap.sector_size(), 4096);
        assert_eq!(cap.sector_count(), 1024);
        assert_eq!(cap.page_count(), 16384);
    }

    #[test]
    fn test_sector_math() {
        let cap = Capacity::new(16 * 1024, 4096).unwrap();
        assert_eq!(cap.sector_of(Address::new(0x1FFF)), SectorIndex::new(1));
        assert_eq!(cap.sector_start(SectorIndex::new(3)), Address::new(0x3000));
        assert_eq!(cap.sector_end(SectorIndex::new(3)), 0x4000);
        assert_eq!(cap.align_down(Address::new(0x2ABC)), Address::new(0x2000));
        assert!(cap.is_sector_aligned(Address::new(0x2000)));
        assert!(!cap.is_sector_aligned(Address::new(0x2001)));
    }

    #[test]
    fn test_fits_handles_overflow() {
        let cap = Capacity::new(4096, 4096).unwrap();
        assert!(cap.fits(0, 4096));
        assert!(cap.fits(4096, 0));
        assert!(!cap.fits(4090, 7));
        assert!(!cap.fits(u32::MAX, usize::MAX));
    }

    #[test]
    fn test_advance_wraps() {
        let cap = Capacity::new(8192, 4096).unwrap();
        assert_eq!(cap.advance(Address::new(100), 50), Address::new(150));
        assert_eq!(cap.advance(Address::new(8000), 192), Address::ZERO);
        assert_eq!(cap.advance(Address::new(8000), 200), Address::new(8));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_from_len_beyond_address_space() {
        let len = u32::MAX as usize + 1;
        assert_eq!(
            Capacity::from_len(len, 4096),
            Err(CapacityError::TooLarge { len })
        );
        assert!(format!("{}", CapacityError::TooLarge { len }).contains("32-bit"));
        assert_eq!(Capacity::from_len(8192, 4096), Capacity::new(8192, 4096));
    }

    #[test]
    fn test_error_display() {
        let msg = format!("{}", CapacityError::Indivisible { total: 10, sector_size: 3 });
        assert!(msg.contains("10"));
        assert!(msg.contains("3"));
    }
}
