//! NOR Flash adapter for embedded-storage traits
//!
//! This module provides an adapter that wraps types implementing
//! `embedded-storage` NOR flash traits and exposes a region of them as a
//! [`FlashDevice`].
//!
//! # Example
//!
//! ```ignore
//! use esp_storage::FlashStorage as EspFlash;
//! use flashring::adapters::{Flash, NorFlashAdapter, NorFlashConfig};
//!
//! let esp_flash = EspFlash::new();
//! let device = NorFlashAdapter::new(esp_flash, NorFlashConfig::default_4mb());
//!
//! let flash = Flash::new(device);
//! flash.begin().await?;
//! ```

use core::fmt;

use embedded_storage::nor_flash::{NorFlash, NorFlashErrorKind, ReadNorFlash};

use super::{FlashDevice, W25Q32_JEDEC_ID};
use crate::domain::{Capacity, SECTOR_SIZE_4K};

/// Configuration for a NOR flash storage region
///
/// Defines where in flash the region starts, its geometry, and the chip id
/// reported by `identify` (embedded-storage has no identification command).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NorFlashConfig {
    /// Start offset in flash (must be sector-aligned)
    pub start_offset: u32,
    /// Geometry of the region
    pub capacity: Capacity,
    /// JEDEC id to report
    pub chip_id: u32,
}

impl NorFlashConfig {
    /// Create a new flash configuration
    ///
    /// # Panics
    /// Panics if `start_offset` is not aligned to the sector size
    pub const fn new(start_offset: u32, capacity: Capacity, chip_id: u32) -> Self {
        assert!(
            start_offset % capacity.sector_size() == 0,
            "start_offset must be sector aligned"
        );
        Self {
            start_offset,
            capacity,
            chip_id,
        }
    }

    /// Last 256KB of a 4MB flash
    ///
    /// Places the region at offset 0x3C0000 (3.75MB) with 64 sectors of 4KB.
    pub const fn default_4mb() -> Self {
        let capacity = match Capacity::new(64 * SECTOR_SIZE_4K, SECTOR_SIZE_4K) {
            Ok(capacity) => capacity,
            Err(_) => panic!("invalid preset geometry"),
        };
        Self::new(0x3C_0000, capacity, W25Q32_JEDEC_ID)
    }

    /// A whole Winbond W25Q32: 4MB from offset 0
    pub const fn w25q32() -> Self {
        Self::new(0, Capacity::w25q32(), W25Q32_JEDEC_ID)
    }

    /// One past the last flash offset of the region
    #[inline]
    pub const fn end_offset(&self) -> u32 {
        self.start_offset + self.capacity.total_bytes()
    }
}

impl Default for NorFlashConfig {
    fn default() -> Self {
        Self::default_4mb()
    }
}

/// Error type for NOR flash operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NorFlashError {
    kind: NorFlashErrorKind,
}

impl NorFlashError {
    fn from_nor<E: embedded_storage::nor_flash::NorFlashError>(err: E) -> Self {
        Self { kind: err.kind() }
    }

    /// What went wrong, as reported by the flash driver
    pub fn kind(&self) -> NorFlashErrorKind {
        self.kind
    }
}

impl fmt::Display for NorFlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NorFlashErrorKind::NotAligned => write!(f, "NOR flash error: not aligned"),
            NorFlashErrorKind::OutOfBounds => write!(f, "NOR flash error: out of bounds"),
            _ => write!(f, "NOR flash error"),
        }
    }
}

impl core::error::Error for NorFlashError {}

/// Adapter that exposes a region of an embedded-storage NOR flash as a
/// [`FlashDevice`]
///
/// Addresses passed to the adapter are relative to `start_offset`. Reads and
/// writes must respect the driver's `READ_SIZE`/`WRITE_SIZE`; drivers report
/// violations as `NotAligned`, which the adapter passes through.
///
/// # Example
///
/// ```ignore
/// use esp_storage::FlashStorage as EspFlash;
/// use flashring::adapters::{NorFlashAdapter, NorFlashConfig};
///
/// let flash = EspFlash::new();
/// let adapter = NorFlashAdapter::new(flash, NorFlashConfig::default_4mb());
/// ```
pub struct NorFlashAdapter<F> {
    flash: F,
    config: NorFlashConfig,
}

impl<F> NorFlashAdapter<F> {
    /// Create a new NOR flash adapter
    ///
    /// # Arguments
    /// * `flash` - The underlying flash implementation
    /// * `config` - Configuration for the flash region
    pub fn new(flash: F, config: NorFlashConfig) -> Self {
        Self { flash, config }
    }

    /// Get the configuration
    pub fn config(&self) -> &NorFlashConfig {
        &self.config
    }

    /// Consume the adapter and return the underlying flash
    pub fn into_inner(self) -> F {
        self.flash
    }

    /// Convert a region address to a flash offset
    #[inline]
    fn to_offset(&self, addr: u32) -> u32 {
        self.config.start_offset + addr
    }
}

impl<F> FlashDevice for NorFlashAdapter<F>
where
    F: NorFlash + ReadNorFlash,
{
    type Error = NorFlashError;

    fn capacity(&self) -> Capacity {
        self.config.capacity
    }

    async fn identify(&mut self) -> Result<u32, Self::Error> {
        Ok(self.config.chip_id)
    }

    async fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        let offset = self.to_offset(addr);
        self.flash
            .read(offset, buf)
            .map_err(NorFlashError::from_nor)
    }

    async fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error> {
        let offset = self.to_offset(addr);
        self.flash
            .write(offset, data)
            .map_err(NorFlashError::from_nor)
    }

    async fn erase_sector(&mut self, addr: u32) -> Result<(), Self::Error> {
        let offset = self.to_offset(addr);
        self.flash
            .erase(offset, offset + self.config.capacity.sector_size())
            .map_err(NorFlashError::from_nor)
    }

    async fn erase_all(&mut self) -> Result<(), Self::Error> {
        self.flash
            .erase(self.config.start_offset, self.config.end_offset())
            .map_err(NorFlashError::from_nor)
    }
}

#[cfg(all(test, feature = "alloc"))]
mod tests {
    use super::*;
    use crate::adapters::{Flash, MemFlash};
    use crate::domain::Address;

    fn block_on<F: core::future::Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    fn backing() -> MemFlash {
        MemFlash::new(Capacity::new(16 * 4096, 4096).unwrap())
    }

    fn region() -> NorFlashConfig {
        NorFlashConfig::new(0x8000, Capacity::new(4 * 4096, 4096).unwrap(), 0xEF4016)
    }

    #[test]
    fn test_region_is_offset_into_flash() {
        block_on(async {
            let mut adapter = NorFlashAdapter::new(backing(), region());
            adapter.erase_sector(0x1000).await.unwrap();
            adapter.program(0x1000, b"nor").await.unwrap();

            let mut buf = [0u8; 3];
            adapter.read(0x1000, &mut buf).await.unwrap();
            assert_eq!(&buf, b"nor");

            let mem = adapter.into_inner();
            assert_eq!(&mem.image()[0x9000..0x9003], b"nor");
            assert_eq!(mem.sector_erase_counts()[9], 1);
        });
    }

    #[test]
    fn test_erase_all_stays_inside_region() {
        block_on(async {
            let mut adapter = NorFlashAdapter::new(backing(), region());
            adapter.erase_all().await.unwrap();
            let mem = adapter.into_inner();
            let touched: Vec<usize> = mem
                .sector_erase_counts()
                .iter()
                .enumerate()
                .filter(|(_, n)| **n > 0)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(touched, vec![8, 9, 10, 11]);
        });
    }

    #[test]
    fn test_driver_errors_keep_their_kind() {
        block_on(async {
            let config = NorFlashConfig::new(0xC000, Capacity::new(8 * 4096, 4096).unwrap(), 1);
            let mut adapter = NorFlashAdapter::new(backing(), config);
            let mut buf = [0u8; 4];
            let err = adapter.read(0x4000, &mut buf).await.unwrap_err();
            assert_eq!(err.kind(), NorFlashErrorKind::OutOfBounds);
        });
    }

    #[test]
    fn test_behind_bus_lock() {
        block_on(async {
            let flash = Flash::new(NorFlashAdapter::new(backing(), region()));
            let info = flash.begin().await.unwrap();
            assert_eq!(info.chip_id, 0xEF4016);
            assert_eq!(info.capacity.total_bytes(), 4 * 4096);

            flash.erase_sector(Address::new(0x10)).await.unwrap();
            flash.program(Address::new(0x10), &[1, 2, 3]).await.unwrap();
            let mut buf = [0u8; 3];
            flash.read(Address::new(0x10), &mut buf).await.unwrap();
            assert_eq!(buf, [1, 2, 3]);
        });
    }

    #[test]
    fn test_config_presets() {
        let config_4mb = NorFlashConfig::default_4mb();
        assert_eq!(config_4mb.start_offset, 0x3C_0000);
        assert_eq!(config_4mb.capacity.sector_count(), 64);
        assert_eq!(config_4mb.end_offset(), 0x40_0000);

        let whole = NorFlashConfig::w25q32();
        assert_eq!(whole.start_offset, 0);
        assert_eq!(whole.capacity, Capacity::w25q32());
        assert_eq!(NorFlashConfig::default(), config_4mb);
    }

    #[test]
    #[should_panic(expected = "sector aligned")]
    fn test_config_unaligned() {
        let _ = NorFlashConfig::new(0x100, Capacity::w25q32(), 0);
    }
}
