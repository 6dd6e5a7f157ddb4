//! In-memory NOR flash simulator.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use super::{FlashDevice, W25Q32_JEDEC_ID};
use crate::domain::{Capacity, CapacityError, SectorIndex};

/// Primitive kinds, used for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `identify`
    Identify,
    /// `read`
    Read,
    /// `program`
    Program,
    /// `erase_sector` or `erase_all`
    Erase,
}

/// Errors reported by [`MemFlash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemFlashError {
    /// A fault armed with [`MemFlash::fail_once`] fired.
    Injected(Operation),
    /// The access falls outside the simulated chip.
    OutOfBounds {
        /// Start address.
        addr: u32,
        /// Length in bytes.
        len: usize,
    },
    /// An erase address is not sector-aligned.
    NotAligned(u32),
}

impl fmt::Display for MemFlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Injected(op) => write!(f, "Injected {:?} fault", op),
            Self::OutOfBounds { addr, len } => {
                write!(f, "Access 0x{:08X}+{} is outside the chip", addr, len)
            }
            Self::NotAligned(addr) => write!(f, "Address 0x{:08X} is not sector-aligned", addr),
        }
    }
}

impl core::error::Error for MemFlashError {}

/// Operation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashStats {
    /// Successful reads.
    pub reads: u32,
    /// Successful programs.
    pub programs: u32,
    /// Successful sector erases.
    pub sector_erases: u32,
    /// Successful chip erases.
    pub chip_erases: u32,
}

/// A RAM-backed NOR chip.
///
/// Erase fills with 0xFF and program ANDs new bits into old ones, exactly
/// like real NOR. Counters and per-sector erase counts make the physical
/// effect of higher layers observable in tests.
///
/// # Example
///
/// ```
/// use flashring::adapters::MemFlash;
/// use flashring::domain::Capacity;
///
/// let mem = MemFlash::new(Capacity::new(8192, 4096).unwrap());
/// assert!(mem.image().iter().all(|&b| b == 0xFF));
/// ```
#[derive(Clone)]
pub struct MemFlash {
    data: Vec<u8>,
    capacity: Capacity,
    chip_id: u32,
    stats: FlashStats,
    erase_counts: Vec<u32>,
    fault: Option<(Operation, Option<u32>)>,
}

impl MemFlash {
    /// A fully erased chip.
    pub fn new(capacity: Capacity) -> Self {
        Self {
            data: vec![0xFF; capacity.total_bytes() as usize],
            capacity,
            chip_id: W25Q32_JEDEC_ID,
            stats: FlashStats::default(),
            erase_counts: vec![0; capacity.sector_count() as usize],
            fault: None,
        }
    }

    /// A chip holding `image`, e.g. loaded from a file.
    pub fn from_image(image: Vec<u8>, sector_size: u32) -> Result<Self, CapacityError> {
        let capacity = Capacity::from_len(image.len(), sector_size)?;
        let mut mem = Self::new(capacity);
        mem.data = image;
        Ok(mem)
    }

    /// Report `chip_id` from `identify`.
    pub fn with_chip_id(mut self, chip_id: u32) -> Self {
        self.chip_id = chip_id;
        self
    }

    /// Raw content.
    pub fn image(&self) -> &[u8] {
        &self.data
    }

    /// Consume the chip and return its content.
    pub fn into_image(self) -> Vec<u8> {
        self.data
    }

    /// Operation counters.
    pub fn stats(&self) -> FlashStats {
        self.stats
    }

    /// How often `sector` has been erased, chip erases included.
    pub fn erase_count(&self, sector: SectorIndex) -> u32 {
        self.erase_counts
            .get(sector.value() as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Erase counts of every sector, in address order.
    pub fn sector_erase_counts(&self) -> &[u32] {
        &self.erase_counts
    }

    /// Make the next `op` fail.
    ///
    /// With `at` set, only an operation starting at that address fires the
    /// fault (the sector start for erases). The fault is cleared once it fires.
    pub fn fail_once(&mut self, op: Operation, at: Option<u32>) {
        self.fault = Some((op, at));
    }

    fn trip(&mut self, op: Operation, addr: u32) -> Result<(), MemFlashError> {
        match self.fault {
            Some((armed, at)) if armed == op && at.is_none_or(|a| a == addr) => {
                self.fault = None;
                Err(MemFlashError::Injected(op))
            }
            _ => Ok(()),
        }
    }

    fn bounds(&self, addr: u32, len: usize) -> Result<core::ops::Range<usize>, MemFlashError> {
        if self.capacity.fits(addr, len) {
            let start = addr as usize;
            Ok(start..start + len)
        } else {
            Err(MemFlashError::OutOfBounds { addr, len })
        }
    }

    fn read_sync(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), MemFlashError> {
        let range = self.bounds(addr, buf.len())?;
        self.trip(Operation::Read, addr)?;
        buf.copy_from_slice(&self.data[range]);
        self.stats.reads += 1;
        Ok(())
    }

    fn program_sync(&mut self, addr: u32, data: &[u8]) -> Result<(), MemFlashError> {
        let range = self.bounds(addr, data.len())?;
        self.trip(Operation::Program, addr)?;
        for (cell, byte) in self.data[range].iter_mut().zip(data) {
            *cell &= *byte;
        }
        self.stats.programs += 1;
        Ok(())
    }

    fn erase_sector_sync(&mut self, addr: u32) -> Result<(), MemFlashError> {
        let sector_size = self.capacity.sector_size();
        if addr % sector_size != 0 {
            return Err(MemFlashError::NotAligned(addr));
        }
        let range = self.bounds(addr, sector_size as usize)?;
        self.trip(Operation::Erase, addr)?;
        self.data[range].fill(0xFF);
        self.erase_counts[(addr / sector_size) as usize] += 1;
        self.stats.sector_erases += 1;
        Ok(())
    }

    fn erase_all_sync(&mut self) -> Result<(), MemFlashError> {
        self.trip(Operation::Erase, 0)?;
        self.data.fill(0xFF);
        for count in &mut self.erase_counts {
            *count += 1;
        }
        self.stats.chip_erases += 1;
        Ok(())
    }
}

impl fmt::Debug for MemFlash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemFlash")
            .field("capacity", &self.capacity)
            .field("chip_id", &self.chip_id)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl FlashDevice for MemFlash {
    type Error = MemFlashError;

    fn capacity(&self) -> Capacity {
        self.capacity
    }

    async fn identify(&mut self) -> Result<u32, MemFlashError> {
        self.trip(Operation::Identify, 0)?;
        Ok(self.chip_id)
    }

    async fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), MemFlashError> {
        self.read_sync(addr, buf)
    }

    async fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), MemFlashError> {
        self.program_sync(addr, data)
    }

    async fn erase_sector(&mut self, addr: u32) -> Result<(), MemFlashError> {
        self.erase_sector_sync(addr)
    }

    async fn erase_all(&mut self) -> Result<(), MemFlashError> {
        self.erase_all_sync()
    }
}

#[cfg(feature = "embedded-storage")]
mod nor_flash {
    use super::*;
    use embedded_storage::nor_flash::{
        ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
    };

    impl NorFlashError for MemFlashError {
        fn kind(&self) -> NorFlashErrorKind {
            match self {
                MemFlashError::OutOfBounds { .. } => NorFlashErrorKind::OutOfBounds,
                MemFlashError::NotAligned(_) => NorFlashErrorKind::NotAligned,
                MemFlashError::Injected(_) => NorFlashErrorKind::Other,
            }
        }
    }

    impl ErrorType for MemFlash {
        type Error = MemFlashError;
    }

    impl ReadNorFlash for MemFlash {
        const READ_SIZE: usize = 1;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            self.read_sync(offset, bytes)
        }

        fn capacity(&self) -> usize {
            self.data.len()
        }
    }

    /// `ERASE_SIZE` is a constant and reports the 4 KiB sector of the W25Q32
    /// preset. A chip built with another sector size still checks erase
    /// ranges against its own sector size, so generic code should only be
    /// handed 4 KiB geometries.
    impl NorFlash for MemFlash {
        const WRITE_SIZE: usize = 1;
        const ERASE_SIZE: usize = crate::domain::SECTOR_SIZE_4K as usize;

        fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
            let sector_size = self.capacity.sector_size();
            if from > to || to > self.capacity.total_bytes() {
                return Err(MemFlashError::OutOfBounds {
                    addr: from,
                    len: to.saturating_sub(from) as usize,
                });
            }
            if from % sector_size != 0 {
                return Err(MemFlashError::NotAligned(from));
            }
            if to % sector_size != 0 {
                return Err(MemFlashError::NotAligned(to));
            }
            let mut addr = from;
            while addr < to {
                self.erase_sector_sync(addr)?;
                addr += sector_size;
            }
            Ok(())
        }

        fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            self.program_sync(offset, bytes)
        }
    }
}
