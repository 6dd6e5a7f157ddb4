//! Ring frontier detection.
//!
//! The ring keeps no metadata on flash, so after a restart the write cursor
//! is recovered from content alone: the frontier is the first erased sector
//! that directly follows a sector holding data.

use crate::domain::value_objects::{Address, Capacity, SectorIndex};

/// Bytes probed at the start of each sector.
pub const PROBE_LEN: usize = 256;

/// Whether a probe reads as erased flash.
#[inline]
pub fn is_erased(probe: &[u8]) -> bool {
    probe.iter().all(|&b| b == 0xFF)
}

/// Accumulates per-sector emptiness in address order.
///
/// Feed sectors from 0 upwards. [`feed`](Self::feed) returns the frontier as
/// soon as it is seen; otherwise [`finish`](Self::finish) picks the fallback.
///
/// ```
/// use flashring::domain::{Address, Capacity, FrontierScan, SectorIndex};
///
/// let mut scan = FrontierScan::new(Capacity::new(4 * 4096, 4096).unwrap());
/// assert_eq!(scan.feed(SectorIndex::new(0), false), None);
/// assert_eq!(scan.feed(SectorIndex::new(1), false), None);
/// assert_eq!(scan.feed(SectorIndex::new(2), true), Some(Address::new(0x2000)));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FrontierScan {
    capacity: Capacity,
    last_data: Option<SectorIndex>,
    previous_had_data: bool,
}

impl FrontierScan {
    /// Start a scan over `capacity`.
    pub const fn new(capacity: Capacity) -> Self {
        Self {
            capacity,
            last_data: None,
            previous_had_data: false,
        }
    }

    /// Probe length for this geometry.
    #[inline]
    pub fn probe_len(&self) -> usize {
        PROBE_LEN.min(self.capacity.sector_size() as usize)
    }

    /// Record the classification of the next sector.
    ///
    /// Returns the frontier address when `sector` is empty and its
    /// predecessor held data.
    pub fn feed(&mut self, sector: SectorIndex, empty: bool) -> Option<Address> {
        if empty {
            if self.previous_had_data {
                return Some(self.capacity.sector_start(sector));
            }
            self.previous_had_data = false;
        } else {
            self.last_data = Some(sector);
            self.previous_had_data = true;
        }
        None
    }

    /// Cursor to use when no frontier was found.
    ///
    /// An all-empty device starts at 0. A device with no detectable gap
    /// resumes after the last data sector, wrapping to 0.
    pub fn finish(&self) -> Address {
        match self.last_data {
            None => Address::ZERO,
            Some(last) => self
                .capacity
                .sector_start(last.next_wrapping(self.capacity.sector_count())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(pattern: &[bool]) -> Address {
        let capacity = Capacity::new(pattern.len() as u32 * 4096, 4096).unwrap();
        let mut scan = FrontierScan::new(capacity);
        for (i, &empty) in pattern.iter().enumerate() {
            if let Some(frontier) = scan.feed(SectorIndex::new(i as u32), empty) {
                return frontier;
            }
        }
        scan.finish()
    }

    #[test]
    fn test_empty_device_starts_at_zero() {
        assert_eq!(run(&[true, true, true, true]), Address::ZERO);
    }

    #[test]
    fn test_single_region_from_zero() {
        assert_eq!(run(&[false, false, true, true]), Address::new(0x2000));
    }

    #[test]
    fn test_leading_gap_is_skipped() {
        assert_eq!(run(&[true, false, true, true]), Address::new(0x2000));
    }

    #[test]
    fn test_full_device_resumes_after_last_data() {
        assert_eq!(run(&[false, false, false, false]), Address::ZERO);
    }

    #[test]
    fn test_data_at_end_wraps_to_zero() {
        assert_eq!(run(&[true, true, false, false]), Address::ZERO);
    }

    #[test]
    fn test_is_erased() {
        assert!(is_erased(&[0xFF; 16]));
        assert!(!is_erased(&[0xFF, 0xFE, 0xFF]));
        assert!(is_erased(&[]));
    }

    #[test]
    fn test_probe_len_clamped_to_sector() {
        let scan = FrontierScan::new(Capacity::new(1024, 128).unwrap());
        assert_eq!(scan.probe_len(), 128);
        let scan = FrontierScan::new(Capacity::w25q32());
        assert_eq!(scan.probe_len(), PROBE_LEN);
    }
}
