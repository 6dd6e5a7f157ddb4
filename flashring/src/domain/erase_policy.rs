//! Erase-before-write policy.
//!
//! NOR flash can only clear bits, so a sector must be erased before new data
//! lands in it. [`ErasePolicy`] turns a write of `(addr, len)` into one
//! [`Segment`] per touched sector and marks which segments must erase their
//! sector first. This is the only place that decides when an erase happens;
//! everything above it just follows the plan.
//!
//! A sector counts as *entered* once a segment has been placed in it. A write
//! stream that starts mid-sector (ring appends) has already entered the cursor's
//! sector, so its neighbours written earlier survive. Crossing a sector
//! boundary, including the wrap back to address 0, always enters a new sector.

use crate::domain::value_objects::{Address, Capacity, SectorIndex};

/// What to do when a write reaches the end of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Wrap {
    /// Continue at address 0.
    Around,
    /// Stop at the last byte.
    Never,
}

/// A run of bytes that stays inside one sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Segment {
    /// Device address of the first byte.
    pub addr: Address,
    /// Offset of the first byte within the caller's data.
    pub offset: usize,
    /// Number of bytes.
    pub len: usize,
    /// Whether the enclosing sector must be erased before programming.
    pub erase_first: bool,
}

impl Segment {
    /// Slice this segment out of the caller's data.
    #[inline]
    pub fn bytes<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset..self.offset + self.len]
    }
}

/// Plans erase and program steps for one logical write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErasePolicy {
    capacity: Capacity,
    entered: Option<SectorIndex>,
}

impl ErasePolicy {
    /// A stream that has entered no sector yet.
    ///
    /// The first segment always erases its sector, even when `addr` is not
    /// sector-aligned.
    pub const fn fresh(capacity: Capacity) -> Self {
        Self {
            capacity,
            entered: None,
        }
    }

    /// A stream continuing from `cursor`.
    ///
    /// If the cursor is mid-sector, that sector was already entered by an
    /// earlier write and is not erased again.
    pub const fn resuming_at(capacity: Capacity, cursor: Address) -> Self {
        let entered = if capacity.is_sector_aligned(cursor) {
            None
        } else {
            Some(capacity.sector_of(cursor))
        };
        Self { capacity, entered }
    }

    /// Split `len` bytes starting at `addr` into per-sector segments.
    ///
    /// # Examples
    ///
    /// ```
    /// use flashring::domain::{Address, Capacity, ErasePolicy, Wrap};
    ///
    /// let cap = Capacity::new(8192, 4096).unwrap();
    /// let plan: Vec<_> = ErasePolicy::resuming_at(cap, Address::new(4000))
    ///     .segments(Address::new(4000), 200, Wrap::Around)
    ///     .collect();
    ///
    /// assert_eq!(plan.len(), 2);
    /// assert!(!plan[0].erase_first);
    /// assert_eq!(plan[1].addr, Address::new(4096));
    /// assert!(plan[1].erase_first);
    /// ```
    pub fn segments(self, addr: Address, len: usize, wrap: Wrap) -> Segments {
        Segments {
            capacity: self.capacity,
            entered: self.entered,
            addr: addr.value(),
            offset: 0,
            remaining: len,
            wrap,
        }
    }
}

/// Iterator over the segments of a planned write.
#[derive(Debug, Clone)]
pub struct Segments {
    capacity: Capacity,
    entered: Option<SectorIndex>,
    addr: u32,
    offset: usize,
    remaining: usize,
    wrap: Wrap,
}

impl Iterator for Segments {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.remaining == 0 {
            return None;
        }
        if self.addr >= self.capacity.total_bytes() {
            match self.wrap {
                Wrap::Around => {
                    self.addr = 0;
                    self.entered = None;
                }
                Wrap::Never => {
                    self.remaining = 0;
                    return None;
                }
            }
        }

        let addr = Address::new(self.addr);
        let sector = self.capacity.sector_of(addr);
        let room = (self.capacity.sector_end(sector) - self.addr) as usize;
        let len = room.min(self.remaining);
        let erase_first = self.entered != Some(sector);

        let segment = Segment {
            addr,
            offset: self.offset,
            len,
            erase_first,
        };

        self.entered = Some(sector);
        self.addr += len as u32;
        self.offset += len;
        self.remaining -= len;
        Some(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn cap(total: u32, sector: u32) -> Capacity {
        Capacity::new(total, sector).unwrap()
    }

    fn plan(policy: ErasePolicy, addr: u32, len: usize, wrap: Wrap) -> Vec<Segment> {
        policy.segments(Address::new(addr), len, wrap).collect()
    }

    #[test]
    fn test_fresh_erases_mid_sector_target() {
        let capacity = cap(16384, 4096);
        let segments = plan(ErasePolicy::fresh(capacity), 0x1010, 5, Wrap::Never);
        assert_eq!(
            segments,
            vec![Segment {
                addr: Address::new(0x1010),
                offset: 0,
                len: 5,
                erase_first: true,
            }]
        );
    }

    #[test]
    fn test_resuming_mid_sector_keeps_neighbours() {
        let capacity = cap(16384, 4096);
        let policy = ErasePolicy::resuming_at(capacity, Address::new(0x1010));
        let segments = plan(policy, 0x1010, 16, Wrap::Around);
        assert_eq!(segments.len(), 1);
        assert!(!segments[0].erase_first);
    }

    #[test]
    fn test_resuming_at_boundary_erases() {
        let capacity = cap(16384, 4096);
        let policy = ErasePolicy::resuming_at(capacity, Address::new(0x2000));
        let segments = plan(policy, 0x2000, 16, Wrap::Around);
        assert!(segments[0].erase_first);
    }

    #[test]
    fn test_split_across_sectors() {
        let capacity = cap(16384, 4096);
        let policy = ErasePolicy::resuming_at(capacity, Address::new(4000));
        let segments = plan(policy, 4000, 4096 + 200, Wrap::Around);

        let summary: Vec<_> = segments
            .iter()
            .map(|s| (s.addr.value(), s.offset, s.len, s.erase_first))
            .collect();
        assert_eq!(
            summary,
            vec![
                (4000, 0, 96, false),
                (4096, 96, 4096, true),
                (8192, 4192, 104, true),
            ]
        );
    }

    #[test]
    fn test_wrap_around_reenters_single_sector() {
        let capacity = cap(4096, 4096);
        let policy = ErasePolicy::resuming_at(capacity, Address::new(4090));
        let segments = plan(policy, 4090, 10, Wrap::Around);

        assert_eq!(segments.len(), 2);
        assert_eq!((segments[0].addr.value(), segments[0].len), (4090, 6));
        assert!(!segments[0].erase_first);
        assert_eq!((segments[1].addr.value(), segments[1].offset), (0, 6));
        assert_eq!(segments[1].len, 4);
        assert!(segments[1].erase_first);
    }

    #[test]
    fn test_never_stops_at_end() {
        let capacity = cap(8192, 4096);
        let segments = plan(ErasePolicy::fresh(capacity), 8000, 500, Wrap::Never);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len, 192);
    }

    #[test]
    fn test_segment_bytes() {
        let data = [1u8, 2, 3, 4, 5];
        let segment = Segment {
            addr: Address::ZERO,
            offset: 1,
            len: 3,
            erase_first: false,
        };
        assert_eq!(segment.bytes(&data), &[2, 3, 4]);
    }

    #[test]
    fn test_empty_write_has_no_segments() {
        let capacity = cap(8192, 4096);
        assert!(plan(ErasePolicy::fresh(capacity), 0, 0, Wrap::Around).is_empty());
    }
}
