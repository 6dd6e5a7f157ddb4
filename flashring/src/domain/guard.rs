//! Address-space guard.
//!
//! Pure validation of byte ranges against the device capacity. Higher layers
//! call it before every adapter call and the adapter calls it again before
//! touching the bus.

use crate::domain::{
    error::OutOfRange,
    value_objects::{Address, Capacity},
};

/// Bounds checker for requests against a fixed [`Capacity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressGuard {
    capacity: Capacity,
}

impl AddressGuard {
    /// Create a guard for the given geometry.
    pub const fn new(capacity: Capacity) -> Self {
        Self { capacity }
    }

    /// The geometry this guard enforces.
    #[inline]
    pub const fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Validate the half-open range `[addr, addr + len)`.
    ///
    /// A zero-length range is accepted only when `addr` itself is inside
    /// the device.
    ///
    /// # Examples
    ///
    /// ```
    /// use flashring::domain::{AddressGuard, Capacity};
    ///
    /// let guard = AddressGuard::new(Capacity::new(4096, 4096).unwrap());
    /// assert!(guard.check(0, 4096).is_ok());
    /// assert!(guard.check(4090, 7).is_err());
    /// ```
    pub const fn check(&self, addr: u32, len: usize) -> Result<Address, OutOfRange> {
        let in_range = if len == 0 {
            self.capacity.contains(Address::new(addr))
        } else {
            self.capacity.fits(addr, len)
        };
        if in_range {
            Ok(Address::new(addr))
        } else {
            Err(self.reject(addr, len))
        }
    }

    /// Validate that `addr` names a byte inside the device.
    pub const fn check_addr(&self, addr: u32) -> Result<Address, OutOfRange> {
        self.check(addr, 1)
    }

    /// Validate the inclusive range `[start, end]` and return its length.
    ///
    /// Returns `Ok(None)` when `start > end`, which callers treat as a
    /// malformed request rather than a range violation.
    pub const fn check_inclusive(
        &self,
        start: u32,
        end: u32,
    ) -> Result<Option<(Address, usize)>, OutOfRange> {
        if start > end {
            return Ok(None);
        }
        let len = (end - start) as usize + 1;
        match self.check(start, len) {
            Ok(addr) => Ok(Some((addr, len))),
            Err(e) => Err(e),
        }
    }

    const fn reject(&self, addr: u32, len: usize) -> OutOfRange {
        OutOfRange {
            addr,
            len,
            capacity: self.capacity.total_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> AddressGuard {
        AddressGuard::new(Capacity::new(16 * 1024, 4096).unwrap())
    }

    #[test]
    fn test_accepts_ranges_inside_capacity() {
        let guard = guard();
        assert_eq!(guard.check(0, 1), Ok(Address::new(0)));
        assert_eq!(guard.check(0x3F00, 0x100), Ok(Address::new(0x3F00)));
        assert!(guard.check_addr(0x3FFF).is_ok());
    }

    #[test]
    fn test_rejects_overflowing_ranges() {
        let guard = guard();
        let err = guard.check(0x3F01, 0x100).unwrap_err();
        assert_eq!(err.addr, 0x3F01);
        assert_eq!(err.len, 0x100);
        assert_eq!(err.capacity, 16 * 1024);

        assert!(guard.check_addr(0x4000).is_err());
        assert!(guard.check(u32::MAX, 2).is_err());
    }

    #[test]
    fn test_zero_length_needs_valid_address() {
        let guard = guard();
        assert!(guard.check(0x100, 0).is_ok());
        assert!(guard.check(0x4000, 0).is_err());
    }

    #[test]
    fn test_inclusive_range() {
        let guard = guard();
        assert_eq!(
            guard.check_inclusive(0x2000, 0x20FF),
            Ok(Some((Address::new(0x2000), 256)))
        );
        assert_eq!(guard.check_inclusive(0x10, 0x0F), Ok(None));
        assert!(guard.check_inclusive(0x3000, 0x4000).is_err());
    }
}
