//! Type-safe byte address value object.

use core::fmt;

/// A byte offset into the flash address space.
///
/// An `Address` carries no bound on its own; [`Capacity`](super::Capacity)
/// and the address-space guard decide whether it is in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(u32);

impl Address {
    /// The first byte of the device.
    pub const ZERO: Self = Self(0);

    /// Create a new address.
    ///
    /// # Examples
    ///
    /// ```
    /// use flashring::domain::Address;
    ///
    /// let addr = Address::new(0x1000);
    /// assert_eq!(addr.value(), 4096);
    /// ```
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the underlying u32 value.
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Add a byte offset, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, offset: u32) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Calculate the distance from `other` up to this address.
    #[inline]
    pub const fn offset_from(self, other: Self) -> u32 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Address {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "{=u32:#x}", self.0)
    }
}

impl From<u32> for Address {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Address> for u32 {
    fn from(addr: Address) -> Self {
        addr.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_is_padded_hex() {
        assert_eq!(format!("{}", Address::new(0x1000)), "0x00001000");
        assert_eq!(format!("{}", Address::new(0x3F_FFFF)), "0x003FFFFF");
    }

    #[test]
    fn test_address_checked_add() {
        assert_eq!(Address::new(10).checked_add(5), Some(Address::new(15)));
        assert_eq!(Address::new(u32::MAX).checked_add(1), None);
    }

    #[test]
    fn test_address_offset() {
        let a = Address::new(100);
        let b = Address::new(40);
        assert_eq!(a.offset_from(b), 60);
        assert_eq!(b.offset_from(a), 0); // saturating
    }
}
