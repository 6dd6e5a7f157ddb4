//! Value objects for the domain layer.
//!
//! Value objects are immutable, validated data types that represent
//! concepts in the flash address space. They keep byte offsets, sector
//! indices and device geometry from being mixed up as bare integers.

mod address;
mod capacity;
mod sector;

pub use address::Address;
pub use capacity::{Capacity, CapacityError, PAGE_SIZE, SECTOR_SIZE_4K};
pub use sector::SectorIndex;
