//! Raw chip driver seam.

use core::fmt;

use crate::domain::Capacity;

/// JEDEC id of the Winbond W25Q32.
pub const W25Q32_JEDEC_ID: u32 = 0xEF4016;

/// A serial NOR chip, driven one primitive at a time.
///
/// Implementations talk to the hardware (or a simulation of it) and do not
/// lock, range-check or track readiness; [`Flash`](super::Flash) does that.
/// Addresses are relative to the start of the managed region.
///
/// NOR semantics are part of the contract: `erase_sector` and `erase_all`
/// set every affected bit to 1, and `program` can only clear bits, so
/// programming over non-erased data yields the bitwise AND of old and new.
#[allow(async_fn_in_trait)]
pub trait FlashDevice {
    /// Error reported by the chip or its bus.
    type Error: fmt::Debug + fmt::Display;

    /// Geometry of the managed region.
    fn capacity(&self) -> Capacity;

    /// Read the JEDEC identification (manufacturer, type, capacity code).
    async fn identify(&mut self) -> Result<u32, Self::Error>;

    /// Read `buf.len()` bytes starting at `addr`.
    async fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Program `data` at `addr`.
    async fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Erase the sector starting at the sector-aligned `addr`.
    async fn erase_sector(&mut self, addr: u32) -> Result<(), Self::Error>;

    /// Erase the whole region.
    async fn erase_all(&mut self) -> Result<(), Self::Error>;
}

impl<T: FlashDevice> FlashDevice for &mut T {
    type Error = T::Error;

    fn capacity(&self) -> Capacity {
        (**self).capacity()
    }

    async fn identify(&mut self) -> Result<u32, Self::Error> {
        (**self).identify().await
    }

    async fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        (**self).read(addr, buf).await
    }

    async fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error> {
        (**self).program(addr, data).await
    }

    async fn erase_sector(&mut self, addr: u32) -> Result<(), Self::Error> {
        (**self).erase_sector(addr).await
    }

    async fn erase_all(&mut self) -> Result<(), Self::Error> {
        (**self).erase_all().await
    }
}
