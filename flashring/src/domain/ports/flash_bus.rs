//! FlashBus port - Secondary (driven) port for byte-addressed flash I/O.
//!
//! This port defines what the domain needs from the adapter layer. Every
//! method is exactly one primitive transaction on the shared bus; the port
//! never composes several primitives under one lock.

use crate::domain::{
    error::FlashError,
    value_objects::{Address, Capacity},
};
use core::fmt;

/// Port for primitive flash operations on a shared bus.
///
/// ```text
/// ┌─────────────────────┐
/// │   Domain Layer      │
/// │ (RingAllocator)     │
/// └──────────┬──────────┘
///            │ depends on
///            ▼
/// ┌─────────────────────┐
/// │   FlashBus Port     │  ◄── This trait
/// └──────────┬──────────┘
///            │ implemented by
///            ▼
/// ┌─────────────────────┐
/// │  Adapter Layer      │
/// │  (Flash<D>)         │
/// └─────────────────────┘
/// ```
///
/// Methods take `&self`: implementations serialize access internally, so
/// several composite operations may interleave at primitive granularity.
#[allow(async_fn_in_trait)]
pub trait FlashBus {
    /// Error type reported by the underlying device.
    type Error: fmt::Debug + fmt::Display;

    /// Device geometry.
    fn capacity(&self) -> Capacity;

    /// Read `dest.len()` bytes starting at `addr`.
    async fn read(&self, addr: Address, dest: &mut [u8]) -> Result<(), FlashError<Self::Error>>;

    /// Program `src` at `addr`.
    ///
    /// The destination must have been erased since it was last written.
    /// Otherwise the result is the bitwise AND of old and new content and
    /// no error is reported.
    async fn program(&self, addr: Address, src: &[u8]) -> Result<(), FlashError<Self::Error>>;

    /// Reset the whole sector containing `addr` to 0xFF.
    async fn erase_sector(&self, addr: Address) -> Result<(), FlashError<Self::Error>>;
}
