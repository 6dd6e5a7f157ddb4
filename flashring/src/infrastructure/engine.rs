//! The storage engine: one owned object tying the layers together.

use async_lock::RwLock;

use crate::{
    adapters::{ChipInfo, Flash, FlashDevice, Progress},
    domain::{
        Address, AddressGuard, Capacity, ErasePolicy, FlashError, RingAllocator, RingBufferState,
        RingPhase, Wrap,
    },
    infrastructure::{export::Export, stream::FlashReader},
};

/// Longest string accepted by [`FlashEngine::write_str`].
pub const MAX_STR_LEN: usize = 256;

const STR_PREFIX: usize = 2;

/// Flash-backed append-only storage.
///
/// Owns the bus-locked device, the ring allocator and a write gate.
/// Collaborators share it by reference or `Arc`; there is no global state.
///
/// Every mutation (ring writes and the direct write, program and erase
/// passthroughs) holds the gate shared. [`export`](Self::export) and
/// [`pause_and_drain`](Self::pause_and_drain) take it exclusively, which waits
/// for in-flight writers and keeps new ones from starting.
///
/// # Example
///
/// ```
/// # futures::executor::block_on(async {
/// use flashring::adapters::MemFlash;
/// use flashring::domain::{Address, Capacity};
/// use flashring::FlashEngine;
///
/// let engine = FlashEngine::new(MemFlash::new(Capacity::new(4096, 4096).unwrap()));
/// engine.bring_up().await.unwrap();
///
/// engine.write(0, b"hello").await.unwrap();
/// let mut buf = [0u8; 5];
/// engine.read(0, &mut buf).await.unwrap();
/// assert_eq!(&buf, b"hello");
///
/// engine.ring_init().await.unwrap();
/// assert_eq!(engine.ring_write(b"log").await.unwrap(), Address::ZERO);
/// # });
/// ```
pub struct FlashEngine<D> {
    flash: Flash<D>,
    ring: RingAllocator,
    guard: AddressGuard,
    gate: RwLock<()>,
}

impl<D: FlashDevice> FlashEngine<D> {
    /// Build an engine around a raw device. Call
    /// [`bring_up`](Self::bring_up) before anything else.
    pub fn new(device: D) -> Self {
        let flash = Flash::new(device);
        let capacity = flash.capacity();
        Self {
            flash,
            ring: RingAllocator::new(capacity),
            guard: AddressGuard::new(capacity),
            gate: RwLock::new(()),
        }
    }

    /// Device geometry.
    #[inline]
    pub fn capacity(&self) -> Capacity {
        self.guard.capacity()
    }

    /// The bus-locked adapter.
    #[inline]
    pub fn flash(&self) -> &Flash<D> {
        &self.flash
    }

    /// Identify the chip. A failure here is permanent.
    pub async fn bring_up(&self) -> Result<ChipInfo, FlashError<D::Error>> {
        self.flash.begin().await
    }

    /// Chip id and geometry.
    pub async fn info(&self) -> Result<ChipInfo, FlashError<D::Error>> {
        self.flash.identify().await
    }

    /// Read `buf.len()` bytes at `addr`.
    pub async fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError<D::Error>> {
        let addr = self.guard.check(addr, buf.len())?;
        self.flash.read(addr, buf).await
    }

    /// Read the inclusive range `[start, end]` into the front of `buf`.
    ///
    /// Returns the number of bytes read.
    pub async fn read_range(
        &self,
        start: u32,
        end: u32,
        buf: &mut [u8],
    ) -> Result<usize, FlashError<D::Error>> {
        let (addr, len) = self
            .guard
            .check_inclusive(start, end)?
            .ok_or(FlashError::InvalidArgument("range start is after its end"))?;
        let dest = buf
            .get_mut(..len)
            .ok_or(FlashError::InvalidArgument("range larger than buffer"))?;
        self.flash.read(addr, dest).await?;
        Ok(len)
    }

    /// Erase the sector(s) under `[addr, addr + data.len())`, then program
    /// `data` there.
    ///
    /// The first sector is erased even when `addr` is mid-sector, so any
    /// neighbouring data in it is lost.
    pub async fn write(&self, addr: u32, data: &[u8]) -> Result<(), FlashError<D::Error>> {
        let _gate = self.gate.read().await;
        let addr = self.guard.check(addr, data.len())?;

        for segment in ErasePolicy::fresh(self.capacity()).segments(addr, data.len(), Wrap::Never) {
            if segment.erase_first {
                self.flash.erase_sector(segment.addr).await?;
            }
            self.flash.program(segment.addr, segment.bytes(data)).await?;
        }
        debug!("Wrote {} bytes at {}", data.len(), addr);
        Ok(())
    }

    /// Program `data` at `addr` without erasing first.
    pub async fn program(&self, addr: u32, data: &[u8]) -> Result<(), FlashError<D::Error>> {
        let _gate = self.gate.read().await;
        let addr = self.guard.check(addr, data.len())?;
        self.flash.program(addr, data).await
    }

    /// Store `s` as a length-prefixed string record at `addr`.
    ///
    /// The record is a little-endian `u16` length followed by the bytes. It
    /// goes through [`write`](Self::write), so its first sector is erased.
    /// Returns the number of bytes stored, prefix included.
    pub async fn write_str(&self, addr: u32, s: &str) -> Result<usize, FlashError<D::Error>> {
        let bytes = s.as_bytes();
        if bytes.len() > MAX_STR_LEN {
            return Err(FlashError::InvalidArgument("string longer than 256 bytes"));
        }
        let mut record = [0u8; STR_PREFIX + MAX_STR_LEN];
        record[..STR_PREFIX].copy_from_slice(&(bytes.len() as u16).to_le_bytes());
        record[STR_PREFIX..STR_PREFIX + bytes.len()].copy_from_slice(bytes);

        let len = STR_PREFIX + bytes.len();
        self.write(addr, &record[..len]).await?;
        Ok(len)
    }

    /// Read a string record written by [`write_str`](Self::write_str).
    ///
    /// The returned bytes stop at the first NUL. An erased, zero or
    /// oversized prefix reports [`FlashError::NoData`].
    pub async fn read_str<'b>(
        &self,
        addr: u32,
        buf: &'b mut [u8],
    ) -> Result<&'b [u8], FlashError<D::Error>> {
        let mut prefix = [0u8; STR_PREFIX];
        self.read(addr, &mut prefix).await?;
        let len = u16::from_le_bytes(prefix) as usize;

        let no_data = FlashError::NoData {
            addr: Address::new(addr),
        };
        if len == 0 || len == 0xFFFF || len > MAX_STR_LEN || len > buf.len() {
            return Err(no_data);
        }

        let body = addr
            .checked_add(STR_PREFIX as u32)
            .ok_or(FlashError::InvalidArgument("address overflow"))?;
        let dest = &mut buf[..len];
        self.read(body, dest).await?;

        let end = dest.iter().position(|&b| b == 0).unwrap_or(len);
        Ok(&buf[..end])
    }

    /// Erase the sector containing `addr`.
    pub async fn erase_sector(&self, addr: u32) -> Result<(), FlashError<D::Error>> {
        let _gate = self.gate.read().await;
        let addr = self.guard.check_addr(addr)?;
        self.flash.erase_sector(addr).await
    }

    /// Erase every sector intersecting `[start, end]`. See
    /// [`Flash::erase_range`].
    pub async fn erase_range(
        &self,
        start: u32,
        end: u32,
        progress: impl FnMut(Progress),
    ) -> Result<u32, FlashError<D::Error>> {
        let _gate = self.gate.read().await;
        self.flash.erase_range(start, end, progress).await
    }

    /// Erase the whole device.
    pub async fn erase_all(&self) -> Result<(), FlashError<D::Error>> {
        let _gate = self.gate.read().await;
        self.flash.erase_all().await
    }

    /// Recover the ring cursor from flash content.
    pub async fn ring_init(&self) -> Result<Address, FlashError<D::Error>> {
        self.ring.init(&self.flash).await
    }

    /// Append a record to the ring and return its start address.
    ///
    /// Returns [`FlashError::Rejected`] at once while paused, even if an
    /// export currently holds the device. See [`RingAllocator::write`] for
    /// records that wrap into their own starting sector.
    pub async fn ring_write(&self, data: &[u8]) -> Result<Address, FlashError<D::Error>> {
        if self.ring.is_paused() {
            return Err(FlashError::Rejected);
        }
        let _gate = self.gate.read().await;
        self.ring.write(&self.flash, data).await
    }

    /// Current ring cursor.
    pub async fn position(&self) -> Address {
        self.ring.position().await
    }

    /// Force the ring cursor to the sector containing `addr`.
    pub async fn set_position(&self, addr: u32) -> Result<Address, FlashError<D::Error>> {
        Ok(self.ring.set_position(addr).await?)
    }

    /// Move the ring cursor to 0. Erases nothing.
    pub async fn reset(&self) {
        self.ring.reset().await
    }

    /// Reject ring writes that have not started yet.
    pub fn pause(&self) {
        self.ring.pause()
    }

    /// Accept ring writes again.
    pub fn resume(&self) {
        self.ring.resume()
    }

    /// Whether ring writes are rejected.
    pub fn is_paused(&self) -> bool {
        self.ring.is_paused()
    }

    /// Ring lifecycle phase.
    pub async fn phase(&self) -> RingPhase {
        self.ring.phase().await
    }

    /// Copy of the ring state.
    pub async fn ring_state(&self) -> RingBufferState {
        self.ring.snapshot().await
    }

    /// Pause the ring and wait until no write is in flight.
    ///
    /// When this returns, every write that passed its pause check has
    /// finished, and later ring writes fail with [`FlashError::Rejected`].
    pub async fn pause_and_drain(&self) {
        self.ring.pause();
        let _drained = self.gate.write().await;
        info!("Ring paused and drained");
    }

    /// Start a full-device export in chunks of `chunk_size` bytes.
    ///
    /// Waits for in-flight writers, then holds writers off until the
    /// [`Export`] is dropped.
    pub async fn export(&self, chunk_size: usize) -> Result<Export<'_, D>, FlashError<D::Error>> {
        if chunk_size == 0 {
            return Err(FlashError::InvalidArgument("chunk size must be non-zero"));
        }
        let gate = self.gate.write().await;
        Ok(Export::new(&self.flash, gate, chunk_size))
    }

    /// A sequential reader over the whole device.
    ///
    /// Unlike [`export`](Self::export) it does not hold writers off, so a
    /// read that races a write may see part of it.
    pub fn reader(&self) -> FlashReader<'_, D> {
        FlashReader::new(&self.flash)
    }

    /// Consume the engine and return the raw device.
    pub fn into_inner(self) -> D {
        self.flash.into_inner()
    }
}

#[cfg(all(test, feature = "alloc"))]
mod tests {
    use super::*;
    use crate::adapters::MemFlash;
    use core::time::Duration;

    async fn engine(total: u32) -> FlashEngine<MemFlash> {
        let engine = FlashEngine::new(MemFlash::new(Capacity::new(total, 4096).unwrap()));
        engine.bring_up().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_hello_round_trip() {
        let engine = engine(4096).await;
        engine.write(0, b"hello").await.unwrap();

        let mut buf = [0u8; 5];
        engine.read(0, &mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        engine
            .flash()
            .with_device(|mem| assert_eq!(mem.stats().sector_erases, 1))
            .await;
    }

    #[tokio::test]
    async fn test_write_erases_enclosing_sector() {
        let engine = engine(8192).await;
        engine.write(0x1000, b"old neighbour").await.unwrap();
        engine.write(0x1100, b"new").await.unwrap();

        let mut buf = [0u8; 13];
        engine.read(0x1000, &mut buf).await.unwrap();
        assert!(buf.iter().all(|&b| b == 0xFF));
    }

    #[tokio::test]
    async fn test_write_out_of_range_touches_nothing() {
        let engine = engine(4096).await;
        let err = engine.write(4090, &[0; 10]).await.unwrap_err();
        assert!(matches!(err, FlashError::OutOfRange(_)));
        assert_eq!(engine.flash().with_device(|mem| mem.stats()).await.sector_erases, 0);
    }

    #[tokio::test]
    async fn test_read_range_inclusive() {
        let engine = engine(8192).await;
        engine.write(0x10, &[1, 2, 3, 4]).await.unwrap();

        let mut buf = [0u8; 256];
        assert_eq!(engine.read_range(0x11, 0x13, &mut buf).await.unwrap(), 3);
        assert_eq!(&buf[..3], &[2, 3, 4]);

        assert!(matches!(
            engine.read_range(0x13, 0x11, &mut buf).await,
            Err(FlashError::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.read_range(0, 0x1000, &mut buf).await,
            Err(FlashError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_string_records() {
        let engine = engine(8192).await;
        assert_eq!(engine.write_str(0x100, "sensor=42").await.unwrap(), 11);

        let mut buf = [0u8; MAX_STR_LEN];
        assert_eq!(engine.read_str(0x100, &mut buf).await.unwrap(), b"sensor=42");

        let err = engine.read_str(0x1000, &mut buf).await.unwrap_err();
        assert!(matches!(err, FlashError::NoData { .. }));

        let long = "x".repeat(257);
        assert!(matches!(
            engine.write_str(0, &long).await,
            Err(FlashError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_read_str_stops_at_nul() {
        let engine = engine(4096).await;
        engine.write(0, &[5, 0, b'a', b'b', 0, b'c', b'd']).await.unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(engine.read_str(0, &mut buf).await.unwrap(), b"ab");
    }

    #[tokio::test]
    async fn test_program_does_not_erase() {
        let engine = engine(4096).await;
        engine.write(0, &[0xF0]).await.unwrap();
        engine.program(0, &[0x0F]).await.unwrap();
        let mut buf = [0u8; 1];
        engine.read(0, &mut buf).await.unwrap();
        assert_eq!(buf[0], 0x00);
    }

    #[tokio::test]
    async fn test_ring_wraps_through_engine() {
        let engine = engine(4096).await;
        assert_eq!(engine.ring_init().await.unwrap(), Address::ZERO);
        engine.ring_write(&[0xAA; 4090]).await.unwrap();
        assert_eq!(engine.position().await, Address::new(4090));

        engine.ring_write(&[0x55; 10]).await.unwrap();
        assert_eq!(engine.position().await, Address::new(4));
    }

    #[tokio::test]
    async fn test_pause_and_drain_rejects_later_writes() {
        let engine = engine(4096).await;
        engine.reset().await;
        engine.pause_and_drain().await;
        assert!(engine.is_paused());
        assert!(matches!(
            engine.ring_write(b"late").await,
            Err(FlashError::Rejected)
        ));
        engine.resume();
        assert_eq!(engine.phase().await, RingPhase::Ready);
    }

    #[tokio::test]
    async fn test_paused_write_does_not_wait_for_export() {
        let engine = engine(8192).await;
        engine.ring_init().await.unwrap();
        let _export = engine.export(256).await.unwrap();
        engine.pause();

        let result = tokio::time::timeout(Duration::from_millis(300), engine.ring_write(b"x")).await;
        assert!(matches!(result, Ok(Err(FlashError::Rejected))));
        assert_eq!(engine.flash().with_device(|mem| mem.stats()).await.programs, 0);
    }

    #[tokio::test]
    async fn test_set_position_out_of_range() {
        let engine = engine(4096).await;
        assert!(matches!(
            engine.set_position(0x1000).await,
            Err(FlashError::OutOfRange(_))
        ));
    }
}
