//! Ring allocator.
//!
//! Appends records at a single write cursor, wrapping to address 0 when the
//! device is full and overwriting the oldest data. The allocator owns only
//! volatile state; every call takes the bus it should drive.

use core::sync::atomic::{AtomicBool, Ordering};

use async_lock::Mutex;

use crate::domain::{
    entities::{RingBufferState, RingPhase},
    erase_policy::{ErasePolicy, Wrap},
    error::{FlashError, OutOfRange},
    frontier::{is_erased, FrontierScan, PROBE_LEN},
    guard::AddressGuard,
    ports::FlashBus,
    value_objects::{Address, Capacity, SectorIndex},
};

/// Circular append allocator over a [`FlashBus`].
///
/// The state lock is held for the whole of [`write`](Self::write), so ring
/// writers are serialized over the cursor but may still interleave with other
/// bus users at primitive granularity. The pause flag lives outside that lock
/// and can be flipped while a write is running.
#[derive(Debug)]
pub struct RingAllocator {
    capacity: Capacity,
    state: Mutex<RingBufferState>,
    paused: AtomicBool,
    scanning: AtomicBool,
}

impl RingAllocator {
    /// Create an uninitialized allocator for `capacity`.
    pub fn new(capacity: Capacity) -> Self {
        Self {
            capacity,
            state: Mutex::new(RingBufferState::new()),
            paused: AtomicBool::new(false),
            scanning: AtomicBool::new(false),
        }
    }

    /// Geometry the allocator wraps over.
    #[inline]
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Recover the cursor by scanning flash content.
    ///
    /// Probes the first bytes of every sector, one bus transaction each. If a
    /// probe fails the state is left as it was and the error is returned.
    pub async fn init<B: FlashBus>(&self, bus: &B) -> Result<Address, FlashError<B::Error>> {
        let mut state = self.state.lock().await;
        self.scanning.store(true, Ordering::Release);
        let result = self.scan(bus).await;
        self.scanning.store(false, Ordering::Release);

        let cursor = result?;
        state.place(cursor);
        info!("Ring initialized, cursor at {}", cursor);
        Ok(cursor)
    }

    async fn scan<B: FlashBus>(&self, bus: &B) -> Result<Address, FlashError<B::Error>> {
        let mut scan = FrontierScan::new(self.capacity);
        let mut probe = [0u8; PROBE_LEN];
        let probe = &mut probe[..scan.probe_len()];

        for index in 0..self.capacity.sector_count() {
            let sector = SectorIndex::new(index);
            bus.read(self.capacity.sector_start(sector), probe).await?;
            if let Some(frontier) = scan.feed(sector, is_erased(probe)) {
                debug!("Frontier found at sector {}", index);
                return Ok(frontier);
            }
        }

        let cursor = scan.finish();
        if cursor != Address::ZERO {
            warn!("No erased gap found, resuming at {}", cursor);
        }
        Ok(cursor)
    }

    /// Append `data` at the cursor and return the address it starts at.
    ///
    /// The record is split at sector boundaries; each sector is erased when
    /// the cursor enters it. A failure aborts the write and leaves the cursor
    /// after the last segment that was committed.
    ///
    /// The pause flag is checked on entry and again once the state lock is
    /// held, so a paused write never waits behind a running one.
    ///
    /// # Overwriting its own head
    ///
    /// A record may be as long as the whole device. If it starts mid-sector
    /// and wraps back into its starting sector, that sector is erased again
    /// when the cursor re-enters it, so the first bytes of the record read
    /// back as 0xFF even though the write returns `Ok`. Keep records shorter
    /// than `capacity - sector_size` to rule this out.
    ///
    /// # Errors
    ///
    /// - [`FlashError::Rejected`] when paused
    /// - [`FlashError::NotInitialized`] before [`init`](Self::init),
    ///   [`reset`](Self::reset) or [`set_position`](Self::set_position)
    /// - [`FlashError::InvalidArgument`] when `data` is longer than the device
    ///
    /// None of these touch the bus.
    pub async fn write<B: FlashBus>(
        &self,
        bus: &B,
        data: &[u8],
    ) -> Result<Address, FlashError<B::Error>> {
        if self.is_paused() {
            return Err(FlashError::Rejected);
        }
        let mut state = self.state.lock().await;

        // a pause may have landed while this writer was queued
        if self.is_paused() {
            return Err(FlashError::Rejected);
        }
        if !state.is_initialized() {
            return Err(FlashError::NotInitialized);
        }
        if data.len() > self.capacity.total_bytes() as usize {
            return Err(FlashError::InvalidArgument("record longer than device"));
        }

        let start = state.cursor();
        let segments = ErasePolicy::resuming_at(self.capacity, start).segments(
            start,
            data.len(),
            Wrap::Around,
        );

        for segment in segments {
            if segment.erase_first {
                trace!("Erasing sector at {}", segment.addr);
                bus.erase_sector(segment.addr).await?;
            }
            bus.program(segment.addr, segment.bytes(data)).await?;
            state.advance_to(self.capacity.advance(segment.addr, segment.len as u32));
        }

        trace!("Ring write of {} bytes at {}", data.len(), start);
        Ok(start)
    }

    /// Current cursor.
    pub async fn position(&self) -> Address {
        self.state.lock().await.cursor()
    }

    /// Move the cursor to the start of the sector containing `addr`.
    ///
    /// Marks the ring initialized without scanning. Nothing is erased.
    pub async fn set_position(&self, addr: u32) -> Result<Address, OutOfRange> {
        let addr = AddressGuard::new(self.capacity).check_addr(addr)?;
        let cursor = self.capacity.align_down(addr);
        self.state.lock().await.place(cursor);
        info!("Ring cursor set to {}", cursor);
        Ok(cursor)
    }

    /// Move the cursor to 0 and mark the ring initialized. Nothing is erased.
    pub async fn reset(&self) {
        self.state.lock().await.place(Address::ZERO);
        info!("Ring reset");
    }

    /// Reject writes that have not yet started.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Accept writes again.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    /// Whether writes are currently rejected.
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> RingPhase {
        if self.scanning.load(Ordering::Acquire) {
            return RingPhase::Scanning;
        }
        self.snapshot().await.phase()
    }

    /// Copy of the ring state.
    pub async fn snapshot(&self) -> RingBufferState {
        let mut state = *self.state.lock().await;
        state.set_paused(self.is_paused());
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{BusOp, MockBus};

    async fn ready(total: u32, sector: u32) -> (MockBus, RingAllocator) {
        let bus = MockBus::new(total, sector);
        let ring = RingAllocator::new(bus.capacity());
        ring.init(&bus).await.unwrap();
        bus.clear_ops();
        (bus, ring)
    }

    #[tokio::test]
    async fn test_init_on_empty_device() {
        let bus = MockBus::new(4 * 4096, 4096);
        let ring = RingAllocator::new(bus.capacity());
        assert_eq!(ring.phase().await, RingPhase::Uninitialized);

        assert_eq!(ring.init(&bus).await.unwrap(), Address::ZERO);
        assert_eq!(ring.phase().await, RingPhase::Ready);

        let probes: Vec<_> = bus.ops();
        assert_eq!(probes.len(), 4);
        assert_eq!(probes[3], BusOp::Read(3 * 4096, 256));
    }

    #[tokio::test]
    async fn test_init_finds_frontier() {
        let bus = MockBus::new(4 * 4096, 4096);
        bus.preload(0, &[0x00; 10]);
        bus.preload(4096, &[0x42]);
        let ring = RingAllocator::new(bus.capacity());

        assert_eq!(ring.init(&bus).await.unwrap(), Address::new(0x2000));
        // scan stops at the frontier
        assert_eq!(bus.ops().len(), 3);
    }

    #[tokio::test]
    async fn test_write_before_init() {
        let bus = MockBus::new(4096, 4096);
        let ring = RingAllocator::new(bus.capacity());
        let err = ring.write(&bus, b"x").await.unwrap_err();
        assert!(matches!(err, FlashError::NotInitialized));
        assert!(bus.ops().is_empty());
    }

    #[tokio::test]
    async fn test_pause_rejects_without_bus_traffic() {
        let (bus, ring) = ready(4 * 4096, 4096).await;
        ring.write(&bus, b"abc").await.unwrap();
        bus.clear_ops();

        ring.pause();
        assert_eq!(ring.phase().await, RingPhase::Paused);
        let err = ring.write(&bus, b"def").await.unwrap_err();
        assert!(matches!(err, FlashError::Rejected));
        assert!(bus.ops().is_empty());
        assert_eq!(ring.position().await, Address::new(3));

        ring.resume();
        assert_eq!(ring.write(&bus, b"def").await.unwrap(), Address::new(3));
    }

    #[tokio::test]
    async fn test_pause_checked_before_init() {
        let bus = MockBus::new(4096, 4096);
        let ring = RingAllocator::new(bus.capacity());
        ring.pause();
        let err = ring.write(&bus, b"x").await.unwrap_err();
        assert!(matches!(err, FlashError::Rejected));
    }

    #[tokio::test]
    async fn test_erase_once_per_entry() {
        let (bus, ring) = ready(4 * 4096, 4096).await;

        ring.write(&bus, &[1; 100]).await.unwrap();
        ring.write(&bus, &[2; 100]).await.unwrap();
        assert_eq!(bus.erases(), vec![0]);

        ring.write(&bus, &[3; 4000]).await.unwrap();
        assert_eq!(bus.erases(), vec![0, 4096]);
        assert_eq!(bus.bytes(0, 1), vec![1]);
        assert_eq!(bus.bytes(100, 1), vec![2]);
        assert_eq!(ring.position().await, Address::new(4200));
    }

    #[tokio::test]
    async fn test_cursor_arithmetic_wraps() {
        let (bus, ring) = ready(2 * 4096, 4096).await;
        let mut total = 0u32;
        for _ in 0..7 {
            ring.write(&bus, &[0xA5; 1500]).await.unwrap();
            total += 1500;
        }
        assert_eq!(ring.position().await, Address::new(total % 8192));
    }

    #[tokio::test]
    async fn test_wrap_overwrites_oldest() {
        let (bus, ring) = ready(4096, 4096).await;
        ring.write(&bus, b"hello").await.unwrap();
        ring.write(&bus, &[0x11; 4085]).await.unwrap();
        assert_eq!(ring.position().await, Address::new(4090));

        let data: Vec<u8> = (0..10).collect();
        assert_eq!(ring.write(&bus, &data).await.unwrap(), Address::new(4090));
        assert_eq!(ring.position().await, Address::new(4));
        assert_eq!(bus.erases(), vec![0, 0]);
        assert_eq!(bus.bytes(0, 4), data[6..10].to_vec());
        assert_eq!(bus.bytes(4, 1), vec![0xFF]);
    }

    #[tokio::test]
    async fn test_failed_segment_keeps_committed_prefix() {
        let (bus, ring) = ready(4 * 4096, 4096).await;
        ring.set_position(0x1000).await.unwrap();
        ring.write(&bus, &[7; 4000]).await.unwrap();
        bus.fail_program_at(0x2000);

        let err = ring.write(&bus, &[8; 200]).await.unwrap_err();
        assert!(matches!(err, FlashError::ProgramFailure { .. }));
        assert_eq!(ring.position().await, Address::new(0x2000));
        assert_eq!(bus.bytes(0x1FFF, 1), vec![8]);
    }

    #[tokio::test]
    async fn test_erase_failure_mid_record() {
        let (bus, ring) = ready(4 * 4096, 4096).await;
        ring.write(&bus, &[5; 4000]).await.unwrap();
        bus.fail_erase_at(0x1000);

        let err = ring.write(&bus, &[6; 300]).await.unwrap_err();
        match err {
            FlashError::EraseFailure { addr, .. } => assert_eq!(addr, Address::new(0x1000)),
            other => panic!("unexpected error: {other}"),
        }
        // the tail of sector 0 was programmed before the failing erase
        assert_eq!(bus.bytes(4000, 96), vec![6; 96]);
        assert_eq!(ring.position().await, Address::new(0x1000));
        assert_eq!(bus.erases(), vec![0]);
    }

    #[tokio::test]
    async fn test_full_length_record_from_mid_sector_loses_head() {
        let (bus, ring) = ready(2 * 4096, 4096).await;
        ring.write(&bus, &[0; 100]).await.unwrap();

        let record = vec![0x3C; 8192];
        assert_eq!(ring.write(&bus, &record).await.unwrap(), Address::new(100));
        assert_eq!(ring.position().await, Address::new(100));
        // sector 0 was erased again on re-entry
        assert_eq!(bus.erases(), vec![0, 4096, 0]);
        assert_eq!(bus.bytes(100, 4), vec![0xFF; 4]);
        assert_eq!(bus.bytes(0, 100), vec![0x3C; 100]);
    }

    #[tokio::test]
    async fn test_oversized_record_rejected() {
        let (bus, ring) = ready(4096, 4096).await;
        let err = ring.write(&bus, &[0; 4097]).await.unwrap_err();
        assert!(matches!(err, FlashError::InvalidArgument(_)));
        assert!(bus.ops().is_empty());
    }

    #[tokio::test]
    async fn test_zero_length_write_is_noop() {
        let (bus, ring) = ready(4096, 4096).await;
        assert_eq!(ring.write(&bus, &[]).await.unwrap(), Address::ZERO);
        assert!(bus.ops().is_empty());
    }

    #[tokio::test]
    async fn test_set_position_aligns_down() {
        let bus = MockBus::new(4 * 4096, 4096);
        let ring = RingAllocator::new(bus.capacity());
        assert_eq!(ring.set_position(0x2ABC).await.unwrap(), Address::new(0x2000));
        assert_eq!(ring.phase().await, RingPhase::Ready);
        assert!(ring.set_position(0x4000).await.is_err());

        ring.reset().await;
        assert_eq!(ring.position().await, Address::ZERO);
        assert!(bus.ops().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_reports_flags() {
        let (_bus, ring) = ready(4096, 4096).await;
        ring.pause();
        let state = ring.snapshot().await;
        assert!(state.is_initialized());
        assert!(state.is_paused());
        assert_eq!(state.cursor(), Address::ZERO);
    }

    #[tokio::test]
    async fn test_pause_flag_lives_outside_locked_state() {
        let (_bus, ring) = ready(4096, 4096).await;
        ring.pause();
        assert!(!ring.state.lock().await.is_paused());
        assert!(ring.snapshot().await.is_paused());

        ring.resume();
        assert!(!ring.snapshot().await.is_paused());
    }
}
