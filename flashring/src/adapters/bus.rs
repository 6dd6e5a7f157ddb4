//! Bus-locked device adapter.
//!
//! [`Flash`] owns the raw device behind a single async mutex. Every public
//! operation acquires the lock for exactly one primitive, so composite work
//! (range erases, ring writes, exports) interleaves with other callers at
//! primitive granularity.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use async_lock::Mutex;

use super::FlashDevice;
use crate::domain::{
    ports::FlashBus, Address, AddressGuard, Capacity, FlashError, PAGE_SIZE,
};

const UNINIT: u8 = 0;
const READY: u8 = 1;
const FAILED: u8 = 2;

/// Chip identification and geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipInfo {
    /// JEDEC id, e.g. `0xEF4016` for a W25Q32.
    pub chip_id: u32,
    /// Managed region geometry.
    pub capacity: Capacity,
    /// Number of 256-byte program pages.
    pub page_count: u32,
}

impl fmt::Display for ChipInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chip 0x{:06X}, {} bytes, {} pages of {}, {} sectors of {}",
            self.chip_id,
            self.capacity.total_bytes(),
            self.page_count,
            PAGE_SIZE,
            self.capacity.sector_count(),
            self.capacity.sector_size()
        )
    }
}

/// Progress of a multi-step operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Progress {
    /// Units completed so far.
    pub done: u32,
    /// Total units.
    pub total: u32,
}

impl Progress {
    /// Completion in whole percent.
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        ((self.done as u64 * 100) / self.total as u64) as u32
    }
}

/// A flash device shared through one bus lock.
///
/// Nothing but [`begin`](Self::begin) works until bring-up has succeeded. A
/// failed bring-up is latched: from then on every call, including `begin`,
/// reports [`FlashError::NotReady`].
///
/// # Example
///
/// ```
/// # block_on(async {
/// use flashring::adapters::{Flash, MemFlash};
/// use flashring::domain::{Address, Capacity};
///
/// let flash = Flash::new(MemFlash::new(Capacity::new(8192, 4096).unwrap()));
/// flash.begin().await.unwrap();
///
/// flash.erase_sector(Address::new(0)).await.unwrap();
/// flash.program(Address::new(0), b"hello").await.unwrap();
///
/// let mut buf = [0u8; 5];
/// flash.read(Address::new(0), &mut buf).await.unwrap();
/// assert_eq!(&buf, b"hello");
/// # });
/// # fn block_on<F: core::future::Future>(f: F) -> F::Output {
/// #     futures::executor::block_on(f)
/// # }
/// ```
pub struct Flash<D> {
    device: Mutex<D>,
    guard: AddressGuard,
    state: AtomicU8,
}

impl<D: FlashDevice> Flash<D> {
    /// Wrap a raw device. Call [`begin`](Self::begin) before anything else.
    pub fn new(device: D) -> Self {
        let guard = AddressGuard::new(device.capacity());
        Self {
            device: Mutex::new(device),
            guard,
            state: AtomicU8::new(UNINIT),
        }
    }

    /// Device geometry.
    #[inline]
    pub fn capacity(&self) -> Capacity {
        self.guard.capacity()
    }

    /// Whether bring-up has succeeded.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Whether bring-up has failed. The adapter never recovers from this.
    #[inline]
    pub fn has_failed(&self) -> bool {
        self.state.load(Ordering::Acquire) == FAILED
    }

    /// Identify the chip and mark the adapter ready.
    pub async fn begin(&self) -> Result<ChipInfo, FlashError<D::Error>> {
        if self.has_failed() {
            return Err(FlashError::NotReady);
        }
        let result = self.device.lock().await.identify().await;
        match result {
            Ok(chip_id) => {
                self.state.store(READY, Ordering::Release);
                let info = self.chip_info(chip_id);
                info!("Flash ready: id {}, {} bytes", chip_id, info.capacity.total_bytes());
                Ok(info)
            }
            Err(e) => {
                self.state.store(FAILED, Ordering::Release);
                error!("Flash bring-up failed");
                Err(FlashError::IdentifyFailure(e))
            }
        }
    }

    /// Read the chip id and report the geometry.
    pub async fn identify(&self) -> Result<ChipInfo, FlashError<D::Error>> {
        self.ensure_ready()?;
        let chip_id = self
            .device
            .lock()
            .await
            .identify()
            .await
            .map_err(FlashError::IdentifyFailure)?;
        Ok(self.chip_info(chip_id))
    }

    /// Read `buf.len()` bytes at `addr`.
    pub async fn read(&self, addr: Address, buf: &mut [u8]) -> Result<(), FlashError<D::Error>> {
        self.ensure_ready()?;
        self.guard.check(addr.value(), buf.len())?;
        self.device
            .lock()
            .await
            .read(addr.value(), buf)
            .await
            .map_err(|source| FlashError::ReadFailure { addr, source })
    }

    /// Program `data` at `addr`.
    ///
    /// The range must have been erased since it was last written. This is not
    /// checked: programming over old data silently stores the bitwise AND.
    pub async fn program(&self, addr: Address, data: &[u8]) -> Result<(), FlashError<D::Error>> {
        self.ensure_ready()?;
        self.guard.check(addr.value(), data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        self.device
            .lock()
            .await
            .program(addr.value(), data)
            .await
            .map_err(|source| FlashError::ProgramFailure { addr, source })
    }

    /// Erase the sector containing `addr`.
    pub async fn erase_sector(&self, addr: Address) -> Result<(), FlashError<D::Error>> {
        self.ensure_ready()?;
        self.guard.check_addr(addr.value())?;
        let sector = self.capacity().align_down(addr);
        self.erase_one(sector, 0).await
    }

    /// Erase every sector intersecting the inclusive range `[start, end]`.
    ///
    /// Each sector takes the bus lock on its own and `progress` is called
    /// after each one. Returns the number of sectors erased. On failure the
    /// error carries the failing sector and how many were erased before it.
    pub async fn erase_range(
        &self,
        start: u32,
        end: u32,
        mut progress: impl FnMut(Progress),
    ) -> Result<u32, FlashError<D::Error>> {
        self.ensure_ready()?;
        if self.guard.check_inclusive(start, end)?.is_none() {
            return Err(FlashError::InvalidArgument("range start is after its end"));
        }

        let capacity = self.capacity();
        let first_sector = capacity.sector_of(Address::new(start)).value();
        let last_sector = capacity.sector_of(Address::new(end)).value();
        let total = last_sector - first_sector + 1;

        for (done, index) in (first_sector..=last_sector).enumerate() {
            let addr = capacity.sector_start(index.into());
            self.erase_one(addr, done as u32).await?;
            progress(Progress {
                done: done as u32 + 1,
                total,
            });
        }
        debug!("Erased {} sector(s) from {}", total, start);
        Ok(total)
    }

    /// Erase the whole device.
    pub async fn erase_all(&self) -> Result<(), FlashError<D::Error>> {
        self.ensure_ready()?;
        warn!("Erasing entire chip");
        self.device
            .lock()
            .await
            .erase_all()
            .await
            .map_err(|source| FlashError::EraseFailure {
                addr: Address::ZERO,
                completed: 0,
                source,
            })
    }

    /// Run `f` with exclusive access to the raw device.
    ///
    /// Holds the bus lock for the duration of `f`.
    pub async fn with_device<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        let mut device = self.device.lock().await;
        f(&mut device)
    }

    /// Consume the adapter and return the raw device.
    pub fn into_inner(self) -> D {
        self.device.into_inner()
    }

    fn ensure_ready(&self) -> Result<(), FlashError<D::Error>> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(FlashError::NotReady)
        }
    }

    async fn erase_one(&self, sector: Address, completed: u32) -> Result<(), FlashError<D::Error>> {
        self.device
            .lock()
            .await
            .erase_sector(sector.value())
            .await
            .map_err(|source| FlashError::EraseFailure {
                addr: sector,
                completed,
                source,
            })
    }

    fn chip_info(&self, chip_id: u32) -> ChipInfo {
        let capacity = self.capacity();
        ChipInfo {
            chip_id,
            capacity,
            page_count: capacity.page_count(),
        }
    }
}

impl<D: FlashDevice> FlashBus for Flash<D> {
    type Error = D::Error;

    fn capacity(&self) -> Capacity {
        Flash::capacity(self)
    }

    async fn read(&self, addr: Address, dest: &mut [u8]) -> Result<(), FlashError<D::Error>> {
        Flash::read(self, addr, dest).await
    }

    async fn program(&self, addr: Address, src: &[u8]) -> Result<(), FlashError<D::Error>> {
        Flash::program(self, addr, src).await
    }

    async fn erase_sector(&self, addr: Address) -> Result<(), FlashError<D::Error>> {
        Flash::erase_sector(self, addr).await
    }
}

impl<D> fmt::Debug for Flash<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flash")
            .field("capacity", &self.guard.capacity())
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
