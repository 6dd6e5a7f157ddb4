//! Bulk export of the whole device.

use async_lock::RwLockWriteGuard;

use crate::{
    adapters::{Flash, FlashDevice, Progress},
    domain::{Address, FlashError},
};

/// Bytes between progress reports.
pub const PROGRESS_INTERVAL: u32 = 64 * 1024;

/// One chunk produced by [`Export::next_chunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Device address of the first byte.
    pub addr: Address,
    /// Bytes placed at the front of the caller's buffer.
    pub len: usize,
    /// Set every 64 KiB and on the final chunk.
    pub progress: Option<Progress>,
}

/// Sequential chunked read over the full address range.
///
/// Created by [`FlashEngine::export`](super::FlashEngine::export). Each chunk
/// is its own bus transaction, but the export holds the engine's write gate
/// for as long as it lives, so no engine-routed write can land in between.
pub struct Export<'a, D> {
    flash: &'a Flash<D>,
    _gate: RwLockWriteGuard<'a, ()>,
    chunk_size: usize,
    next: u32,
    total: u32,
}

impl<'a, D: FlashDevice> Export<'a, D> {
    pub(crate) fn new(flash: &'a Flash<D>, gate: RwLockWriteGuard<'a, ()>, chunk_size: usize) -> Self {
        Self {
            flash,
            _gate: gate,
            chunk_size,
            next: 0,
            total: flash.capacity().total_bytes(),
        }
    }

    /// Total bytes the export will produce.
    #[inline]
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Bytes not yet produced.
    #[inline]
    pub fn remaining(&self) -> u32 {
        self.total - self.next
    }

    /// Read the next chunk into the front of `buf`.
    ///
    /// Returns `None` once the device has been covered. After an error the
    /// export is finished.
    pub async fn next_chunk(&mut self, buf: &mut [u8]) -> Option<Result<Chunk, FlashError<D::Error>>> {
        if self.next >= self.total {
            return None;
        }
        if buf.is_empty() {
            self.next = self.total;
            return Some(Err(FlashError::InvalidArgument("export buffer is empty")));
        }

        let len = self
            .chunk_size
            .min(buf.len())
            .min(self.remaining() as usize);
        let addr = Address::new(self.next);
        if let Err(e) = self.flash.read(addr, &mut buf[..len]).await {
            self.next = self.total;
            return Some(Err(e));
        }

        let done = self.next + len as u32;
        let crossed = done / PROGRESS_INTERVAL != self.next / PROGRESS_INTERVAL;
        self.next = done;

        let progress = (crossed || done == self.total).then_some(Progress {
            done,
            total: self.total,
        });
        Some(Ok(Chunk {
            addr,
            len,
            progress,
        }))
    }
}
