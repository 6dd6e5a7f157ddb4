//! `embedded-io-async` reader over the whole device.
//!
//! [`FlashReader`] bridges the engine to the embedded_io_async ecosystem.
//! Every `read` call is one bus transaction and nothing holds writers off,
//! so a sequential scan is not a snapshot: chunks read before and after a
//! concurrent write may disagree.

use core::fmt;

use embedded_io_async::{ErrorType, Read, Seek, SeekFrom};

use crate::{
    adapters::{Flash, FlashDevice},
    domain::Address,
};

/// Unified I/O error type for streaming operations.
#[derive(Debug)]
pub enum StreamError<E> {
    /// Error from the underlying flash.
    Storage(E),
    /// Invalid seek position.
    InvalidSeek,
}

impl<E: fmt::Display> fmt::Display for StreamError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "Storage error: {}", e),
            Self::InvalidSeek => write!(f, "Invalid seek position"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> core::error::Error for StreamError<E> {}

// Implement embedded_io_async::Error so the reader can be used with embedded_io_async
impl<E: fmt::Debug + fmt::Display> embedded_io_async::Error for StreamError<E> {
    fn kind(&self) -> embedded_io_async::ErrorKind {
        match self {
            Self::Storage(_) => embedded_io_async::ErrorKind::Other,
            Self::InvalidSeek => embedded_io_async::ErrorKind::InvalidInput,
        }
    }
}

/// Sequential, seekable reader over the device.
pub struct FlashReader<'a, D> {
    flash: &'a Flash<D>,
    pos: u32,
}

impl<'a, D: FlashDevice> FlashReader<'a, D> {
    pub(crate) fn new(flash: &'a Flash<D>) -> Self {
        Self { flash, pos: 0 }
    }

    /// Current read position.
    #[inline]
    pub fn position(&self) -> u32 {
        self.pos
    }

    fn len(&self) -> u32 {
        self.flash.capacity().total_bytes()
    }
}

impl<D: FlashDevice> ErrorType for FlashReader<'_, D> {
    type Error = StreamError<crate::domain::FlashError<D::Error>>;
}

impl<D: FlashDevice> Read for FlashReader<'_, D> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let remaining = (self.len() - self.pos) as usize;
        let n = buf.len().min(remaining);
        if n == 0 {
            return Ok(0);
        }
        self.flash
            .read(Address::new(self.pos), &mut buf[..n])
            .await
            .map_err(StreamError::Storage)?;
        self.pos += n as u32;
        Ok(n)
    }
}

impl<D: FlashDevice> Seek for FlashReader<'_, D> {
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
        let len = self.len() as i64;
        let target = match pos {
            SeekFrom::Start(n) => i64::try_from(n).map_err(|_| StreamError::InvalidSeek)?,
            SeekFrom::End(n) => len.checked_add(n).ok_or(StreamError::InvalidSeek)?,
            SeekFrom::Current(n) => (self.pos as i64)
                .checked_add(n)
                .ok_or(StreamError::InvalidSeek)?,
        };
        if !(0..=len).contains(&target) {
            return Err(StreamError::InvalidSeek);
        }
        self.pos = target as u32;
        Ok(target as u64)
    }
}

#[cfg(all(test, feature = "alloc"))]
mod tests {
    use super::*;
    use crate::adapters::MemFlash;
    use crate::domain::Capacity;
    use crate::FlashEngine;

    async fn engine() -> FlashEngine<MemFlash> {
        let engine = FlashEngine::new(MemFlash::new(Capacity::new(8192, 4096).unwrap()));
        engine.bring_up().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_read_exact_after_seek() {
        let engine = engine().await;
        engine.write(0x1000, b"stream me").await.unwrap();

        let mut reader = engine.reader();
        reader.seek(SeekFrom::Start(0x1000)).await.unwrap();
        let mut buf = [0u8; 9];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"stream me");
        assert_eq!(reader.position(), 0x1009);
    }

    #[tokio::test]
    async fn test_read_stops_at_end() {
        let engine = engine().await;
        let mut reader = engine.reader();
        assert_eq!(reader.seek(SeekFrom::End(-4)).await.unwrap(), 8188);

        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 4);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_seeks() {
        let engine = engine().await;
        let mut reader = engine.reader();
        assert!(matches!(
            reader.seek(SeekFrom::Current(-1)).await,
            Err(StreamError::InvalidSeek)
        ));
        assert!(matches!(
            reader.seek(SeekFrom::Start(8193)).await,
            Err(StreamError::InvalidSeek)
        ));
        assert_eq!(reader.position(), 0);
    }

    #[tokio::test]
    async fn test_storage_error_kind() {
        let engine = FlashEngine::new(MemFlash::new(Capacity::new(4096, 4096).unwrap()));
        let mut reader = engine.reader();
        let mut buf = [0u8; 4];
        let err = reader.read(&mut buf).await.unwrap_err();
        assert_eq!(
            embedded_io_async::Error::kind(&err),
            embedded_io_async::ErrorKind::Other
        );
    }
}
