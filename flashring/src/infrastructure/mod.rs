//! Infrastructure layer - the engine and its I/O surfaces.
//!
//! [`FlashEngine`] owns the adapter and the ring allocator and is the only
//! object callers need. Bulk reads go through [`Export`] (gated against
//! writers) or [`FlashReader`] (an `embedded-io-async` reader, ungated).

pub mod engine;
pub mod export;
pub mod stream;

pub use engine::{FlashEngine, MAX_STR_LEN};
pub use export::{Chunk, Export, PROGRESS_INTERVAL};
pub use stream::{FlashReader, StreamError};
