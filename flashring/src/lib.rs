//! Append-only ring storage over serial NOR flash, with hexagonal architecture.
//!
//! This crate provides an address-space layer over a NOR flash chip that
//! enforces its physics (erase sets every bit, program only clears bits), and
//! a ring allocator that keeps appending records, wrapping to address 0 and
//! overwriting the oldest data when the device is full.
//!
//! # Architecture
//!
//! The crate is organized into three layers:
//!
//! ## Domain Layer (`domain`)
//! Pure storage rules with no infrastructure dependencies:
//! - **Value Objects**: `Address`, `SectorIndex`, `Capacity`
//! - **Entities**: `RingBufferState` with its `RingPhase`
//! - **Services**: `AddressGuard`, `ErasePolicy`, `FrontierScan`, `RingAllocator`
//! - **Ports**: `FlashBus` interface
//!
//! ## Adapter Layer (`adapters`)
//! Concrete implementations connecting domain to hardware:
//! - **`Flash`**: Implements `FlashBus`; one bus lock, bring-up latch
//! - **`MemFlash`**: RAM-backed NOR simulator (requires `alloc`)
//! - **`NorFlashAdapter`**: Any `embedded-storage` NOR flash
//!
//! ## Infrastructure Layer (`infrastructure`)
//! The single owned engine and its I/O surfaces:
//! - **`FlashEngine`**: Ring writes, direct passthroughs, write gate
//! - **`Export`**: Chunked full-device dump with progress
//! - **`FlashReader`**: `embedded-io-async` `Read + Seek`
//!
//! # Quick Start
//!
//! ```
//! # futures::executor::block_on(async {
//! use flashring::{Capacity, FlashEngine, MemFlash};
//!
//! let engine = FlashEngine::new(MemFlash::new(Capacity::new(16 * 1024, 4096).unwrap()));
//! engine.bring_up().await.unwrap();
//! engine.ring_init().await.unwrap();
//!
//! let first = engine.ring_write(b"t=1 v=3.30").await.unwrap();
//! let second = engine.ring_write(b"t=2 v=3.29").await.unwrap();
//! assert_eq!(second.offset_from(first), 10);
//! # });
//! ```
//!
//! # Features
//!
//! - `alloc`: Enable the in-memory simulator (`MemFlash`)
//! - `embedded-storage`: Enable `NorFlashAdapter`
//! - `std`: Enable standard library features
//! - `log`: Enable logging support
//! - `defmt`: Enable defmt logging for embedded

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![allow(async_fn_in_trait)]

#[cfg(feature = "alloc")]
extern crate alloc;

// This mod MUST go first, so that the others see its macros.
#[macro_use]
mod fmt;

// Core layers
pub mod domain;
pub mod adapters;
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    Address, Capacity, CapacityError, FlashBus, FlashError, OutOfRange, RingBufferState,
    RingPhase, SectorIndex, SECTOR_SIZE_4K,
};

pub use adapters::{ChipInfo, Flash, FlashDevice, Progress};

#[cfg(feature = "alloc")]
pub use adapters::{MemFlash, MemFlashError};

#[cfg(feature = "embedded-storage")]
pub use adapters::{NorFlashAdapter, NorFlashConfig, NorFlashError};

// Infrastructure layer exports
pub use infrastructure::{Chunk, Export, FlashEngine, FlashReader, StreamError, MAX_STR_LEN};

// Re-export embedded_io_async for convenience
pub use embedded_io_async;
