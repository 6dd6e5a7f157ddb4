//! Adapter layer - Concrete implementations connecting domain to hardware.
//!
//! This layer contains the raw chip seam, the bus-locked adapter that
//! implements the domain's [`FlashBus`](crate::domain::FlashBus) port, and
//! concrete chips.
//!
//! # Hexagonal Architecture
//!
//! ```text
//!     ┌──────────────────────────────────┐
//!     │      Domain Layer                │
//!     │  - RingAllocator (service)       │
//!     │  - FlashBus (port)               │
//!     └────────────┬─────────────────────┘
//!                  │
//!                  │ implements
//!                  ▼
//!     ┌──────────────────────────────────┐
//!     │      Adapter Layer               │  ◄── This module
//!     │  - Flash<D> (bus lock, guard)    │
//!     └────────────┬─────────────────────┘
//!                  │
//!                  │ drives
//!                  ▼
//!     ┌──────────────────────────────────┐
//!     │  FlashDevice                     │
//!     │  - MemFlash                      │
//!     │  - NorFlashAdapter               │
//!     └──────────────────────────────────┘
//! ```
//!
//! # Available Adapters
//!
//! - **`Flash`**: Serializes primitives on one bus lock and tracks bring-up
//! - **`MemFlash`**: RAM-backed NOR simulator (requires `alloc`)
//! - **`NorFlashAdapter`**: Any `embedded-storage` NOR flash (requires `embedded-storage`)

mod bus;
mod device;

#[cfg(feature = "alloc")]
mod mem_flash;

#[cfg(feature = "embedded-storage")]
mod nor_flash_adapter;

pub use bus::{ChipInfo, Flash, Progress};
pub use device::{FlashDevice, W25Q32_JEDEC_ID};

#[cfg(feature = "alloc")]
pub use mem_flash::{FlashStats, MemFlash, MemFlashError, Operation};

#[cfg(feature = "embedded-storage")]
pub use nor_flash_adapter::{NorFlashAdapter, NorFlashConfig, NorFlashError};
