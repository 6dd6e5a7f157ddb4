//! Domain layer - Pure storage rules with zero infrastructure dependencies.
//!
//! This is the core of the hexagonal architecture. The domain layer contains:
//! - **Value Objects**: Immutable validated data (`Address`, `SectorIndex`, `Capacity`)
//! - **Entities**: Volatile ring state and its lifecycle (`RingBufferState`, `RingPhase`)
//! - **Domain Services**: `AddressGuard`, `ErasePolicy`, `FrontierScan`, `RingAllocator`
//! - **Ports**: Interfaces to the outside world (`FlashBus`)
//! - **Domain Errors**: Rule violations and device failures (`FlashError`)
//!
//! # Hexagonal Architecture
//!
//! ```text
//!     ┌──────────────────────────────────┐
//!     │      Domain Layer (Core)         │
//!     │                                  │
//!     │  ┌────────────────────────────┐  │
//!     │  │    RingAllocator           │  │
//!     │  │    + FrontierScan          │  │
//!     │  └────────────────────────────┘  │
//!     │              │                   │
//!     │              ▼                   │
//!     │  ┌────────────────────────────┐  │
//!     │  │    ErasePolicy             │  │
//!     │  │    AddressGuard            │  │
//!     │  └────────────────────────────┘  │
//!     │              │                   │
//!     │              ▼                   │
//!     │  ┌────────────────────────────┐  │
//!     │  │    Ports (Interfaces)      │  │
//!     │  │    - FlashBus              │  │
//!     │  └────────────────────────────┘  │
//!     └──────────────────────────────────┘
//!                    ▲
//!                    │ implemented by
//!                    │
//!     ┌──────────────────────────────────┐
//!     │      Adapter Layer               │
//!     │  - Flash<D: FlashDevice>         │
//!     │  - MemFlash, NorFlashAdapter     │
//!     └──────────────────────────────────┘
//! ```
//!
//! # Examples
//!
//! ```ignore
//! use flashring::domain::RingAllocator;
//!
//! let ring = RingAllocator::new(bus.capacity());
//! ring.init(&bus).await?;
//! let at = ring.write(&bus, b"sample").await?;
//! ```

pub mod entities;
pub mod erase_policy;
pub mod error;
pub mod frontier;
pub mod guard;
pub mod ports;
pub mod ring;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{RingBufferState, RingPhase};
pub use erase_policy::{ErasePolicy, Segment, Segments, Wrap};
pub use error::{FlashError, OutOfRange};
pub use frontier::{FrontierScan, PROBE_LEN};
pub use guard::AddressGuard;
pub use ports::FlashBus;
pub use ring::RingAllocator;
pub use value_objects::{Address, Capacity, CapacityError, SectorIndex, PAGE_SIZE, SECTOR_SIZE_4K};
