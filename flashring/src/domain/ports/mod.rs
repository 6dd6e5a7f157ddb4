//! Ports define the interfaces between the domain and the outside world.
//!
//! In hexagonal architecture, ports are the boundaries of the application:
//! - **Primary (Driving) Ports**: What the domain exposes to the outside world
//! - **Secondary (Driven) Ports**: What the domain needs from the outside world
//!
//! This module contains the **secondary (driven) port** the ring allocator
//! and erase policy depend on: a bus-locked, range-checked flash.

mod flash_bus;

pub use flash_bus::FlashBus;

#[cfg(test)]
pub(crate) use flash_bus::tests::{BusOp, MockBus};
