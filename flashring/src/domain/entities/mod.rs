//! Domain entities for the ring storage engine.
//!
//! The only entity with a lifecycle is the ring buffer state: the write
//! cursor plus the flags that move it through its phases.

mod ring_state;

pub use ring_state::{RingBufferState, RingPhase};
