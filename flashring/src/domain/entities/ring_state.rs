//! Ring buffer state and lifecycle phases.

use crate::domain::value_objects::Address;

/// Lifecycle phase of the ring allocator.
///
/// ```text
/// Uninitialized ──init()──► Scanning ──► Ready ◄──► Paused
/// ```
///
/// There is no terminal phase while the device is powered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RingPhase {
    /// No scan has run and no position was forced.
    Uninitialized,
    /// The frontier scan is in progress.
    Scanning,
    /// Accepting writes.
    Ready,
    /// Initialized, but new writes are rejected.
    Paused,
}

impl RingPhase {
    /// Check if writes would currently be accepted.
    #[inline]
    pub const fn accepts_writes(&self) -> bool {
        matches!(self, RingPhase::Ready)
    }
}

/// Volatile ring state: `{cursor, initialized, paused}`.
///
/// Nothing here is persisted. After a restart the cursor is re-derived by
/// scanning flash content.
///
/// The `paused` flag is a copy. The allocator keeps the live flag in an
/// atomic outside its lock and fills this field in only when it hands out a
/// snapshot, so the copy held behind the lock always reads `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingBufferState {
    cursor: Address,
    initialized: bool,
    paused: bool,
}

impl RingBufferState {
    /// Fresh, uninitialized state with the cursor at 0.
    pub const fn new() -> Self {
        Self {
            cursor: Address::ZERO,
            initialized: false,
            paused: false,
        }
    }

    /// Next address to be written.
    #[inline]
    pub const fn cursor(&self) -> Address {
        self.cursor
    }

    /// Whether a scan or a forced position has set the cursor.
    #[inline]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether new writes were rejected when this snapshot was taken.
    #[inline]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Phase implied by the flags, ignoring any scan in progress.
    pub const fn phase(&self) -> RingPhase {
        match (self.initialized, self.paused) {
            (false, _) => RingPhase::Uninitialized,
            (true, false) => RingPhase::Ready,
            (true, true) => RingPhase::Paused,
        }
    }

    /// Move the cursor and mark the state initialized.
    pub(crate) fn place(&mut self, cursor: Address) {
        self.cursor = cursor;
        self.initialized = true;
    }

    /// Move the cursor after committed bytes. Does not touch the flags.
    pub(crate) fn advance_to(&mut self, cursor: Address) {
        self.cursor = cursor;
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }
}
