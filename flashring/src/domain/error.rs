//! Domain-level errors.
//!
//! `FlashError` covers both rule violations raised by the domain (range,
//! lifecycle, pause) and primitive failures reported by the device through
//! the port error type `E`.

use crate::domain::value_objects::Address;
use core::fmt;

/// A byte range that falls outside the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfRange {
    /// Requested start address.
    pub addr: u32,
    /// Requested length in bytes.
    pub len: usize,
    /// Total device size in bytes.
    pub capacity: u32,
}

impl fmt::Display for OutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Range 0x{:08X}+{} exceeds capacity of {} bytes",
            self.addr, self.len, self.capacity
        )
    }
}

impl core::error::Error for OutOfRange {}

/// Errors that can occur in the storage engine.
#[derive(Debug)]
#[non_exhaustive]
pub enum FlashError<E> {
    /// The device has not completed bring-up, or bring-up failed.
    NotReady,

    /// A ring write was attempted before the ring was initialized.
    NotInitialized,

    /// The requested byte range lies outside the device.
    OutOfRange(OutOfRange),

    /// The request itself is malformed.
    InvalidArgument(&'static str),

    /// A ring write was attempted while the ring is paused.
    Rejected,

    /// No length-prefixed record is present at the address.
    NoData {
        /// Address that was read.
        addr: Address,
    },

    /// A sector erase failed.
    ///
    /// `completed` counts the sectors erased before the failure, so range
    /// erases can report partial progress.
    EraseFailure {
        /// Start of the sector that failed.
        addr: Address,
        /// Sectors successfully erased before the failure.
        completed: u32,
        /// Device error.
        source: E,
    },

    /// A program operation failed.
    ProgramFailure {
        /// Start of the failed program.
        addr: Address,
        /// Device error.
        source: E,
    },

    /// A read operation failed.
    ReadFailure {
        /// Start of the failed read.
        addr: Address,
        /// Device error.
        source: E,
    },

    /// Reading the chip identification failed.
    IdentifyFailure(E),
}

impl<E> From<OutOfRange> for FlashError<E> {
    fn from(err: OutOfRange) -> Self {
        Self::OutOfRange(err)
    }
}

impl<E: fmt::Display> fmt::Display for FlashError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "Flash device is not ready"),
            Self::NotInitialized => write!(f, "Ring buffer is not initialized"),
            Self::OutOfRange(e) => write!(f, "{}", e),
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Self::Rejected => write!(f, "Write rejected: ring buffer is paused"),
            Self::NoData { addr } => write!(f, "No record stored at {}", addr),
            Self::EraseFailure {
                addr,
                completed,
                source,
            } => write!(
                f,
                "Erase failed at {} after {} sector(s): {}",
                addr, completed, source
            ),
            Self::ProgramFailure { addr, source } => {
                write!(f, "Program failed at {}: {}", addr, source)
            }
            Self::ReadFailure { addr, source } => write!(f, "Read failed at {}: {}", addr, source),
            Self::IdentifyFailure(source) => write!(f, "Chip identification failed: {}", source),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> core::error::Error for FlashError<E> {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::OutOfRange(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> FlashError<E> {
    /// Whether this error came from the device rather than from a rule check.
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            Self::EraseFailure { .. }
                | Self::ProgramFailure { .. }
                | Self::ReadFailure { .. }
                | Self::IdentifyFailure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_display() {
        let error: FlashError<std::io::Error> = OutOfRange {
            addr: 0x400000,
            len: 16,
            capacity: 4_194_304,
        }
        .into();

        let msg = format!("{}", error);
        assert!(msg.contains("0x00400000"));
        assert!(msg.contains("4194304"));
    }

    #[test]
    fn test_erase_failure_reports_progress() {
        let error: FlashError<&str> = FlashError::EraseFailure {
            addr: Address::new(0x3000),
            completed: 3,
            source: "timeout",
        };
        let msg = format!("{}", error);
        assert!(msg.contains("0x00003000"));
        assert!(msg.contains("3 sector"));
        assert!(msg.contains("timeout"));
        assert!(error.is_device_failure());
    }

    #[test]
    fn test_rule_errors_are_not_device_failures() {
        let rejected: FlashError<&str> = FlashError::Rejected;
        assert!(!rejected.is_device_failure());
        assert!(format!("{}", rejected).contains("paused"));
    }
}
