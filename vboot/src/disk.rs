//! Storage stream interface
//!
//! The core never touches a block device directly: the platform supplies a
//! [`DiskAccess`] implementation and the scanner opens one bounded
//! [`DiskStream`] per kernel partition. Closing a stream is dropping it.

use alloc::boxed::Box;
use core::fmt;

/// Storage faults surfaced by the platform's stream implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskError {
    /// Stream could not be opened over the requested extent
    OpenFailed { start_lba: u64, lba_count: u64 },
    /// Read returned fewer bytes than requested, or failed outright
    ReadFailed { offset: u64, len: usize },
    /// Partition-table write-back failed
    WriteBackFailed,
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed {
                start_lba,
                lba_count,
            } => {
                write!(
                    f,
                    "stream open failed ({} LBAs at {})",
                    lba_count, start_lba
                )
            }
            Self::ReadFailed { offset, len } => {
                write!(f, "read of {} bytes at offset {} failed", len, offset)
            }
            Self::WriteBackFailed => write!(f, "partition table write-back failed"),
        }
    }
}

/// A bounded, forward-only byte stream over one partition.
///
/// `read` fills `buf` completely or fails; short reads are reported as
/// [`DiskError::ReadFailed`]. The stream is closed by dropping it.
pub trait DiskStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<(), DiskError>;
}

/// Access to the storage device holding the partition table.
pub trait DiskAccess {
    /// Open a stream over `lba_count` blocks starting at `start_lba`.
    fn open_stream(
        &mut self,
        start_lba: u64,
        lba_count: u64,
    ) -> Result<Box<dyn DiskStream + '_>, DiskError>;
}
