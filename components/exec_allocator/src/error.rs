//! Errors reported by the executable allocator.

use thiserror::Error;

/// Failure of an executable-memory operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecMemoryError {
    /// Zero-sized or overflowing request
    #[error("invalid executable allocation size {0}")]
    InvalidSize(usize),
    /// The OS refused to map pages
    #[error("mapping {size} bytes of executable memory failed (errno {errno})")]
    MapFailed {
        /// Bytes requested from the OS
        size: usize,
        /// `errno` after the failed call
        errno: i32,
    },
    /// The allocation is not live in this allocator
    #[error("no live allocation at {0:#x}")]
    UnknownAllocation(usize),
    /// A write would run past the end of the allocation
    #[error("write of {len} bytes at offset {offset} exceeds allocation of {capacity} bytes")]
    OutOfBounds {
        /// Requested offset
        offset: usize,
        /// Bytes to write
        len: usize,
        /// Usable bytes in the allocation
        capacity: usize,
    },
}
