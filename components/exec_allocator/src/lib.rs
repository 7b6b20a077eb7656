//! Executable memory allocator.
//!
//! Hosts natively generated code bodies in OS-mapped pages that are
//! readable, writable and executable. The allocator is independent of the
//! garbage-collected heap and is the only engine component meant to be
//! shared between threads; every operation takes a single mutex.
//!
//! # Overview
//!
//! - [`ExecutableAllocator`] - best-fit allocation with split and merge
//! - [`Allocation`] - a live block, with its unwind-metadata prefix
//! - [`ExecMemoryError`] - mapping and bookkeeping failures

#![warn(missing_docs)]
#![warn(clippy::all)]

mod allocator;
mod error;
mod pages;

pub use allocator::{Allocation, AllocatorStats, ExecutableAllocator, MIN_ALIGNMENT, UNWIND_INFO_SIZE};
pub use error::ExecMemoryError;
pub use pages::page_size;
