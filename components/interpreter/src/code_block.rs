//! Installed machine code

use std::sync::Arc;

use exec_allocator::{Allocation, ExecutableAllocator};
use tracing::warn;

/// Generated code living in executable memory.
///
/// Dropping the block hands its memory back to the allocator.
#[derive(Debug)]
pub struct CodeBlock {
    allocator: Arc<ExecutableAllocator>,
    allocation: Option<Allocation>,
    len: usize,
}

impl CodeBlock {
    pub(crate) fn new(allocator: Arc<ExecutableAllocator>, allocation: Allocation, len: usize) -> Self {
        Self {
            allocator,
            allocation: Some(allocation),
            len,
        }
    }

    pub(crate) fn empty(allocator: Arc<ExecutableAllocator>) -> Self {
        Self {
            allocator,
            allocation: None,
            len: 0,
        }
    }

    /// Address of the first instruction, null for an empty block.
    pub fn entry(&self) -> *const u8 {
        self.allocation
            .as_ref()
            .map_or(std::ptr::null(), Allocation::code_ptr)
    }

    /// Length of the installed code in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no code was installed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes reserved for the block, including the unwind prefix.
    pub fn reserved(&self) -> usize {
        self.allocation.as_ref().map_or(0, Allocation::size)
    }
}

impl Drop for CodeBlock {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.allocator.free(allocation) {
                warn!(error = %e, "failed to release code block");
            }
        }
    }
}
