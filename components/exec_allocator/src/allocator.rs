//! Best-fit allocator with split and neighbour coalescing.
//!
//! Each chunk is one OS mapping, tiled by blocks. A block records its start,
//! size, free flag and the starts of its neighbours inside the chunk, so a
//! free can merge with either side without searching. Free blocks are also
//! indexed by size for best-fit lookup. A chunk is unmapped as soon as it
//! collapses back into a single free block.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::debug;

use crate::pages::{page_size, PageMapping};
use crate::ExecMemoryError;

/// Every allocation is a multiple of this many bytes.
pub const MIN_ALIGNMENT: usize = 16;

/// Bytes reserved at the front of each allocation for out-of-line unwind
/// metadata. Code starts right after it.
pub const UNWIND_INFO_SIZE: usize = 32;

/// Smallest chunk requested from the OS, in pages.
const MIN_CHUNK_PAGES: usize = 16;

fn round_up(value: usize, multiple: usize) -> Option<usize> {
    value.checked_add(multiple - 1).map(|v| v / multiple * multiple)
}

/// A live block of executable memory.
///
/// Not `Clone`: handing it back to [`ExecutableAllocator::free`] consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Allocation {
    start: usize,
    size: usize,
}

impl Allocation {
    /// First byte of the block, where the unwind metadata lives.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Total size of the block, including the unwind reserve.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Address where code may be placed.
    pub fn code_ptr(&self) -> *const u8 {
        (self.start + UNWIND_INFO_SIZE) as *const u8
    }

    /// Bytes available for code.
    pub fn code_capacity(&self) -> usize {
        self.size - UNWIND_INFO_SIZE
    }
}

#[derive(Debug, Clone, Copy)]
struct Block {
    size: usize,
    free: bool,
    prev: Option<usize>,
    next: Option<usize>,
    chunk: usize,
}

struct ChunkRecord {
    mapping: PageMapping,
}

#[derive(Default)]
struct AllocatorState {
    blocks: HashMap<usize, Block>,
    free_by_size: BTreeMap<usize, BTreeSet<usize>>,
    chunks: BTreeMap<usize, ChunkRecord>,
}

impl AllocatorState {
    fn insert_free(&mut self, start: usize, size: usize) {
        self.free_by_size.entry(size).or_default().insert(start);
    }

    fn remove_free(&mut self, start: usize, size: usize) {
        if let Some(starts) = self.free_by_size.get_mut(&size) {
            starts.remove(&start);
            if starts.is_empty() {
                self.free_by_size.remove(&size);
            }
        }
    }

    /// Smallest free block of at least `needed` bytes, removed from the
    /// free index.
    fn take_best_fit(&mut self, needed: usize) -> Option<usize> {
        let (&size, starts) = self.free_by_size.range(needed..).next()?;
        let start = *starts.iter().next()?;
        self.remove_free(start, size);
        Some(start)
    }

    fn map_chunk(&mut self, needed: usize) -> Result<usize, ExecMemoryError> {
        let page = page_size();
        let size = round_up(needed, page)
            .ok_or(ExecMemoryError::InvalidSize(needed))?
            .max(MIN_CHUNK_PAGES * page);
        let mapping = PageMapping::map(size)?;
        let base = mapping.base();
        debug!(base = format_args!("{:#x}", base), size, "mapped executable chunk");

        self.blocks.insert(
            base,
            Block {
                size: mapping.size(),
                free: true,
                prev: None,
                next: None,
                chunk: base,
            },
        );
        self.chunks.insert(base, ChunkRecord { mapping });
        Ok(base)
    }

    /// Shrinks the block at `start` to `needed` bytes, returning the tail
    /// to the free index.
    fn split(&mut self, start: usize, needed: usize) {
        let block = self.blocks[&start];
        if block.size <= needed {
            return;
        }
        let tail_start = start + needed;
        let tail = Block {
            size: block.size - needed,
            free: true,
            prev: Some(start),
            next: block.next,
            chunk: block.chunk,
        };
        if let Some(next) = block.next {
            if let Some(next_block) = self.blocks.get_mut(&next) {
                next_block.prev = Some(tail_start);
            }
        }
        if let Some(head) = self.blocks.get_mut(&start) {
            head.size = needed;
            head.next = Some(tail_start);
        }
        self.blocks.insert(tail_start, tail);
        self.insert_free(tail_start, tail.size);
    }

    /// Folds the free block at `absorbed` into its predecessor `into`.
    fn merge(&mut self, into: usize, absorbed: usize) {
        let Some(gone) = self.blocks.remove(&absorbed) else {
            return;
        };
        if let Some(next) = gone.next {
            if let Some(next_block) = self.blocks.get_mut(&next) {
                next_block.prev = Some(into);
            }
        }
        if let Some(block) = self.blocks.get_mut(&into) {
            block.size += gone.size;
            block.next = gone.next;
        }
    }
}

/// Usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Mapped chunks
    pub chunks: usize,
    /// Bytes mapped from the OS
    pub mapped_bytes: usize,
    /// Bytes in live allocations
    pub allocated_bytes: usize,
    /// Free blocks in the size index
    pub free_blocks: usize,
}

/// Allocator for code buffers, shareable across engine threads.
///
/// # Example
///
/// ```
/// use exec_allocator::ExecutableAllocator;
///
/// let allocator = ExecutableAllocator::new();
/// let a = allocator.allocate(100).unwrap();
/// let b = allocator.allocate(200).unwrap();
/// assert!(a.start() + a.size() <= b.start() || b.start() + b.size() <= a.start());
///
/// allocator.free(a).unwrap();
/// allocator.free(b).unwrap();
/// assert_eq!(allocator.stats().chunks, 0);
/// ```
pub struct ExecutableAllocator {
    state: Mutex<AllocatorState>,
}

impl ExecutableAllocator {
    /// Creates an empty allocator.
    pub fn new() -> Self {
        ExecutableAllocator {
            state: Mutex::new(AllocatorState::default()),
        }
    }

    /// Process-wide allocator shared by every engine.
    pub fn shared() -> Arc<ExecutableAllocator> {
        static SHARED: OnceLock<Arc<ExecutableAllocator>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(ExecutableAllocator::new())).clone()
    }

    /// Allocates room for `code_size` bytes of code plus the unwind reserve.
    pub fn allocate(&self, code_size: usize) -> Result<Allocation, ExecMemoryError> {
        if code_size == 0 {
            return Err(ExecMemoryError::InvalidSize(code_size));
        }
        let needed = code_size
            .checked_add(UNWIND_INFO_SIZE)
            .and_then(|n| round_up(n, MIN_ALIGNMENT))
            .ok_or(ExecMemoryError::InvalidSize(code_size))?;

        let mut state = self.state.lock();
        let start = match state.take_best_fit(needed) {
            Some(start) => start,
            None => state.map_chunk(needed)?,
        };
        state.split(start, needed);
        if let Some(block) = state.blocks.get_mut(&start) {
            block.free = false;
        }
        Ok(Allocation {
            start,
            size: needed,
        })
    }

    /// Returns an allocation, coalescing with free neighbours and unmapping
    /// the chunk once it is entirely free.
    pub fn free(&self, allocation: Allocation) -> Result<(), ExecMemoryError> {
        let mut state = self.state.lock();
        let block = match state.blocks.get_mut(&allocation.start) {
            Some(block) if !block.free => {
                block.free = true;
                *block
            }
            _ => return Err(ExecMemoryError::UnknownAllocation(allocation.start)),
        };

        let mut start = allocation.start;
        if let Some(next) = block.next {
            let next_block = state.blocks[&next];
            if next_block.free {
                state.remove_free(next, next_block.size);
                state.merge(start, next);
            }
        }
        if let Some(prev) = block.prev {
            let prev_block = state.blocks[&prev];
            if prev_block.free {
                state.remove_free(prev, prev_block.size);
                state.merge(prev, start);
                start = prev;
            }
        }

        let merged = state.blocks[&start];
        if merged.prev.is_none() && merged.next.is_none() {
            state.blocks.remove(&start);
            if let Some(chunk) = state.chunks.remove(&merged.chunk) {
                debug!(
                    base = format_args!("{:#x}", merged.chunk),
                    size = chunk.mapping.size(),
                    "released executable chunk"
                );
            }
        } else {
            state.insert_free(start, merged.size);
        }
        Ok(())
    }

    /// Copies `code` into the allocation's code area at `offset`.
    pub fn write(&self, allocation: &Allocation, offset: usize, code: &[u8]) -> Result<(), ExecMemoryError> {
        let capacity = allocation.code_capacity();
        let end = offset.checked_add(code.len());
        if end.map_or(true, |end| end > capacity) {
            return Err(ExecMemoryError::OutOfBounds {
                offset,
                len: code.len(),
                capacity,
            });
        }
        let state = self.state.lock();
        match state.blocks.get(&allocation.start) {
            Some(block) if !block.free => {}
            _ => return Err(ExecMemoryError::UnknownAllocation(allocation.start)),
        }
        // SAFETY: the range lies inside a live block of a mapped chunk, and
        // the lock keeps the chunk mapped for the duration of the copy.
        unsafe {
            let dest = (allocation.code_ptr() as *mut u8).add(offset);
            std::ptr::copy_nonoverlapping(code.as_ptr(), dest, code.len());
        }
        Ok(())
    }

    /// Usage counters.
    pub fn stats(&self) -> AllocatorStats {
        let state = self.state.lock();
        AllocatorStats {
            chunks: state.chunks.len(),
            mapped_bytes: state.chunks.values().map(|c| c.mapping.size()).sum(),
            allocated_bytes: state
                .blocks
                .values()
                .filter(|b| !b.free)
                .map(|b| b.size)
                .sum(),
            free_blocks: state.free_by_size.values().map(|s| s.len()).sum(),
        }
    }

    /// Verifies that every chunk is exactly tiled by its blocks and that the
    /// free index matches the free blocks.
    pub fn check_consistency(&self) -> bool {
        let state = self.state.lock();
        let mut seen = 0;
        for (&base, chunk) in &state.chunks {
            let mut cursor = Some(base);
            let mut prev = None;
            let mut covered = 0;
            while let Some(start) = cursor {
                let Some(block) = state.blocks.get(&start) else {
                    return false;
                };
                if block.prev != prev || block.chunk != base || start != base + covered {
                    return false;
                }
                let indexed = state
                    .free_by_size
                    .get(&block.size)
                    .map_or(false, |s| s.contains(&start));
                if indexed != block.free {
                    return false;
                }
                covered += block.size;
                seen += 1;
                prev = Some(start);
                cursor = block.next;
            }
            if covered != chunk.mapping.size() {
                return false;
            }
        }
        seen == state.blocks.len()
    }
}

impl Default for ExecutableAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutableAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableAllocator")
            .field("stats", &self.stats())
            .finish()
    }
}
