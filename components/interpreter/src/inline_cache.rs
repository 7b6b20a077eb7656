//! Per-call-site lookup caches
//!
//! Property loads, stores and global lookups carry a cache slot index.
//! Each slot remembers which hidden classes it has seen and where the
//! property lives in them, so a repeated access on the same shape skips the
//! name lookup.

use arrayvec::ArrayVec;
use memory_manager::ShapeId;

/// Shapes a polymorphic site tracks before giving up.
pub const POLYMORPHIC_LIMIT: usize = 4;

/// Lookup cache for one property-access site
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InlineCache {
    /// Never executed
    #[default]
    Uninitialized,
    /// One shape seen
    Monomorphic {
        /// Cached hidden class
        shape: ShapeId,
        /// Property slot in that class
        offset: u32,
    },
    /// A few shapes seen
    Polymorphic {
        /// (shape, offset) pairs
        entries: ArrayVec<(ShapeId, u32), POLYMORPHIC_LIMIT>,
    },
    /// Too many shapes; always take the generic path
    Megamorphic,
}

impl InlineCache {
    /// Slot offset cached for `shape`.
    pub fn lookup(&self, shape: ShapeId) -> Option<u32> {
        match self {
            InlineCache::Monomorphic {
                shape: cached,
                offset,
            } if *cached == shape => Some(*offset),
            InlineCache::Polymorphic { entries } => entries
                .iter()
                .find(|(s, _)| *s == shape)
                .map(|(_, offset)| *offset),
            _ => None,
        }
    }

    /// Records that `shape` holds the property at `offset`.
    pub fn update(&mut self, shape: ShapeId, offset: u32) {
        match self {
            InlineCache::Uninitialized => *self = InlineCache::Monomorphic { shape, offset },
            InlineCache::Monomorphic {
                shape: cached,
                offset: cached_offset,
            } => {
                if *cached == shape {
                    *cached_offset = offset;
                } else {
                    let mut entries = ArrayVec::new();
                    entries.push((*cached, *cached_offset));
                    entries.push((shape, offset));
                    *self = InlineCache::Polymorphic { entries };
                }
            }
            InlineCache::Polymorphic { entries } => {
                if let Some(entry) = entries.iter_mut().find(|(s, _)| *s == shape) {
                    entry.1 = offset;
                } else if entries.try_push((shape, offset)).is_err() {
                    *self = InlineCache::Megamorphic;
                }
            }
            InlineCache::Megamorphic => {}
        }
    }

    /// True once the site has stopped caching.
    pub fn is_megamorphic(&self) -> bool {
        matches!(self, InlineCache::Megamorphic)
    }
}

/// Cache slots of every function in a loaded unit
#[derive(Debug, Default)]
pub(crate) struct UnitCaches {
    functions: Vec<Vec<InlineCache>>,
}

impl UnitCaches {
    pub(crate) fn new(lookup_counts: impl Iterator<Item = u32>) -> Self {
        UnitCaches {
            functions: lookup_counts
                .map(|n| vec![InlineCache::Uninitialized; n as usize])
                .collect(),
        }
    }

    pub(crate) fn get(&self, function: u32, slot: u32) -> Option<&InlineCache> {
        self.functions.get(function as usize)?.get(slot as usize)
    }

    pub(crate) fn get_mut(&mut self, function: u32, slot: u32) -> Option<&mut InlineCache> {
        self.functions
            .get_mut(function as usize)?
            .get_mut(slot as usize)
    }
}
