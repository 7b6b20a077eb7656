//! Handles to garbage-collected heap slots.
//!
//! A [`GcRef`] names one slot of the managed heap. It packs the size class,
//! the chunk within that class, the slot within that chunk and a generation
//! counter into 48 bits, so that a handle always fits the payload of a
//! NaN-boxed value.

use std::fmt;

const SLOT_BITS: u64 = 16;
const CHUNK_BITS: u64 = 12;
const CLASS_BITS: u64 = 4;
const GENERATION_BITS: u64 = 16;

const CHUNK_SHIFT: u64 = SLOT_BITS;
const CLASS_SHIFT: u64 = CHUNK_SHIFT + CHUNK_BITS;
const GENERATION_SHIFT: u64 = CLASS_SHIFT + CLASS_BITS;

/// Number of payload bits a handle occupies.
pub const GC_REF_BITS: u64 = GENERATION_SHIFT + GENERATION_BITS;

/// Maximum number of slots a single chunk may hold.
pub const MAX_SLOTS_PER_CHUNK: usize = 1 << SLOT_BITS;
/// Maximum number of chunks per size class.
pub const MAX_CHUNKS_PER_CLASS: usize = 1 << CHUNK_BITS;
/// Maximum number of size classes.
pub const MAX_SIZE_CLASSES: usize = 1 << CLASS_BITS;

/// A non-owning reference to a managed heap object.
///
/// The heap owns every object; a `GcRef` stays valid only while the object
/// it names is reachable from a root. The generation field lets the heap
/// detect handles to slots that have since been swept and reused.
///
/// # Examples
///
/// ```
/// use core_types::GcRef;
///
/// let r = GcRef::new(2, 7, 300, 1);
/// assert_eq!(r.size_class(), 2);
/// assert_eq!(r.chunk(), 7);
/// assert_eq!(r.slot(), 300);
/// assert_eq!(r.generation(), 1);
/// assert_eq!(GcRef::from_raw(r.to_raw()), Some(r));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GcRef(u64);

impl GcRef {
    /// Builds a handle from its components.
    ///
    /// # Panics
    ///
    /// Panics if any component exceeds its bit width.
    pub fn new(size_class: usize, chunk: usize, slot: usize, generation: u16) -> Self {
        assert!(size_class < MAX_SIZE_CLASSES, "size class out of range");
        assert!(chunk < MAX_CHUNKS_PER_CLASS, "chunk index out of range");
        assert!(slot < MAX_SLOTS_PER_CHUNK, "slot index out of range");
        GcRef(
            (slot as u64)
                | ((chunk as u64) << CHUNK_SHIFT)
                | ((size_class as u64) << CLASS_SHIFT)
                | ((generation as u64) << GENERATION_SHIFT),
        )
    }

    /// Size class the slot belongs to.
    pub fn size_class(self) -> usize {
        ((self.0 >> CLASS_SHIFT) & ((1 << CLASS_BITS) - 1)) as usize
    }

    /// Chunk index within the size class.
    pub fn chunk(self) -> usize {
        ((self.0 >> CHUNK_SHIFT) & ((1 << CHUNK_BITS) - 1)) as usize
    }

    /// Slot index within the chunk.
    pub fn slot(self) -> usize {
        (self.0 & ((1 << SLOT_BITS) - 1)) as usize
    }

    /// Generation of the slot when this handle was issued.
    pub fn generation(self) -> u16 {
        ((self.0 >> GENERATION_SHIFT) & ((1 << GENERATION_BITS) - 1)) as u16
    }

    /// Raw 48-bit payload.
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Rebuilds a handle from a raw payload, rejecting values wider than 48 bits.
    pub fn from_raw(raw: u64) -> Option<Self> {
        if raw >> GC_REF_BITS != 0 {
            return None;
        }
        Some(GcRef(raw))
    }
}

impl fmt::Debug for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GcRef({}:{}:{}@{})",
            self.size_class(),
            self.chunk(),
            self.slot(),
            self.generation()
        )
    }
}
