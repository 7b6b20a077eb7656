//! Size-class segregated heap with a stop-the-world mark/sweep collector.
//!
//! Objects are placed in slots of a size class chosen from the concrete
//! type's size. Each class owns a list of chunks (slot tables that grow
//! geometrically up to a cap) and a free-index stack. Allocation pops a free
//! slot; when none is left and the class has seen more allocations since the
//! last cycle than half its slot count, a collection runs first; if that
//! frees nothing for the class a new chunk is added.
//!
//! Collection is synchronous: mark everything reachable from the supplied
//! [`RootSet`] and the persistent roots, then sweep every chunk, finalizing
//! unmarked objects and pushing their slots onto the free stack. Slot
//! generations are bumped on free so stale [`GcRef`]s are detected.

use std::mem;
use std::time::{Duration, Instant};

use core_types::{GcRef, Value, MAX_CHUNKS_PER_CLASS, MAX_SLOTS_PER_CHUNK};
use serde::Deserialize;
use tracing::{debug, error, trace};

use crate::gc::{PersistentRoots, RootId, RootSet, Tracer};
use crate::hidden_class::{ShapeId, ShapeTable};
use crate::object::Managed;

/// Slot sizes of the size classes, in bytes. Types larger than the last
/// class share it.
pub const SIZE_CLASSES: [usize; 8] = [16, 32, 64, 128, 256, 512, 1024, 2048];

/// Prototype chains longer than this are treated as cyclic.
const MAX_PROTOTYPE_DEPTH: usize = 10_000;

/// Heap tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    /// Bytes covered by the first chunk of each size class
    pub initial_chunk_bytes: usize,
    /// Cap on the geometric chunk growth
    pub max_chunk_bytes: usize,
    /// When false, allocation never triggers a collection
    pub gc_enabled: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            initial_chunk_bytes: 64 * 1024,
            max_chunk_bytes: 1024 * 1024,
            gc_enabled: true,
        }
    }
}

/// Collector statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcStats {
    /// Completed collection cycles
    pub collections: usize,
    /// Objects freed by the last cycle
    pub freed_last: usize,
    /// Objects freed over the heap's lifetime
    pub freed_total: usize,
    /// Objects currently allocated
    pub live_objects: usize,
    /// Chunks across all size classes
    pub chunks: usize,
    /// Slots across all size classes
    pub total_slots: usize,
    /// Pause of the last cycle
    pub last_pause: Duration,
}

struct Slot {
    object: Option<Box<dyn Managed>>,
    marked: bool,
    generation: u16,
}

impl Slot {
    fn empty() -> Self {
        Slot {
            object: None,
            marked: false,
            generation: 0,
        }
    }
}

struct Chunk {
    slots: Vec<Slot>,
}

#[derive(Clone, Copy)]
struct SlotIndex {
    chunk: u16,
    slot: u16,
}

struct SizeClass {
    slot_size: usize,
    chunks: Vec<Chunk>,
    free: Vec<SlotIndex>,
    next_chunk_bytes: usize,
    allocated_since_gc: usize,
    total_slots: usize,
}

impl SizeClass {
    fn new(slot_size: usize, initial_chunk_bytes: usize) -> Self {
        SizeClass {
            slot_size,
            chunks: Vec::new(),
            free: Vec::new(),
            next_chunk_bytes: initial_chunk_bytes,
            allocated_since_gc: 0,
            total_slots: 0,
        }
    }
}

/// Picks the size class for an object of `size` bytes.
pub fn size_class_for(size: usize) -> usize {
    SIZE_CLASSES
        .iter()
        .position(|&class_size| size <= class_size)
        .unwrap_or(SIZE_CLASSES.len() - 1)
}

/// The managed heap of one engine instance.
///
/// # Example
///
/// ```
/// use core_types::Value;
/// use memory_manager::{Heap, JsObject, NoRoots};
///
/// let mut heap = Heap::new();
/// let kept = heap.allocate(JsObject::new(None), &NoRoots);
/// let root = heap.add_root(Value::Managed(kept));
/// heap.allocate(JsObject::new(None), &NoRoots);
///
/// assert_eq!(heap.collect(&NoRoots), 1);
/// assert!(heap.is_live(kept));
/// heap.remove_root(root);
/// ```
pub struct Heap {
    classes: Vec<SizeClass>,
    shapes: ShapeTable,
    roots: PersistentRoots,
    config: HeapConfig,
    block_count: usize,
    stats: GcStats,
}

impl Heap {
    /// Creates a heap with the default configuration.
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    /// Creates a heap with explicit tuning.
    pub fn with_config(config: HeapConfig) -> Self {
        let classes = SIZE_CLASSES
            .iter()
            .map(|&size| SizeClass::new(size, config.initial_chunk_bytes))
            .collect();
        Heap {
            classes,
            shapes: ShapeTable::new(),
            roots: PersistentRoots::new(),
            config,
            block_count: 0,
            stats: GcStats::default(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Moves `object` into the heap.
    ///
    /// May run a collection first; `roots` must report every value the
    /// caller holds outside the heap. References held by `object` itself are
    /// kept alive during that collection.
    pub fn allocate<T: Managed>(&mut self, object: T, roots: &dyn RootSet) -> GcRef {
        let class_index = size_class_for(mem::size_of::<T>());
        self.classes[class_index].allocated_since_gc += 1;

        if self.classes[class_index].free.is_empty() && self.should_collect(class_index) {
            self.collect_with_pending(roots, Some(&object));
        }

        let index = match self.classes[class_index].free.pop() {
            Some(index) => index,
            None => self.add_chunk(class_index),
        };

        let slot = &mut self.classes[class_index].chunks[index.chunk as usize].slots
            [index.slot as usize];
        debug_assert!(slot.object.is_none(), "free list handed out a live slot");
        slot.object = Some(Box::new(object));
        slot.marked = false;
        self.stats.live_objects += 1;
        GcRef::new(
            class_index,
            index.chunk as usize,
            index.slot as usize,
            slot.generation,
        )
    }

    fn should_collect(&self, class_index: usize) -> bool {
        let class = &self.classes[class_index];
        self.config.gc_enabled
            && self.block_count == 0
            && class.total_slots > 0
            && class.allocated_since_gc > class.total_slots / 2
    }

    /// Adds a chunk to a class, threads its slots onto the free stack and
    /// returns the first one.
    fn add_chunk(&mut self, class_index: usize) -> SlotIndex {
        let max_chunk_bytes = self.config.max_chunk_bytes;
        let class = &mut self.classes[class_index];
        if class.chunks.len() >= MAX_CHUNKS_PER_CLASS {
            error!(
                class_index,
                chunks = class.chunks.len(),
                "managed heap exhausted"
            );
            std::process::abort();
        }

        let slot_count = (class.next_chunk_bytes / class.slot_size).clamp(1, MAX_SLOTS_PER_CHUNK);
        let chunk_index = class.chunks.len() as u16;
        class
            .chunks
            .push(Chunk {
                slots: (0..slot_count).map(|_| Slot::empty()).collect(),
            });
        class.total_slots += slot_count;
        class.next_chunk_bytes = (class.next_chunk_bytes * 2).min(max_chunk_bytes.max(class.slot_size));

        // Reverse order so the lowest slot is handed out first.
        for slot in (1..slot_count).rev() {
            class.free.push(SlotIndex {
                chunk: chunk_index,
                slot: slot as u16,
            });
        }
        trace!(
            class_index,
            slot_size = class.slot_size,
            slot_count,
            "added heap chunk"
        );
        SlotIndex {
            chunk: chunk_index,
            slot: 0,
        }
    }

    fn slot(&self, r: GcRef) -> Option<&Slot> {
        let slot = self
            .classes
            .get(r.size_class())?
            .chunks
            .get(r.chunk())?
            .slots
            .get(r.slot())?;
        (slot.object.is_some() && slot.generation == r.generation()).then_some(slot)
    }

    fn slot_mut(classes: &mut [SizeClass], r: GcRef) -> Option<&mut Slot> {
        let slot = classes
            .get_mut(r.size_class())?
            .chunks
            .get_mut(r.chunk())?
            .slots
            .get_mut(r.slot())?;
        (slot.object.is_some() && slot.generation == r.generation()).then_some(slot)
    }

    /// True if `r` names an object that has not been swept.
    pub fn is_live(&self, r: GcRef) -> bool {
        self.slot(r).is_some()
    }

    /// Borrows an object.
    pub fn get(&self, r: GcRef) -> Option<&(dyn Managed + 'static)> {
        self.slot(r)?.object.as_deref()
    }

    /// Mutably borrows an object.
    pub fn get_mut(&mut self, r: GcRef) -> Option<&mut (dyn Managed + 'static)> {
        Self::slot_mut(&mut self.classes, r)?.object.as_deref_mut()
    }

    /// Borrows an object as its concrete type.
    pub fn get_as<T: Managed>(&self, r: GcRef) -> Option<&T> {
        self.get(r)?.as_any().downcast_ref::<T>()
    }

    /// Mutably borrows an object as its concrete type.
    pub fn get_as_mut<T: Managed>(&mut self, r: GcRef) -> Option<&mut T> {
        self.get_mut(r)?.as_any_mut().downcast_mut::<T>()
    }

    /// Runs a full collection. Returns the number of objects freed.
    pub fn collect(&mut self, roots: &dyn RootSet) -> usize {
        self.collect_with_pending(roots, None)
    }

    fn collect_with_pending(&mut self, roots: &dyn RootSet, pending: Option<&dyn Managed>) -> usize {
        debug_assert_eq!(self.block_count, 0, "collection requested while blocked");
        if self.block_count > 0 {
            return 0;
        }

        let started = Instant::now();
        let mut tracer = Tracer::new();
        roots.trace_roots(&mut tracer);
        self.roots.trace_roots(&mut tracer);
        if let Some(object) = pending {
            object.trace(&mut tracer);
        }
        self.mark(&mut tracer);
        let freed = self.sweep();

        for class in &mut self.classes {
            class.allocated_since_gc = 0;
        }
        self.stats.collections += 1;
        self.stats.freed_last = freed;
        self.stats.freed_total += freed;
        self.stats.live_objects -= freed;
        self.stats.last_pause = started.elapsed();
        debug!(
            freed,
            live = self.stats.live_objects,
            pause_us = self.stats.last_pause.as_micros() as u64,
            "gc cycle complete"
        );
        freed
    }

    fn mark(&mut self, tracer: &mut Tracer) {
        while let Some(r) = tracer.pop() {
            let Some(slot) = Self::slot_mut(&mut self.classes, r) else {
                continue;
            };
            if slot.marked {
                continue;
            }
            slot.marked = true;
            if let Some(object) = slot.object.as_deref() {
                object.trace(tracer);
            }
        }
    }

    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for class in &mut self.classes {
            let SizeClass { chunks, free, .. } = class;
            for (chunk_index, chunk) in chunks.iter_mut().enumerate() {
                for (slot_index, slot) in chunk.slots.iter_mut().enumerate() {
                    if slot.object.is_none() {
                        continue;
                    }
                    if slot.marked {
                        slot.marked = false;
                        continue;
                    }
                    if let Some(mut object) = slot.object.take() {
                        object.finalize();
                    }
                    slot.generation = slot.generation.wrapping_add(1);
                    free.push(SlotIndex {
                        chunk: chunk_index as u16,
                        slot: slot_index as u16,
                    });
                    freed += 1;
                }
            }
        }
        freed
    }

    /// Forbids collection until the matching [`unblock_gc`](Self::unblock_gc).
    ///
    /// Calls nest.
    pub fn block_gc(&mut self) {
        self.block_count += 1;
    }

    /// Re-enables collection after [`block_gc`](Self::block_gc).
    pub fn unblock_gc(&mut self) {
        debug_assert!(self.block_count > 0, "unbalanced unblock_gc");
        self.block_count = self.block_count.saturating_sub(1);
    }

    /// True while collection is blocked.
    pub fn is_gc_blocked(&self) -> bool {
        self.block_count > 0
    }

    /// Keeps `value` alive until [`remove_root`](Self::remove_root).
    pub fn add_root(&mut self, value: Value) -> RootId {
        self.roots.add(value)
    }

    /// Releases a persistent root.
    pub fn remove_root(&mut self, id: RootId) -> Option<Value> {
        self.roots.remove(id)
    }

    /// Value held by a persistent root.
    pub fn root(&self, id: RootId) -> Option<Value> {
        self.roots.get(id)
    }

    /// Collector statistics.
    pub fn stats(&self) -> GcStats {
        let mut stats = self.stats.clone();
        stats.chunks = self.classes.iter().map(|c| c.chunks.len()).sum();
        stats.total_slots = self.classes.iter().map(|c| c.total_slots).sum();
        stats
    }

    /// Walks every allocated object. Intended for tests and diagnostics.
    pub fn live_objects(&self) -> impl Iterator<Item = GcRef> + '_ {
        self.classes.iter().enumerate().flat_map(|(class_index, class)| {
            class
                .chunks
                .iter()
                .enumerate()
                .flat_map(move |(chunk_index, chunk)| {
                    chunk
                        .slots
                        .iter()
                        .enumerate()
                        .filter(|(_, slot)| slot.object.is_some())
                        .map(move |(slot_index, slot)| {
                            GcRef::new(class_index, chunk_index, slot_index, slot.generation)
                        })
                })
        })
    }

    /// The hidden-class table.
    pub fn shapes(&self) -> &ShapeTable {
        &self.shapes
    }

    /// Hidden class of an object's named properties.
    pub fn shape_of(&self, r: GcRef) -> Option<ShapeId> {
        Some(self.get(r)?.properties()?.shape())
    }

    /// Own named property.
    pub fn get_own_property(&self, r: GcRef, name: &str) -> Option<Value> {
        self.get(r)?.properties()?.get(&self.shapes, name)
    }

    /// Named property, following the prototype chain.
    pub fn get_property(&self, r: GcRef, name: &str) -> Option<Value> {
        let mut current = Some(r);
        for _ in 0..MAX_PROTOTYPE_DEPTH {
            let object = self.get(current?)?;
            if let Some(value) = object.properties().and_then(|p| p.get(&self.shapes, name)) {
                return Some(value);
            }
            current = object.prototype();
        }
        None
    }

    /// True if the property exists on the object or its prototypes.
    pub fn has_property(&self, r: GcRef, name: &str) -> bool {
        self.get_property(r, name).is_some()
    }

    /// True if the object itself has the property.
    pub fn has_own_property(&self, r: GcRef, name: &str) -> bool {
        self.get_own_property(r, name).is_some()
    }

    /// Writes an own named property. Returns false if the object has no
    /// named storage.
    pub fn put_property(&mut self, r: GcRef, name: &str, value: Value) -> bool {
        let Some(slot) = Self::slot_mut(&mut self.classes, r) else {
            return false;
        };
        match slot.object.as_deref_mut().and_then(|o| o.properties_mut()) {
            Some(store) => {
                store.put(&mut self.shapes, name, value);
                true
            }
            None => false,
        }
    }

    /// Deletes an own named property. Returns whether it existed.
    pub fn delete_property(&mut self, r: GcRef, name: &str) -> bool {
        let Some(slot) = Self::slot_mut(&mut self.classes, r) else {
            return false;
        };
        match slot.object.as_deref_mut().and_then(|o| o.properties_mut()) {
            Some(store) => store.delete(&mut self.shapes, name),
            None => false,
        }
    }

    /// Own property names in insertion order.
    pub fn own_property_names(&self, r: GcRef) -> Vec<String> {
        match self.get(r).and_then(|o| o.properties()) {
            Some(store) => self
                .shapes
                .property_names(store.shape())
                .map(|name| name.to_string())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Prototype of an object.
    pub fn prototype_of(&self, r: GcRef) -> Option<GcRef> {
        self.get(r)?.prototype()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
