//! Contract tests verifying the memory_manager API and collector guarantees.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

use core_types::{GcRef, Value};
use memory_manager::{
    GcStats, Heap, HeapConfig, JsObject, JsString, Managed, NoRoots, ObjectClass, Tracer,
};

fn small_heap() -> Heap {
    Heap::with_config(HeapConfig {
        initial_chunk_bytes: 1024,
        max_chunk_bytes: 8192,
        gc_enabled: true,
    })
}

/// Deterministic pseudo-random sequence for subset selection.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

/// Counts finalizer runs.
struct Finalizable {
    finalized: Rc<Cell<usize>>,
    next: Option<GcRef>,
}

impl Managed for Finalizable {
    fn class_name(&self) -> &'static str {
        "Finalizable"
    }

    fn trace(&self, tracer: &mut Tracer) {
        if let Some(next) = self.next {
            tracer.mark(next);
        }
    }

    fn finalize(&mut self) {
        self.finalized.set(self.finalized.get() + 1);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Test Heap contract: new() -> Self
#[test]
fn contract_heap_new() {
    let heap = Heap::new();
    assert_eq!(heap.stats(), GcStats::default());
    assert_eq!(heap.live_objects().count(), 0);
}

/// Test Heap contract: allocate(object, roots) -> GcRef, readable via get_as
#[test]
fn contract_heap_allocate_and_read() {
    let mut heap = Heap::new();
    let s = heap.allocate(JsString::new("hello"), &NoRoots);
    assert_eq!(heap.get_as::<JsString>(s).map(|s| s.as_str()), Some("hello"));
    assert!(heap.get_as::<JsObject>(s).is_none());
    assert_eq!(heap.get(s).map(|o| o.class_name()), Some("String"));
}

/// Test GC contract: rooted subsets survive, everything else is swept
#[test]
fn contract_gc_round_trip_with_random_roots() {
    let mut heap = small_heap();
    let mut rng = Lcg(0x5eed);

    heap.block_gc();
    let objects: Vec<GcRef> = (0..500)
        .map(|i| {
            let object = heap.allocate(JsObject::new(None), &NoRoots);
            heap.put_property(object, "id", Value::Int32(i));
            object
        })
        .collect();
    // Chain a few objects so reachability is transitive.
    for pair in objects.windows(2).step_by(7) {
        heap.put_property(pair[0], "next", Value::Managed(pair[1]));
    }
    heap.unblock_gc();

    let roots: Vec<Value> = objects
        .iter()
        .filter(|_| rng.next() % 3 == 0)
        .map(|r| Value::Managed(*r))
        .collect();

    heap.collect(&roots);

    let mut reachable: HashSet<GcRef> = HashSet::new();
    let mut stack: Vec<GcRef> = roots.iter().filter_map(|v| v.as_managed()).collect();
    while let Some(r) = stack.pop() {
        if reachable.insert(r) {
            if let Some(Value::Managed(next)) = heap.get_own_property(r, "next") {
                stack.push(next);
            }
        }
    }

    for (i, object) in objects.iter().enumerate() {
        if reachable.contains(object) {
            assert!(heap.is_live(*object));
            assert_eq!(heap.get_own_property(*object, "id"), Some(Value::Int32(i as i32)));
        }
    }
    let walked: HashSet<GcRef> = heap.live_objects().collect();
    assert_eq!(walked, reachable);
}

/// Test GC contract: unreachable objects are finalized exactly once
#[test]
fn contract_gc_finalizes_once() {
    let mut heap = small_heap();
    let finalized = Rc::new(Cell::new(0));
    let tail = heap.allocate(
        Finalizable {
            finalized: finalized.clone(),
            next: None,
        },
        &NoRoots,
    );
    let head = heap.allocate(
        Finalizable {
            finalized: finalized.clone(),
            next: Some(tail),
        },
        &NoRoots,
    );

    let roots = vec![Value::Managed(head)];
    heap.collect(&roots);
    assert_eq!(finalized.get(), 0);

    heap.collect(&NoRoots);
    assert_eq!(finalized.get(), 2);
    heap.collect(&NoRoots);
    assert_eq!(finalized.get(), 2);
}

/// Test root contract: persistent roots keep objects alive until removed
#[test]
fn contract_persistent_roots() {
    let mut heap = small_heap();
    let object = heap.allocate(JsObject::array(None, vec![]), &NoRoots);
    let id = heap.add_root(Value::Managed(object));
    heap.collect(&NoRoots);
    assert!(heap.is_live(object));
    assert_eq!(heap.root(id), Some(Value::Managed(object)));

    assert_eq!(heap.remove_root(id), Some(Value::Managed(object)));
    heap.collect(&NoRoots);
    assert!(!heap.is_live(object));
}

/// Test stats contract: freed counts accumulate across cycles
#[test]
fn contract_stats_track_cycles() {
    let mut heap = Heap::new();
    for _ in 0..10 {
        heap.allocate(JsObject::new(None), &NoRoots);
    }
    assert_eq!(heap.collect(&NoRoots), 10);
    heap.allocate(JsObject::new(None), &NoRoots);
    heap.collect(&NoRoots);

    let stats = heap.stats();
    assert_eq!(stats.collections, 2);
    assert_eq!(stats.freed_last, 1);
    assert_eq!(stats.freed_total, 11);
    assert_eq!(stats.live_objects, 0);
    assert!(stats.chunks >= 1);
}

/// Test object contract: arrays keep their class through the heap
#[test]
fn contract_array_in_heap() {
    let mut heap = Heap::new();
    let array = heap.allocate(
        JsObject::array(None, vec![Value::Int32(1), Value::Int32(2)]),
        &NoRoots,
    );
    let object = heap.get_as_mut::<JsObject>(array).expect("array object");
    assert_eq!(object.class(), ObjectClass::Array);
    assert!(object.put_index(2, Value::Int32(3)));
    assert_eq!(object.length(), 3);
    assert_eq!(heap.get(array).and_then(|o| o.get_index(2)), Some(Value::Int32(3)));
}
