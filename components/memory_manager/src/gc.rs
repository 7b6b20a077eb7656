//! Mark-phase plumbing: the tracer, root sources and persistent roots.
//!
//! The collector never scans the native stack. Everything that can hold a
//! [`Value`] across an allocation (the interpreter's register file, the
//! context chain, the global object, host-held handles) is reported
//! explicitly through a [`RootSet`] or registered as a persistent root.

use core_types::{GcRef, Value};

/// Collects references reported during the mark phase.
///
/// Objects push their outgoing references here from
/// [`Managed::trace`](crate::Managed::trace); the heap drains the worklist
/// until every reachable object is marked.
#[derive(Debug, Default)]
pub struct Tracer {
    worklist: Vec<GcRef>,
}

impl Tracer {
    /// Creates an empty tracer.
    pub fn new() -> Self {
        Tracer {
            worklist: Vec::new(),
        }
    }

    /// Reports a reference.
    pub fn mark(&mut self, r: GcRef) {
        self.worklist.push(r);
    }

    /// Reports the heap reference inside a value, if any.
    pub fn mark_value(&mut self, value: Value) {
        if let Some(r) = value.heap_ref() {
            self.worklist.push(r);
        }
    }

    /// Reports every value in a slice.
    pub fn mark_values(&mut self, values: &[Value]) {
        for value in values {
            self.mark_value(*value);
        }
    }

    pub(crate) fn pop(&mut self) -> Option<GcRef> {
        self.worklist.pop()
    }

    /// Number of references waiting to be visited.
    pub fn pending(&self) -> usize {
        self.worklist.len()
    }
}

/// A source of roots for one collection.
pub trait RootSet {
    /// Reports every root to the tracer.
    fn trace_roots(&self, tracer: &mut Tracer);
}

/// No roots beyond the heap's persistent ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRoots;

impl RootSet for NoRoots {
    fn trace_roots(&self, _tracer: &mut Tracer) {}
}

impl RootSet for [Value] {
    fn trace_roots(&self, tracer: &mut Tracer) {
        tracer.mark_values(self);
    }
}

impl RootSet for Vec<Value> {
    fn trace_roots(&self, tracer: &mut Tracer) {
        tracer.mark_values(self);
    }
}

impl<A: RootSet + ?Sized, B: RootSet + ?Sized> RootSet for (&A, &B) {
    fn trace_roots(&self, tracer: &mut Tracer) {
        self.0.trace_roots(tracer);
        self.1.trace_roots(tracer);
    }
}

/// Handle to a persistent root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootId(u32);

/// Host-held values that stay alive until explicitly released.
#[derive(Debug, Default)]
pub struct PersistentRoots {
    slots: Vec<Option<Value>>,
    free: Vec<u32>,
}

impl PersistentRoots {
    /// Creates an empty root table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a value, returning the handle that releases it.
    pub fn add(&mut self, value: Value) -> RootId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(value);
                RootId(index)
            }
            None => {
                self.slots.push(Some(value));
                RootId((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Releases a root. Returns the value it held.
    pub fn remove(&mut self, id: RootId) -> Option<Value> {
        let value = self.slots.get_mut(id.0 as usize)?.take()?;
        self.free.push(id.0);
        Some(value)
    }

    /// Current value of a root.
    pub fn get(&self, id: RootId) -> Option<Value> {
        self.slots.get(id.0 as usize).copied().flatten()
    }

    /// Replaces the value of a live root.
    pub fn set(&mut self, id: RootId, value: Value) -> bool {
        match self.slots.get_mut(id.0 as usize) {
            Some(slot @ Some(_)) => {
                *slot = Some(value);
                true
            }
            _ => false,
        }
    }

    /// Number of live roots.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// True when no roots are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RootSet for PersistentRoots {
    fn trace_roots(&self, tracer: &mut Tracer) {
        for value in self.slots.iter().flatten() {
            tracer.mark_value(*value);
        }
    }
}
