//! Memory Manager - Garbage-collected heap for the script engine
//!
//! This component provides:
//! - The [`Managed`] capability trait every heap object implements
//! - A size-class segregated slot heap with geometric chunk growth
//! - Stop-the-world mark/sweep collection driven by explicit root sets
//! - Persistent roots for host-held references
//! - Hidden classes (shapes) shared by objects with equal layouts
//! - The built-in object kinds: plain objects, arrays, errors and strings

pub mod gc;
pub mod heap;
pub mod hidden_class;
pub mod object;

pub use gc::{NoRoots, PersistentRoots, RootId, RootSet, Tracer};
pub use heap::{size_class_for, GcStats, Heap, HeapConfig, SIZE_CLASSES};
pub use hidden_class::{HiddenClass, PropertyDescriptor, ShapeId, ShapeTable};
pub use object::{JsObject, JsString, Managed, ObjectClass, PreferredType, Primitive, PropertyStore};
