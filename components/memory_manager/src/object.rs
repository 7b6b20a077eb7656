//! The managed-object capability set and the built-in object kinds.
//!
//! Every heap-resident entity implements [`Managed`]. The heap stores them
//! as trait objects and drives marking and finalization through the trait;
//! property access goes through the optional [`PropertyStore`] and indexed
//! element hooks.

use std::any::Any;

use core_types::{GcRef, Value};

use crate::gc::Tracer;
use crate::hidden_class::{ShapeId, ShapeTable};

/// Hint passed to the default-value protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredType {
    /// No preference (treated like `Number` except for dates)
    Default,
    /// Prefer `valueOf`
    Number,
    /// Prefer `toString`
    String,
}

/// Primitive produced by an object's fallback conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// A number
    Number(f64),
    /// Text to be turned into a string value
    Text(String),
}

/// Capabilities shared by every garbage-collected object.
///
/// `trace` must report every [`GcRef`] the object holds, otherwise the
/// referenced objects are swept while still in use.
pub trait Managed: Any {
    /// Class name used in diagnostics and the generic `[object X]` string.
    fn class_name(&self) -> &'static str;

    /// Reports outgoing references to the tracer.
    fn trace(&self, tracer: &mut Tracer);

    /// Runs once, during sweep, before the slot is reused.
    fn finalize(&mut self) {}

    /// Named property storage, if the object has any.
    fn properties(&self) -> Option<&PropertyStore> {
        None
    }

    /// Mutable named property storage.
    fn properties_mut(&mut self) -> Option<&mut PropertyStore> {
        None
    }

    /// Prototype link.
    fn prototype(&self) -> Option<GcRef> {
        None
    }

    /// Replaces the prototype link. Objects without one ignore this.
    fn set_prototype(&mut self, _prototype: Option<GcRef>) {}

    /// Dense indexed element, if present.
    fn get_index(&self, _index: u32) -> Option<Value> {
        None
    }

    /// Stores an indexed element; `false` if the object cannot hold it
    /// densely and the caller should fall back to a named property.
    fn put_index(&mut self, _index: u32, _value: Value) -> bool {
        false
    }

    /// Fallback primitive once the object's own conversion hooks failed.
    fn default_value(&self, hint: PreferredType) -> Primitive {
        match hint {
            PreferredType::Number => Primitive::Number(f64::NAN),
            PreferredType::Default | PreferredType::String => {
                Primitive::Text(format!("[object {}]", self.class_name()))
            }
        }
    }

    /// True for functions.
    fn is_callable(&self) -> bool {
        false
    }

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Named properties laid out by a hidden class.
#[derive(Debug, Clone)]
pub struct PropertyStore {
    shape: ShapeId,
    values: Vec<Value>,
}

impl PropertyStore {
    /// Empty store with the empty shape.
    pub fn new() -> Self {
        PropertyStore {
            shape: ShapeId::EMPTY,
            values: Vec::new(),
        }
    }

    /// Current hidden class.
    pub fn shape(&self) -> ShapeId {
        self.shape
    }

    /// Value at a shape offset, as remembered by an inline cache.
    pub fn value_at(&self, offset: u32) -> Option<Value> {
        self.values.get(offset as usize).copied()
    }

    /// Overwrites the value at a shape offset.
    pub fn set_value_at(&mut self, offset: u32, value: Value) -> bool {
        match self.values.get_mut(offset as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Reads a property by name.
    pub fn get(&self, shapes: &ShapeTable, name: &str) -> Option<Value> {
        shapes
            .lookup(self.shape, name)
            .and_then(|offset| self.value_at(offset))
    }

    /// Writes a property, adding it (and transitioning the shape) if new.
    /// Returns the offset the value landed at.
    pub fn put(&mut self, shapes: &mut ShapeTable, name: &str, value: Value) -> u32 {
        if let Some(offset) = shapes.lookup(self.shape, name) {
            self.values[offset as usize] = value;
            return offset;
        }
        self.shape = shapes.add_property(self.shape, name);
        self.values.push(value);
        (self.values.len() - 1) as u32
    }

    /// Removes a property. Returns whether it existed.
    pub fn delete(&mut self, shapes: &mut ShapeTable, name: &str) -> bool {
        match shapes.lookup(self.shape, name) {
            Some(offset) => {
                self.values.remove(offset as usize);
                self.shape = shapes.remove_property(self.shape, name);
                true
            }
            None => false,
        }
    }

    /// Property values in shape order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Reports every held value to the tracer.
    pub fn trace(&self, tracer: &mut Tracer) {
        for value in &self.values {
            tracer.mark_value(*value);
        }
    }
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Flavour of a [`JsObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClass {
    /// Plain object
    Object,
    /// Array with a dense element vector
    Array,
    /// Error instance
    Error,
}

/// Largest gap a dense element write may open up before falling back to
/// named storage.
const MAX_DENSE_GAP: u32 = 1024;

/// Generic script object: named properties, dense elements, prototype.
///
/// # Example
///
/// ```
/// use core_types::Value;
/// use memory_manager::{JsObject, Managed, ObjectClass};
///
/// let mut array = JsObject::array(None, vec![Value::Int32(1)]);
/// assert!(array.put_index(1, Value::Int32(2)));
/// assert_eq!(array.class(), ObjectClass::Array);
/// assert_eq!(array.elements().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct JsObject {
    class: ObjectClass,
    properties: PropertyStore,
    elements: Vec<Value>,
    // Arrays only; never below `elements.len()`.
    length: u32,
    prototype: Option<GcRef>,
}

impl JsObject {
    /// Plain object with the given prototype.
    pub fn new(prototype: Option<GcRef>) -> Self {
        JsObject {
            class: ObjectClass::Object,
            properties: PropertyStore::new(),
            elements: Vec::new(),
            length: 0,
            prototype,
        }
    }

    /// Array holding `elements`.
    pub fn array(prototype: Option<GcRef>, elements: Vec<Value>) -> Self {
        JsObject {
            class: ObjectClass::Array,
            properties: PropertyStore::new(),
            length: elements.len() as u32,
            elements,
            prototype,
        }
    }

    /// Error object; `name` and `message` are installed by the caller.
    pub fn error(prototype: Option<GcRef>) -> Self {
        JsObject {
            class: ObjectClass::Error,
            ..JsObject::new(prototype)
        }
    }

    /// Object flavour.
    pub fn class(&self) -> ObjectClass {
        self.class
    }

    /// Dense elements.
    pub fn elements(&self) -> &[Value] {
        &self.elements
    }

    /// Array length. Other objects report their dense element count.
    pub fn length(&self) -> u32 {
        match self.class {
            ObjectClass::Array => self.length,
            _ => self.elements.len() as u32,
        }
    }

    /// Sets an array's length, dropping dense elements past it. Growing
    /// never materializes elements.
    pub fn set_length(&mut self, length: u32) {
        self.elements.truncate(length as usize);
        self.length = length;
    }

    /// Grows an array's length to cover a write at `index`.
    pub fn note_index(&mut self, index: u32) {
        if self.class == ObjectClass::Array && index >= self.length {
            self.length = index.saturating_add(1);
        }
    }

    /// Named property storage.
    pub fn store(&self) -> &PropertyStore {
        &self.properties
    }

    /// Mutable named property storage.
    pub fn store_mut(&mut self) -> &mut PropertyStore {
        &mut self.properties
    }
}

impl Managed for JsObject {
    fn class_name(&self) -> &'static str {
        match self.class {
            ObjectClass::Object => "Object",
            ObjectClass::Array => "Array",
            ObjectClass::Error => "Error",
        }
    }

    fn trace(&self, tracer: &mut Tracer) {
        self.properties.trace(tracer);
        for value in &self.elements {
            tracer.mark_value(*value);
        }
        if let Some(proto) = self.prototype {
            tracer.mark(proto);
        }
    }

    fn finalize(&mut self) {
        self.elements = Vec::new();
    }

    fn properties(&self) -> Option<&PropertyStore> {
        Some(&self.properties)
    }

    fn properties_mut(&mut self) -> Option<&mut PropertyStore> {
        Some(&mut self.properties)
    }

    fn prototype(&self) -> Option<GcRef> {
        self.prototype
    }

    fn set_prototype(&mut self, prototype: Option<GcRef>) {
        self.prototype = prototype;
    }

    fn get_index(&self, index: u32) -> Option<Value> {
        self.elements.get(index as usize).copied()
    }

    fn put_index(&mut self, index: u32, value: Value) -> bool {
        let len = self.elements.len() as u32;
        if index < len {
            self.elements[index as usize] = value;
            true
        } else if index - len <= MAX_DENSE_GAP {
            self.elements.resize(index as usize, Value::Undefined);
            self.elements.push(value);
            self.note_index(index);
            true
        } else {
            false
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Heap-resident string contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsString {
    text: String,
}

impl JsString {
    /// Wraps string contents.
    pub fn new(text: impl Into<String>) -> Self {
        JsString { text: text.into() }
    }

    /// Contents.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in UTF-16 code units, as scripts observe it.
    pub fn length(&self) -> u32 {
        self.text.encode_utf16().count() as u32
    }
}

impl Managed for JsString {
    fn class_name(&self) -> &'static str {
        "String"
    }

    fn trace(&self, _tracer: &mut Tracer) {}

    fn default_value(&self, _hint: PreferredType) -> Primitive {
        Primitive::Text(self.text.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
