//! Hidden classes (shapes) for named property storage.
//!
//! Objects that gain the same properties in the same order share a hidden
//! class, so a property lives at the same offset in all of them. Inline
//! caches in the interpreter key on [`ShapeId`] and remember that offset.

use std::collections::HashMap;
use std::rc::Rc;

/// Identifier of a hidden class in a [`ShapeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub u32);

impl ShapeId {
    /// The shape with no properties.
    pub const EMPTY: ShapeId = ShapeId(0);
}

/// A property descriptor for a hidden class.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    /// Name of the property
    pub name: Rc<str>,
    /// Offset in the owning object's value vector
    pub offset: u32,
}

/// One shape: an ordered property list plus outgoing transitions.
#[derive(Debug, Default)]
pub struct HiddenClass {
    /// Properties in insertion order
    pub properties: Vec<PropertyDescriptor>,
    index: HashMap<Rc<str>, u32>,
    transitions: HashMap<Rc<str>, ShapeId>,
}

impl HiddenClass {
    /// Looks up a property by name and returns its offset.
    pub fn lookup_property(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// True when the shape has no properties.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Owner of every hidden class in one heap.
///
/// # Example
///
/// ```
/// use memory_manager::{ShapeId, ShapeTable};
///
/// let mut shapes = ShapeTable::new();
/// let with_x = shapes.add_property(ShapeId::EMPTY, "x");
/// let with_xy = shapes.add_property(with_x, "y");
///
/// assert_eq!(shapes.lookup(with_xy, "x"), Some(0));
/// assert_eq!(shapes.lookup(with_xy, "y"), Some(1));
/// // Same insertion order, same shape.
/// assert_eq!(shapes.add_property(ShapeId::EMPTY, "x"), with_x);
/// ```
#[derive(Debug)]
pub struct ShapeTable {
    classes: Vec<HiddenClass>,
}

impl ShapeTable {
    /// Creates a table holding only the empty shape.
    pub fn new() -> Self {
        ShapeTable {
            classes: vec![HiddenClass::default()],
        }
    }

    /// Returns the hidden class for an id.
    ///
    /// # Panics
    ///
    /// Panics on ids not issued by this table.
    pub fn get(&self, id: ShapeId) -> &HiddenClass {
        &self.classes[id.0 as usize]
    }

    /// Offset of `name` in shape `id`.
    pub fn lookup(&self, id: ShapeId, name: &str) -> Option<u32> {
        self.get(id).lookup_property(name)
    }

    /// Shape reached from `id` by appending `name`.
    ///
    /// Repeated transitions with the same name return the same id. Adding a
    /// name the shape already has returns `id` unchanged.
    pub fn add_property(&mut self, id: ShapeId, name: &str) -> ShapeId {
        let from = self.get(id);
        if from.lookup_property(name).is_some() {
            return id;
        }
        if let Some(&next) = from.transitions.get(name) {
            return next;
        }

        let name: Rc<str> = Rc::from(name);
        let offset = from.properties.len() as u32;
        let mut properties = from.properties.clone();
        let mut index = from.index.clone();
        properties.push(PropertyDescriptor {
            name: name.clone(),
            offset,
        });
        index.insert(name.clone(), offset);

        let next = ShapeId(self.classes.len() as u32);
        self.classes.push(HiddenClass {
            properties,
            index,
            transitions: HashMap::new(),
        });
        self.classes[id.0 as usize].transitions.insert(name, next);
        next
    }

    /// Shape with `name` removed, rebuilt through the transition tree so
    /// that equal property orders still share shapes.
    ///
    /// Offsets after the removed property shift down by one.
    pub fn remove_property(&mut self, id: ShapeId, name: &str) -> ShapeId {
        if self.lookup(id, name).is_none() {
            return id;
        }
        let remaining: Vec<Rc<str>> = self
            .get(id)
            .properties
            .iter()
            .filter(|p| &*p.name != name)
            .map(|p| p.name.clone())
            .collect();
        remaining
            .iter()
            .fold(ShapeId::EMPTY, |shape, prop| self.add_property(shape, prop))
    }

    /// Property names of a shape in insertion order.
    pub fn property_names(&self, id: ShapeId) -> impl Iterator<Item = &Rc<str>> {
        self.get(id).properties.iter().map(|p| &p.name)
    }

    /// Number of shapes created so far.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Always false: the empty shape exists from the start.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for ShapeTable {
    fn default() -> Self {
        Self::new()
    }
}
