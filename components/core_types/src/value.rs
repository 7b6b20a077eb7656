//! Tagged script value representation.
//!
//! [`Value`] is a small `Copy` sum type. Primitives are stored inline and
//! heap-resident entities (objects, strings) are referenced through a
//! [`GcRef`] handle. The bit-level NaN-boxed form used at the boundary with
//! generated code lives in [`crate::nanbox`].

use std::fmt;

use crate::GcRef;

/// Any script value.
///
/// The variant is the type: there is no external tag table, so every type
/// test is a single match.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// let int = Value::from_int32(42);
/// let double = Value::from_double(0.5);
///
/// assert!(int.is_int32());
/// assert!(double.is_number());
/// assert!(Value::undefined().is_null_or_undefined());
/// assert_eq!(Value::from_number(3.0), Value::Int32(3));
/// ```
#[derive(Clone, Copy)]
pub enum Value {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// `true` or `false`
    Boolean(bool),
    /// Integer fast-path representation
    Int32(i32),
    /// IEEE 754 double
    Double(f64),
    /// Reference to a managed heap object
    Managed(GcRef),
    /// Reference to a heap-resident string
    String(GcRef),
}

impl Value {
    /// The `undefined` value.
    pub const fn undefined() -> Self {
        Value::Undefined
    }

    /// The `null` value.
    pub const fn null() -> Self {
        Value::Null
    }

    /// Wraps a 32-bit integer.
    pub const fn from_int32(n: i32) -> Self {
        Value::Int32(n)
    }

    /// Wraps a double without normalizing it.
    pub const fn from_double(n: f64) -> Self {
        Value::Double(n)
    }

    /// Wraps a boolean.
    pub const fn from_boolean(b: bool) -> Self {
        Value::Boolean(b)
    }

    /// Wraps an object handle.
    pub const fn from_managed(r: GcRef) -> Self {
        Value::Managed(r)
    }

    /// Wraps a string handle.
    pub const fn from_string(r: GcRef) -> Self {
        Value::String(r)
    }

    /// Wraps a number, using the int32 representation when it is exact.
    ///
    /// Negative zero stays a double so that its sign survives.
    pub fn from_number(n: f64) -> Self {
        let truncated = n as i32;
        if truncated as f64 == n && !(n == 0.0 && n.is_sign_negative()) {
            Value::Int32(truncated)
        } else {
            Value::Double(n)
        }
    }

    /// True for `undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// True for `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for `null` and `undefined`.
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// True for booleans.
    pub fn is_boolean(&self) -> bool {
        matches!(self, Value::Boolean(_))
    }

    /// True for the int32 representation.
    pub fn is_int32(&self) -> bool {
        matches!(self, Value::Int32(_))
    }

    /// True for the double representation.
    pub fn is_double(&self) -> bool {
        matches!(self, Value::Double(_))
    }

    /// True for either numeric representation.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Double(_))
    }

    /// True for object references.
    pub fn is_managed(&self) -> bool {
        matches!(self, Value::Managed(_))
    }

    /// True for string references.
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// True for everything except objects.
    pub fn is_primitive(&self) -> bool {
        !self.is_managed()
    }

    /// Object handle, if this is an object.
    pub fn as_managed(&self) -> Option<GcRef> {
        match self {
            Value::Managed(r) => Some(*r),
            _ => None,
        }
    }

    /// String handle, if this is a string.
    pub fn as_string(&self) -> Option<GcRef> {
        match self {
            Value::String(r) => Some(*r),
            _ => None,
        }
    }

    /// Any heap handle carried by the value.
    pub fn heap_ref(&self) -> Option<GcRef> {
        match self {
            Value::Managed(r) | Value::String(r) => Some(*r),
            _ => None,
        }
    }

    /// Numeric value of a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int32(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }

    /// Number conversion for the inline primitives.
    ///
    /// Returns `None` for strings and objects, whose conversion needs the
    /// heap (string contents, or the default-value protocol).
    pub fn primitive_to_number(&self) -> Option<f64> {
        match self {
            Value::Undefined => Some(f64::NAN),
            Value::Null => Some(0.0),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int32(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            Value::Managed(_) | Value::String(_) => None,
        }
    }

    /// Boolean conversion for everything except strings.
    ///
    /// Strings need their length, so they return `None`. Objects are always
    /// true.
    pub fn primitive_to_boolean(&self) -> Option<bool> {
        match self {
            Value::Undefined | Value::Null => Some(false),
            Value::Boolean(b) => Some(*b),
            Value::Int32(n) => Some(*n != 0),
            Value::Double(n) => Some(!n.is_nan() && *n != 0.0),
            Value::Managed(_) => Some(true),
            Value::String(_) => None,
        }
    }

    /// `typeof` result, not distinguishing callable objects.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Int32(_) | Value::Double(_) => "number",
            Value::String(_) => "string",
            Value::Managed(_) => "object",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Undefined
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Boolean(b) => f.debug_tuple("Boolean").field(b).finish(),
            Value::Int32(n) => f.debug_tuple("Int32").field(n).finish(),
            Value::Double(n) => f.debug_tuple("Double").field(n).finish(),
            Value::Managed(r) => f.debug_tuple("Managed").field(r).finish(),
            Value::String(r) => f.debug_tuple("String").field(r).finish(),
        }
    }
}

/// Representation equality: same variant and same payload.
///
/// Doubles compare by bit pattern so that `NaN == NaN` here and `0.0` is
/// distinguished from `-0.0`. Script-level equality lives in the runtime.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Managed(a), Value::Managed(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}
