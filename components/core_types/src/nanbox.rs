//! NaN-boxed encoding of [`Value`] for the generated-code boundary.
//!
//! Inside the engine values are a plain enum. Natively generated code and
//! the `extern "C"` runtime entry points exchange them as a single `u64`:
//!
//! | top 16 bits      | meaning                         |
//! |------------------|---------------------------------|
//! | `< 0xFFF9`       | IEEE 754 double (NaN canonical) |
//! | `0xFFF9`         | undefined                       |
//! | `0xFFFA`         | null                            |
//! | `0xFFFB`         | boolean, payload bit 0          |
//! | `0xFFFC`         | int32, payload low 32 bits      |
//! | `0xFFFD`         | object, 48-bit [`GcRef`]        |
//! | `0xFFFE`         | string, 48-bit [`GcRef`]        |
//!
//! Every NaN is canonicalized to `0x7FF8_0000_0000_0000` on the way in, so
//! no double ever lands in the tagged range and the type is recoverable from
//! the bits alone.

use crate::{GcRef, Value};

const TAG_SHIFT: u32 = 48;
const PAYLOAD_MASK: u64 = (1 << TAG_SHIFT) - 1;

const TAG_FIRST: u64 = 0xFFF9;
const TAG_UNDEFINED: u64 = 0xFFF9;
const TAG_NULL: u64 = 0xFFFA;
const TAG_BOOLEAN: u64 = 0xFFFB;
const TAG_INT32: u64 = 0xFFFC;
const TAG_MANAGED: u64 = 0xFFFD;
const TAG_STRING: u64 = 0xFFFE;

/// Bit pattern of the canonical quiet NaN.
pub const CANONICAL_NAN: u64 = 0x7FF8_0000_0000_0000;

/// Boxed `undefined`, handy as a default return from generated code.
pub const UNDEFINED_BITS: u64 = TAG_UNDEFINED << TAG_SHIFT;

const fn tagged(tag: u64, payload: u64) -> u64 {
    (tag << TAG_SHIFT) | (payload & PAYLOAD_MASK)
}

impl Value {
    /// Encodes the value as a NaN-boxed word.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_types::Value;
    ///
    /// let bits = Value::Int32(-7).to_bits();
    /// assert_eq!(Value::from_bits(bits), Some(Value::Int32(-7)));
    /// assert_eq!(Value::Double(1.5).to_bits(), 1.5f64.to_bits());
    /// ```
    pub fn to_bits(self) -> u64 {
        match self {
            Value::Undefined => tagged(TAG_UNDEFINED, 0),
            Value::Null => tagged(TAG_NULL, 0),
            Value::Boolean(b) => tagged(TAG_BOOLEAN, b as u64),
            Value::Int32(n) => tagged(TAG_INT32, n as u32 as u64),
            Value::Double(d) if d.is_nan() => CANONICAL_NAN,
            Value::Double(d) => d.to_bits(),
            Value::Managed(r) => tagged(TAG_MANAGED, r.to_raw()),
            Value::String(r) => tagged(TAG_STRING, r.to_raw()),
        }
    }

    /// Decodes a NaN-boxed word.
    ///
    /// Returns `None` for bit patterns no encoder produces: an unused tag,
    /// or a boolean payload other than 0 or 1.
    pub fn from_bits(bits: u64) -> Option<Value> {
        let tag = bits >> TAG_SHIFT;
        if tag < TAG_FIRST {
            return Some(Value::Double(f64::from_bits(bits)));
        }
        let payload = bits & PAYLOAD_MASK;
        match tag {
            TAG_UNDEFINED => Some(Value::Undefined),
            TAG_NULL => Some(Value::Null),
            TAG_BOOLEAN if payload <= 1 => Some(Value::Boolean(payload == 1)),
            TAG_INT32 => Some(Value::Int32(payload as u32 as i32)),
            TAG_MANAGED => GcRef::from_raw(payload).map(Value::Managed),
            TAG_STRING => GcRef::from_raw(payload).map(Value::String),
            _ => None,
        }
    }
}
