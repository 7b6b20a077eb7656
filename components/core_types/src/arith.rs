//! Two-tier numeric fast paths.
//!
//! Each function returns `Some` when both operands are already numbers and
//! `None` when the generic runtime helper must take over (strings, objects,
//! booleans, `null`/`undefined`). When both operands are int32 and the
//! result fits, the result is int32; otherwise the operation is carried out
//! in double precision and an integral result other than `-0` is stored
//! back as int32, like [`Value::from_number`].

use crate::{to_int32, to_uint32, Value};

/// `lhs + rhs` on numbers.
///
/// # Examples
///
/// ```
/// use core_types::{arith, Value};
///
/// assert_eq!(arith::add(Value::Int32(2), Value::Int32(3)), Some(Value::Int32(5)));
/// assert_eq!(
///     arith::add(Value::Int32(i32::MAX), Value::Int32(1)),
///     Some(Value::Double(2147483648.0))
/// );
/// assert_eq!(arith::add(Value::Null, Value::Int32(1)), None);
/// ```
pub fn add(lhs: Value, rhs: Value) -> Option<Value> {
    match (lhs, rhs) {
        (Value::Int32(a), Value::Int32(b)) => Some(match a.checked_add(b) {
            Some(sum) => Value::Int32(sum),
            None => Value::Double(a as f64 + b as f64),
        }),
        _ => Some(Value::from_number(lhs.as_number()? + rhs.as_number()?)),
    }
}

/// `lhs - rhs` on numbers.
pub fn sub(lhs: Value, rhs: Value) -> Option<Value> {
    match (lhs, rhs) {
        (Value::Int32(a), Value::Int32(b)) => Some(match a.checked_sub(b) {
            Some(diff) => Value::Int32(diff),
            None => Value::Double(a as f64 - b as f64),
        }),
        _ => Some(Value::from_number(lhs.as_number()? - rhs.as_number()?)),
    }
}

/// `lhs * rhs` on numbers.
///
/// A zero product with a negative operand is `-0`, which int32 cannot hold.
pub fn mul(lhs: Value, rhs: Value) -> Option<Value> {
    match (lhs, rhs) {
        (Value::Int32(a), Value::Int32(b)) => Some(match a.checked_mul(b) {
            Some(0) if a < 0 || b < 0 => Value::Double(-0.0),
            Some(product) => Value::Int32(product),
            None => Value::Double(a as f64 * b as f64),
        }),
        _ => Some(Value::from_number(lhs.as_number()? * rhs.as_number()?)),
    }
}

/// `lhs / rhs` on numbers. Exact integral quotients come back as int32.
pub fn div(lhs: Value, rhs: Value) -> Option<Value> {
    Some(Value::from_number(lhs.as_number()? / rhs.as_number()?))
}

/// `lhs % rhs` on numbers, with the sign of the dividend.
pub fn rem(lhs: Value, rhs: Value) -> Option<Value> {
    match (lhs, rhs) {
        (Value::Int32(a), Value::Int32(b)) if b != 0 => Some(match a.checked_rem(b) {
            Some(0) if a < 0 => Value::Double(-0.0),
            Some(r) => Value::Int32(r),
            // i32::MIN % -1
            None => Value::Double(-0.0),
        }),
        _ => Some(Value::from_number(lhs.as_number()? % rhs.as_number()?)),
    }
}

/// Unary minus. Negating int32 zero or `i32::MIN` leaves the int32 range.
pub fn negate(operand: Value) -> Option<Value> {
    match operand {
        Value::Int32(0) => Some(Value::Double(-0.0)),
        Value::Int32(n) => Some(match n.checked_neg() {
            Some(neg) => Value::Int32(neg),
            None => Value::Double(-(n as f64)),
        }),
        Value::Double(d) => Some(Value::from_number(-d)),
        _ => None,
    }
}

/// `operand + 1` on numbers.
pub fn increment(operand: Value) -> Option<Value> {
    add(operand, Value::Int32(1))
}

/// `operand - 1` on numbers.
pub fn decrement(operand: Value) -> Option<Value> {
    sub(operand, Value::Int32(1))
}

/// Bitwise operators over the int32 conversion of their operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `>>>`
    UShr,
}

/// Applies a bitwise operator to two numbers.
pub fn bitwise(op: BitOp, lhs: f64, rhs: f64) -> Value {
    let a = to_int32(lhs);
    let shift = to_uint32(rhs) & 0x1f;
    match op {
        BitOp::And => Value::Int32(a & to_int32(rhs)),
        BitOp::Or => Value::Int32(a | to_int32(rhs)),
        BitOp::Xor => Value::Int32(a ^ to_int32(rhs)),
        BitOp::Shl => Value::Int32(a.wrapping_shl(shift)),
        BitOp::Shr => Value::Int32(a >> shift),
        BitOp::UShr => Value::from_number((to_uint32(lhs) >> shift) as f64),
    }
}
