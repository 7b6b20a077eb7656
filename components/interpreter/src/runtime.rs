//! Runtime helper library
//!
//! Slow paths of every instruction that cannot be finished inline: generic
//! coercions, operators on non-numeric operands, property access, name
//! resolution and calls. Each helper takes the engine first and follows the
//! exception protocol: on failure it raises through
//! [`Engine::throw_value`] and returns a neutral value that the caller
//! discards after checking [`Engine::has_exception`].
//!
//! The same helpers back the `extern "C"` entry points in [`crate::abi`],
//! so generated code and the dispatch loop observe identical semantics.
//!
//! Values passed in are assumed to be rooted by the caller. Helpers that
//! keep an intermediate value alive across an allocation or a call push it
//! onto the engine's scratch roots.

use std::rc::Rc;

use bytecode_system::CompareOp;
use core_types::{
    arith::{self, BitOp},
    array_index_from_name, number_to_string, string_to_number, to_int32, to_uint32, ErrorKind,
    GcRef, Value,
};
use memory_manager::{JsObject, JsString, Managed, ObjectClass, PreferredType, Primitive};

use crate::context::{Binding, ContextKind, ContextRef, ExecutionContext, FunctionCode};
use crate::engine::Engine;
use crate::function::{ArgumentsObject, FunctionKind, FunctionObject};

// --------------------------------------------------------------------
// Rooting

pub(crate) fn with_rooted<R>(engine: &mut Engine, values: &[Value], f: impl FnOnce(&mut Engine) -> R) -> R {
    let mark = engine.roots.scratch.len();
    engine.roots.scratch.extend_from_slice(values);
    let result = f(engine);
    engine.roots.scratch.truncate(mark);
    result
}

// --------------------------------------------------------------------
// Conversions

/// True if `value` is a function object.
pub fn is_callable(engine: &Engine, value: Value) -> bool {
    value
        .as_managed()
        .and_then(|r| engine.heap.get(r))
        .is_some_and(|o| o.is_callable())
}

/// ToBoolean.
pub fn to_boolean(engine: &Engine, value: Value) -> bool {
    match value.primitive_to_boolean() {
        Some(b) => b,
        None => engine.string_contents(value).is_some_and(|s| !s.is_empty()),
    }
}

/// ToNumber. Objects go through the default-value protocol and may run
/// script code.
pub fn to_number(engine: &mut Engine, value: Value) -> f64 {
    if let Some(n) = value.primitive_to_number() {
        return n;
    }
    if let Some(text) = engine.string_contents(value) {
        return string_to_number(text);
    }
    let primitive = to_primitive(engine, value, PreferredType::Number);
    if engine.has_exception() {
        return f64::NAN;
    }
    match primitive.primitive_to_number() {
        Some(n) => n,
        None => engine.string_contents(primitive).map_or(f64::NAN, string_to_number),
    }
}

/// ToPrimitive. Calls `valueOf`/`toString` in hint order before falling
/// back to the object's own default value.
pub fn to_primitive(engine: &mut Engine, value: Value, hint: PreferredType) -> Value {
    let Some(r) = value.as_managed() else {
        return value;
    };
    let order = match hint {
        PreferredType::String => ["toString", "valueOf"],
        PreferredType::Number | PreferredType::Default => ["valueOf", "toString"],
    };
    for name in order {
        let Some(method) = engine.heap.get_property(r, name) else {
            continue;
        };
        if !is_callable(engine, method) {
            continue;
        }
        let result = call_value(engine, method, value, &[]);
        if engine.has_exception() {
            return Value::Undefined;
        }
        if !result.is_managed() {
            return result;
        }
    }

    let is_error = engine
        .heap
        .get_as::<JsObject>(r)
        .is_some_and(|o| o.class() == ObjectClass::Error);
    if is_error {
        let text = error_text(engine, r);
        return engine.new_string(&text);
    }
    let fallback = match engine.heap.get(r) {
        Some(object) => object.default_value(hint),
        None => Primitive::Number(f64::NAN),
    };
    match fallback {
        Primitive::Number(n) => Value::from_number(n),
        Primitive::Text(text) => engine.new_string(&text),
    }
}

/// "Name: message" rendering of an error object.
fn error_text(engine: &Engine, r: GcRef) -> String {
    let text = |name: &str| {
        engine
            .heap
            .get_property(r, name)
            .and_then(|v| engine.string_contents(v))
            .unwrap_or_default()
            .to_string()
    };
    let name = text("name");
    let message = text("message");
    match (name.is_empty(), message.is_empty()) {
        (true, true) => "Error".to_string(),
        (false, true) => name,
        (true, false) => format!("Error: {message}"),
        (false, false) => format!("{name}: {message}"),
    }
}

fn primitive_text(engine: &Engine, value: Value) -> Option<String> {
    Some(match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Int32(n) => n.to_string(),
        Value::Double(n) => number_to_string(n),
        Value::String(_) => engine.string_contents(value)?.to_string(),
        Value::Managed(_) => return None,
    })
}

/// ToString as a string value.
pub fn to_string_value(engine: &mut Engine, value: Value) -> Value {
    match value {
        Value::String(_) => value,
        Value::Undefined => engine.static_string("undefined"),
        Value::Null => engine.static_string("null"),
        Value::Boolean(true) => engine.static_string("true"),
        Value::Boolean(false) => engine.static_string("false"),
        Value::Int32(_) | Value::Double(_) => {
            let text = primitive_text(engine, value).unwrap_or_default();
            engine.new_string(&text)
        }
        Value::Managed(_) => {
            let primitive = to_primitive(engine, value, PreferredType::String);
            if engine.has_exception() {
                return Value::Undefined;
            }
            to_string_value(engine, primitive)
        }
    }
}

/// ToString as host text. `None` when the conversion threw.
pub fn to_rust_string(engine: &mut Engine, value: Value) -> Option<String> {
    if let Some(text) = primitive_text(engine, value) {
        return Some(text);
    }
    let primitive = to_primitive(engine, value, PreferredType::String);
    if engine.has_exception() {
        return None;
    }
    primitive_text(engine, primitive)
}

/// Text for diagnostics. Never runs script code.
pub fn describe(engine: &Engine, value: Value) -> String {
    if let Some(text) = primitive_text(engine, value) {
        return text;
    }
    let Some(r) = value.as_managed() else {
        return String::new();
    };
    if let Some(object) = engine.heap.get_as::<JsObject>(r) {
        if object.class() == ObjectClass::Error {
            return error_text(engine, r);
        }
    }
    match engine.heap.get(r).map(|o| o.default_value(PreferredType::String)) {
        Some(Primitive::Text(text)) => text,
        Some(Primitive::Number(n)) => number_to_string(n),
        None => "[object]".to_string(),
    }
}

/// Property key of a computed member access.
pub fn to_property_key(engine: &mut Engine, key: Value) -> Option<String> {
    match key {
        Value::Int32(n) => Some(n.to_string()),
        _ => to_rust_string(engine, key),
    }
}

// --------------------------------------------------------------------
// Arithmetic

/// `lhs + rhs` including string concatenation.
pub fn add(engine: &mut Engine, lhs: Value, rhs: Value) -> Value {
    if let Some(sum) = arith::add(lhs, rhs) {
        return sum;
    }
    let l = to_primitive(engine, lhs, PreferredType::Default);
    if engine.has_exception() {
        return Value::Undefined;
    }
    let r = with_rooted(engine, &[l], |engine| to_primitive(engine, rhs, PreferredType::Default));
    if engine.has_exception() {
        return Value::Undefined;
    }
    if l.is_string() || r.is_string() {
        let mut text = primitive_text(engine, l).unwrap_or_default();
        text.push_str(&primitive_text(engine, r).unwrap_or_default());
        return with_rooted(engine, &[l, r], |engine| engine.new_string(&text));
    }
    let a = to_number(engine, l);
    let b = to_number(engine, r);
    Value::from_number(a + b)
}

fn numeric(
    engine: &mut Engine,
    lhs: Value,
    rhs: Value,
    op: fn(Value, Value) -> Option<Value>,
) -> Value {
    if let Some(result) = op(lhs, rhs) {
        return result;
    }
    let a = to_number(engine, lhs);
    if engine.has_exception() {
        return Value::Undefined;
    }
    let b = to_number(engine, rhs);
    if engine.has_exception() {
        return Value::Undefined;
    }
    op(Value::from_number(a), Value::from_number(b)).unwrap_or(Value::Double(f64::NAN))
}

/// `lhs - rhs`.
pub fn sub(engine: &mut Engine, lhs: Value, rhs: Value) -> Value {
    numeric(engine, lhs, rhs, arith::sub)
}

/// `lhs * rhs`.
pub fn mul(engine: &mut Engine, lhs: Value, rhs: Value) -> Value {
    numeric(engine, lhs, rhs, arith::mul)
}

/// `lhs / rhs`.
pub fn div(engine: &mut Engine, lhs: Value, rhs: Value) -> Value {
    numeric(engine, lhs, rhs, arith::div)
}

/// `lhs % rhs`.
pub fn rem(engine: &mut Engine, lhs: Value, rhs: Value) -> Value {
    numeric(engine, lhs, rhs, arith::rem)
}

/// Bitwise and shift operators.
pub fn bitwise(engine: &mut Engine, op: BitOp, lhs: Value, rhs: Value) -> Value {
    if let (Value::Int32(a), Value::Int32(b)) = (lhs, rhs) {
        return arith::bitwise(op, a as f64, b as f64);
    }
    let a = to_number(engine, lhs);
    if engine.has_exception() {
        return Value::Undefined;
    }
    let b = to_number(engine, rhs);
    if engine.has_exception() {
        return Value::Undefined;
    }
    arith::bitwise(op, a, b)
}

fn unary(engine: &mut Engine, operand: Value, op: fn(Value) -> Option<Value>) -> Value {
    if let Some(result) = op(operand) {
        return result;
    }
    let n = to_number(engine, operand);
    if engine.has_exception() {
        return Value::Undefined;
    }
    op(Value::from_number(n)).unwrap_or(Value::Double(f64::NAN))
}

/// Unary `-`.
pub fn negate(engine: &mut Engine, operand: Value) -> Value {
    unary(engine, operand, arith::negate)
}

/// `++` on the numeric value.
pub fn increment(engine: &mut Engine, operand: Value) -> Value {
    unary(engine, operand, arith::increment)
}

/// `--` on the numeric value.
pub fn decrement(engine: &mut Engine, operand: Value) -> Value {
    unary(engine, operand, arith::decrement)
}

/// Unary `+`.
pub fn plus(engine: &mut Engine, operand: Value) -> Value {
    if operand.is_number() {
        return operand;
    }
    let n = to_number(engine, operand);
    Value::from_number(n)
}

/// Unary `~`.
pub fn complement(engine: &mut Engine, operand: Value) -> Value {
    if let Value::Int32(n) = operand {
        return Value::Int32(!n);
    }
    let n = to_number(engine, operand);
    Value::Int32(!to_int32(n))
}

// --------------------------------------------------------------------
// Comparison

/// `===`.
pub fn strict_equals(engine: &Engine, lhs: Value, rhs: Value) -> bool {
    if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
        return a == b;
    }
    if lhs.is_string() && rhs.is_string() {
        return lhs == rhs || engine.string_contents(lhs) == engine.string_contents(rhs);
    }
    lhs == rhs
}

fn same_type(lhs: Value, rhs: Value) -> bool {
    std::mem::discriminant(&lhs) == std::mem::discriminant(&rhs) || (lhs.is_number() && rhs.is_number())
}

/// `==`.
pub fn loose_equals(engine: &mut Engine, lhs: Value, rhs: Value) -> bool {
    if same_type(lhs, rhs) {
        return strict_equals(engine, lhs, rhs);
    }
    match (lhs, rhs) {
        (a, b) if a.is_null_or_undefined() && b.is_null_or_undefined() => true,
        (a, b) if a.is_null_or_undefined() || b.is_null_or_undefined() => false,
        (Value::Boolean(_), other) => {
            let n = Value::from_number(to_number(engine, lhs));
            loose_equals(engine, n, other)
        }
        (other, Value::Boolean(_)) => {
            let n = Value::from_number(to_number(engine, rhs));
            loose_equals(engine, other, n)
        }
        (a, b) if a.is_number() && b.is_string() => a.as_number() == Some(to_number(engine, b)),
        (a, b) if a.is_string() && b.is_number() => Some(to_number(engine, a)) == b.as_number(),
        (Value::Managed(_), other) => {
            let primitive = to_primitive(engine, lhs, PreferredType::Default);
            !engine.has_exception() && loose_equals(engine, primitive, other)
        }
        (other, Value::Managed(_)) => {
            let primitive = to_primitive(engine, rhs, PreferredType::Default);
            !engine.has_exception() && loose_equals(engine, other, primitive)
        }
        _ => false,
    }
}

/// Evaluates `lhs op rhs`. Relational comparisons involving NaN are false.
pub fn compare(engine: &mut Engine, op: CompareOp, lhs: Value, rhs: Value) -> bool {
    match op {
        CompareOp::Eq => return loose_equals(engine, lhs, rhs),
        CompareOp::Ne => return !loose_equals(engine, lhs, rhs),
        CompareOp::StrictEq => return strict_equals(engine, lhs, rhs),
        CompareOp::StrictNe => return !strict_equals(engine, lhs, rhs),
        _ => {}
    }
    if let (Value::Int32(a), Value::Int32(b)) = (lhs, rhs) {
        return relational(op, a.cmp(&b));
    }
    let l = to_primitive(engine, lhs, PreferredType::Number);
    if engine.has_exception() {
        return false;
    }
    let r = with_rooted(engine, &[l], |engine| to_primitive(engine, rhs, PreferredType::Number));
    if engine.has_exception() {
        return false;
    }
    if let (Some(a), Some(b)) = (engine.string_contents(l), engine.string_contents(r)) {
        return relational(op, a.encode_utf16().cmp(b.encode_utf16()));
    }
    let a = to_number(engine, l);
    let b = to_number(engine, r);
    match a.partial_cmp(&b) {
        Some(ordering) => relational(op, ordering),
        None => false,
    }
}

fn relational(op: CompareOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CompareOp::Lt => ordering == Less,
        CompareOp::Le => ordering != Greater,
        CompareOp::Gt => ordering == Greater,
        CompareOp::Ge => ordering != Less,
        CompareOp::Eq | CompareOp::StrictEq => ordering == Equal,
        CompareOp::Ne | CompareOp::StrictNe => ordering != Equal,
    }
}

/// `typeof value` as a string value.
pub fn type_of(engine: &mut Engine, value: Value) -> Value {
    let name = if is_callable(engine, value) {
        "function"
    } else {
        value.type_of()
    };
    engine.static_string(name)
}

/// `lhs instanceof rhs`.
pub fn instance_of(engine: &mut Engine, lhs: Value, rhs: Value) -> bool {
    let Some(constructor) = rhs.as_managed().filter(|_| is_callable(engine, rhs)) else {
        engine.throw_error(ErrorKind::TypeError, "Right-hand side of 'instanceof' is not callable");
        return false;
    };
    let Some(prototype) = engine.heap.get_property(constructor, "prototype").and_then(|v| v.as_managed()) else {
        engine.throw_error(
            ErrorKind::TypeError,
            "Function has non-object prototype in instanceof check",
        );
        return false;
    };
    let Some(object) = lhs.as_managed() else {
        return false;
    };
    let mut current = engine.heap.prototype_of(object);
    while let Some(proto) = current {
        if proto == prototype {
            return true;
        }
        current = engine.heap.prototype_of(proto);
    }
    false
}

/// `key in object`.
pub fn has_property_op(engine: &mut Engine, key: Value, object: Value) -> bool {
    let Some(r) = object.as_managed() else {
        let message = format!(
            "Cannot use 'in' operator to search for '{}' in {}",
            describe(engine, key),
            describe(engine, object)
        );
        engine.throw_error(ErrorKind::TypeError, &message);
        return false;
    };
    let Some(name) = to_property_key(engine, key) else {
        return false;
    };
    if let Some(index) = array_index_from_name(&name) {
        if engine.heap.get(r).and_then(|o| o.get_index(index)).is_some() {
            return true;
        }
        if let Some(args) = engine.heap.get_as::<ArgumentsObject>(r) {
            let context = args.context();
            if engine
                .heap
                .get_as::<ExecutionContext>(context)
                .is_some_and(|c| (index as usize) < c.argc())
            {
                return true;
            }
        }
    }
    if name == "length" && has_length(engine, r) {
        return true;
    }
    engine.heap.has_property(r, &name)
}

fn has_length(engine: &Engine, r: GcRef) -> bool {
    engine.heap.get_as::<ArgumentsObject>(r).is_some()
        || engine
            .heap
            .get_as::<JsObject>(r)
            .is_some_and(|o| o.class() == ObjectClass::Array)
}

// --------------------------------------------------------------------
// Property access

/// `object.name`.
pub fn get_property(engine: &mut Engine, object: Value, name: &str) -> Value {
    match object {
        Value::Undefined | Value::Null => {
            let message = format!("Cannot read property '{}' of {}", name, describe(engine, object));
            engine.throw_error(ErrorKind::TypeError, &message)
        }
        Value::Managed(r) => get_object_property(engine, r, name),
        Value::String(_) => get_string_property(engine, object, name),
        _ => Value::Undefined,
    }
}

fn get_string_property(engine: &mut Engine, string: Value, name: &str) -> Value {
    let Some(r) = string.as_string() else {
        return Value::Undefined;
    };
    let Some(text) = engine.heap.get_as::<JsString>(r) else {
        return Value::Undefined;
    };
    if name == "length" {
        return Value::Int32(text.length() as i32);
    }
    let Some(index) = array_index_from_name(name) else {
        return Value::Undefined;
    };
    let unit = text.as_str().encode_utf16().nth(index as usize);
    match unit {
        Some(unit) => {
            let character = String::from_utf16_lossy(&[unit]);
            engine.new_string(&character)
        }
        None => Value::Undefined,
    }
}

/// Named or indexed property of an object, following prototypes.
pub fn get_object_property(engine: &mut Engine, r: GcRef, name: &str) -> Value {
    if let Some(index) = array_index_from_name(name) {
        if let Some(value) = engine.heap.get(r).and_then(|o| o.get_index(index)) {
            return value;
        }
        if let Some(value) = argument_slot(engine, r, index) {
            return value;
        }
    }
    if name == "length" {
        if let Some(length) = intrinsic_length(engine, r) {
            return Value::from_number(f64::from(length));
        }
    }
    engine.heap.get_property(r, name).unwrap_or(Value::Undefined)
}

fn argument_slot(engine: &Engine, r: GcRef, index: u32) -> Option<Value> {
    let context = engine.heap.get_as::<ArgumentsObject>(r)?.context();
    let context = engine.heap.get_as::<ExecutionContext>(context)?;
    ((index as usize) < context.argc().max(context.arguments().len()))
        .then(|| context.argument(index as usize))
}

fn intrinsic_length(engine: &Engine, r: GcRef) -> Option<u32> {
    if let Some(object) = engine.heap.get_as::<JsObject>(r) {
        return (object.class() == ObjectClass::Array).then(|| object.length());
    }
    let context = engine.heap.get_as::<ArgumentsObject>(r)?.context();
    if engine.heap.has_own_property(r, "length") {
        return None;
    }
    engine
        .heap
        .get_as::<ExecutionContext>(context)
        .map(|c| c.argc() as u32)
}

/// `object[key]`.
pub fn get_element(engine: &mut Engine, object: Value, key: Value) -> Value {
    if let (Value::Managed(r), Value::Int32(i)) = (object, key) {
        if i >= 0 {
            if let Some(value) = engine.heap.get(r).and_then(|o| o.get_index(i as u32)) {
                return value;
            }
        }
    }
    let Some(name) = to_property_key(engine, key) else {
        return Value::Undefined;
    };
    get_property(engine, object, &name)
}

/// `object.name = value`.
pub fn set_property(engine: &mut Engine, object: Value, name: &str, value: Value) {
    match object {
        Value::Undefined | Value::Null => {
            let message = format!("Cannot set property '{}' of {}", name, describe(engine, object));
            engine.throw_error(ErrorKind::TypeError, &message);
        }
        Value::Managed(r) => put_object_property(engine, r, name, value),
        _ => {}
    }
}

/// Writes an own property, handling array length and indexed elements.
pub fn put_object_property(engine: &mut Engine, r: GcRef, name: &str, value: Value) {
    let is_array = engine
        .heap
        .get_as::<JsObject>(r)
        .is_some_and(|o| o.class() == ObjectClass::Array);
    if is_array && name == "length" {
        let n = to_number(engine, value);
        if engine.has_exception() {
            return;
        }
        if to_uint32(n) as f64 != n {
            engine.throw_error(ErrorKind::RangeError, "Invalid array length");
            return;
        }
        let length = n as u32;
        if let Some(array) = engine.heap.get_as_mut::<JsObject>(r) {
            array.set_length(length);
        }
        let stale: Vec<String> = engine
            .heap
            .own_property_names(r)
            .into_iter()
            .filter(|key| array_index_from_name(key).is_some_and(|index| index >= length))
            .collect();
        for key in stale {
            engine.heap.delete_property(r, &key);
        }
        return;
    }
    if let Some(index) = array_index_from_name(name) {
        if engine.heap.get_mut(r).is_some_and(|o| o.put_index(index, value)) {
            return;
        }
        if is_array {
            if let Some(array) = engine.heap.get_as_mut::<JsObject>(r) {
                array.note_index(index);
            }
        }
        let context = engine.heap.get_as::<ArgumentsObject>(r).map(ArgumentsObject::context);
        if let Some(context) = context {
            if let Some(context) = engine.heap.get_as_mut::<ExecutionContext>(context) {
                if (index as usize) < context.arguments().len() {
                    context.set_argument(index as usize, value);
                    return;
                }
            }
        }
    }
    engine.heap.put_property(r, name, value);
}

/// `object[key] = value`.
pub fn set_element(engine: &mut Engine, object: Value, key: Value, value: Value) {
    if let (Value::Managed(r), Value::Int32(i)) = (object, key) {
        if i >= 0 && engine.heap.get_mut(r).is_some_and(|o| o.put_index(i as u32, value)) {
            return;
        }
    }
    let Some(name) = to_property_key(engine, key) else {
        return;
    };
    set_property(engine, object, &name, value);
}

/// `delete object.name`.
pub fn delete_property(engine: &mut Engine, object: Value, name: &str) -> bool {
    match object {
        Value::Undefined | Value::Null => {
            engine.throw_error(ErrorKind::TypeError, "Cannot convert undefined or null to object");
            false
        }
        Value::Managed(r) => {
            if let Some(index) = array_index_from_name(name) {
                if let Some(object) = engine.heap.get_as_mut::<JsObject>(r) {
                    if (index as usize) < object.elements().len() {
                        object.put_index(index, Value::Undefined);
                        return true;
                    }
                }
            }
            engine.heap.delete_property(r, name);
            true
        }
        _ => true,
    }
}

/// `delete name`. Declared variables cannot be deleted.
pub fn delete_name(engine: &mut Engine, name: &str) -> bool {
    match resolve(engine, name) {
        Some(Binding::WithObject(object)) | Some(Binding::Global(object)) => {
            engine.heap.delete_property(object, name);
            true
        }
        Some(_) => false,
        None => true,
    }
}

// --------------------------------------------------------------------
// Names

fn current_context(engine: &Engine) -> ContextRef {
    engine
        .roots
        .current
        .unwrap_or(ContextRef::Heap(engine.roots.global_context))
}

fn declared_slot(engine: &Engine, code: FunctionCode, name: &str) -> Option<(bool, usize)> {
    let unit = engine.units.get(code.unit)?;
    let function = unit.unit.functions.get(code.function as usize)?;
    if let Some(i) = function.locals.iter().position(|n| unit.name(*n) == name) {
        return Some((true, i));
    }
    // Later formals shadow earlier ones with the same name.
    function
        .formals
        .iter()
        .rposition(|n| unit.name(*n) == name)
        .map(|i| (false, i))
}

/// Walks the scope chain for `name`.
pub fn resolve(engine: &Engine, name: &str) -> Option<Binding> {
    let mut cursor = Some(current_context(engine));
    while let Some(r) = cursor {
        let context = engine.context(r)?;
        match context.kind() {
            ContextKind::With => {
                if let Some(object) = context.object() {
                    if engine.heap.has_property(object, name) || has_indexed(engine, object, name) {
                        return Some(Binding::WithObject(object));
                    }
                }
            }
            ContextKind::Catch => {
                if context.catch_name() == Some(name) {
                    return Some(Binding::Catch(r));
                }
            }
            ContextKind::Call => {
                if let Some(code) = context.code() {
                    match declared_slot(engine, code, name) {
                        Some((true, i)) => return Some(Binding::Local(r, i)),
                        Some((false, i)) => return Some(Binding::Argument(r, i)),
                        None => {}
                    }
                }
            }
            ContextKind::Global => {
                if let Some(object) = context.object() {
                    if engine.heap.has_property(object, name) {
                        return Some(Binding::Global(object));
                    }
                }
            }
        }
        cursor = context.outer();
    }
    None
}

fn has_indexed(engine: &Engine, object: GcRef, name: &str) -> bool {
    (name == "length" && has_length(engine, object))
        || array_index_from_name(name)
            .and_then(|i| engine.heap.get(object)?.get_index(i))
            .is_some()
}

fn read_binding(engine: &mut Engine, binding: Binding, name: &str) -> Value {
    match binding {
        Binding::Local(r, i) => engine.context(r).map_or(Value::Undefined, |c| c.local(i)),
        Binding::Argument(r, i) => engine.context(r).map_or(Value::Undefined, |c| c.argument(i)),
        Binding::Catch(r) => engine.context(r).map_or(Value::Undefined, |c| c.catch_value()),
        Binding::WithObject(object) | Binding::Global(object) => get_object_property(engine, object, name),
    }
}

fn not_defined(engine: &mut Engine, name: &str) -> Value {
    engine.throw_error(ErrorKind::ReferenceError, &format!("{name} is not defined"))
}

/// Reads a variable by name.
pub fn load_name(engine: &mut Engine, name: &str) -> Value {
    match resolve(engine, name) {
        Some(binding) => read_binding(engine, binding, name),
        None => not_defined(engine, name),
    }
}

/// Assigns a variable by name. Sloppy-mode assignment to an undeclared
/// name creates a global.
pub fn store_name(engine: &mut Engine, name: &str, value: Value) {
    match resolve(engine, name) {
        Some(Binding::Local(r, i)) => {
            if let Some(context) = engine.context_mut(r) {
                context.set_local(i, value);
            }
        }
        Some(Binding::Argument(r, i)) => {
            if let Some(context) = engine.context_mut(r) {
                context.set_argument(i, value);
            }
        }
        Some(Binding::Catch(r)) => {
            if let Some(context) = engine.context_mut(r) {
                context.set_catch_value(value);
            }
        }
        Some(Binding::WithObject(object)) | Some(Binding::Global(object)) => {
            put_object_property(engine, object, name, value);
        }
        None if engine.current_strict() => {
            not_defined(engine, name);
        }
        None => {
            let global = engine.roots.global_object;
            engine.heap.put_property(global, name, value);
        }
    }
}

/// `typeof name`; undeclared names give "undefined".
pub fn type_of_name(engine: &mut Engine, name: &str) -> Value {
    match resolve(engine, name) {
        Some(binding) => {
            let value = read_binding(engine, binding, name);
            if engine.has_exception() {
                return Value::Undefined;
            }
            type_of(engine, value)
        }
        None => engine.static_string("undefined"),
    }
}

/// `name(args)`. A function found on a `with` object is called with that
/// object as `this`.
pub fn call_name(engine: &mut Engine, name: &str, args: &[Value]) -> Value {
    let Some(binding) = resolve(engine, name) else {
        return not_defined(engine, name);
    };
    let function = read_binding(engine, binding, name);
    if engine.has_exception() {
        return Value::Undefined;
    }
    let this = match binding {
        Binding::WithObject(object) => Value::Managed(object),
        _ => Value::Undefined,
    };
    if !is_callable(engine, function) {
        let message = format!("{name} is not a function");
        return engine.throw_error(ErrorKind::TypeError, &message);
    }
    call_value(engine, function, this, args)
}

// --------------------------------------------------------------------
// Calls

/// Calls `function` with `this` and `args`.
pub fn call_value(engine: &mut Engine, function: Value, this: Value, args: &[Value]) -> Value {
    let kind = function
        .as_managed()
        .and_then(|r| engine.heap.get_as::<FunctionObject>(r))
        .map(|f| f.kind().clone());
    match kind {
        Some(FunctionKind::Script { code, scope }) => {
            engine.invoke_script(function, code, scope, this, args.to_vec())
        }
        Some(FunctionKind::Native { function: native, .. }) => {
            let mut rooted = Vec::with_capacity(args.len() + 2);
            rooted.push(function);
            rooted.push(this);
            rooted.extend_from_slice(args);
            with_rooted(engine, &rooted, |engine| {
                let result = native(engine, this, args);
                if engine.has_exception() {
                    Value::Undefined
                } else {
                    result
                }
            })
        }
        None => {
            let message = format!("{} is not a function", describe(engine, function));
            engine.throw_error(ErrorKind::TypeError, &message)
        }
    }
}

/// `base.name(args)`.
pub fn call_property(engine: &mut Engine, base: Value, name: &str, args: &[Value]) -> Value {
    let function = get_property(engine, base, name);
    if engine.has_exception() {
        return Value::Undefined;
    }
    if !is_callable(engine, function) {
        let message = format!(
            "Property '{}' of object {} is not a function",
            name,
            describe(engine, base)
        );
        return engine.throw_error(ErrorKind::TypeError, &message);
    }
    call_value(engine, function, base, args)
}

/// `base[key](args)`.
pub fn call_element(engine: &mut Engine, base: Value, key: Value, args: &[Value]) -> Value {
    let Some(name) = to_property_key(engine, key) else {
        return Value::Undefined;
    };
    call_property(engine, base, &name, args)
}

/// `new function(args)`.
pub fn construct(engine: &mut Engine, function: Value, args: &[Value]) -> Value {
    let Some(r) = function.as_managed().filter(|_| is_callable(engine, function)) else {
        let message = format!("{} is not a constructor", describe(engine, function));
        return engine.throw_error(ErrorKind::TypeError, &message);
    };
    let prototype = engine
        .heap
        .get_property(r, "prototype")
        .and_then(|v| v.as_managed())
        .unwrap_or(engine.intrinsics.object_prototype);
    let this = Value::Managed(engine.alloc(JsObject::new(Some(prototype))));
    let result = with_rooted(engine, &[this], |engine| call_value(engine, function, this, args));
    if engine.has_exception() {
        return Value::Undefined;
    }
    if result.is_managed() {
        result
    } else {
        this
    }
}

// --------------------------------------------------------------------
// Object creation

/// Closure over function `index` of the running unit in the current
/// context.
pub fn create_closure(engine: &mut Engine, index: u32) -> Value {
    let Some(frame) = engine.roots.frames.last() else {
        return Value::Undefined;
    };
    let code = FunctionCode {
        unit: frame.unit,
        function: index,
    };
    let name: Rc<str> = engine
        .units
        .get(code.unit)
        .map(|u| Rc::from(u.unit.function_name(index as usize)))
        .unwrap_or_else(|| Rc::from(""));
    let current = current_context(engine);
    let Some(scope) = engine.capture_context(current) else {
        return engine.throw_error(ErrorKind::InternalError, "closure scope is gone");
    };
    let intrinsics = engine.intrinsics;
    let scope_value = Value::Managed(scope);
    with_rooted(engine, &[scope_value], |engine| {
        let prototype = engine.alloc(JsObject::new(Some(intrinsics.object_prototype)));
        with_rooted(engine, &[Value::Managed(prototype)], |engine| {
            let function = engine.alloc(FunctionObject::script(
                code,
                scope,
                name,
                Some(intrinsics.function_prototype),
            ));
            engine.heap.put_property(function, "prototype", Value::Managed(prototype));
            engine.heap.put_property(prototype, "constructor", Value::Managed(function));
            Value::Managed(function)
        })
    })
}

/// `arguments` for the running call.
pub fn create_arguments_object(engine: &mut Engine) -> Value {
    let Some(frame) = engine.roots.frames.last() else {
        return Value::Undefined;
    };
    let context = frame.context;
    let Some(context) = engine.capture_context(context) else {
        return engine.throw_error(ErrorKind::InternalError, "call context is gone");
    };
    let prototype = engine.intrinsics.object_prototype;
    Value::Managed(engine.alloc(ArgumentsObject::new(context, Some(prototype))))
}

/// Array literal from already evaluated elements.
pub fn define_array(engine: &mut Engine, elements: Vec<Value>) -> Value {
    engine.new_array(elements)
}

/// Object literal from key names and already evaluated values.
pub fn define_object_literal(engine: &mut Engine, keys: &[Rc<str>], values: &[Value]) -> Value {
    with_rooted(engine, values, |engine| {
        let object = engine.new_object();
        if let Some(r) = object.as_managed() {
            with_rooted(engine, &[object], |engine| {
                for (key, value) in keys.iter().zip(values) {
                    put_object_property(engine, r, key, *value);
                }
            });
        }
        object
    })
}

// --------------------------------------------------------------------
// Contexts

/// Enters `with (object)`.
pub fn push_with_context(engine: &mut Engine, object: Value) {
    let Some(r) = object.as_managed() else {
        let message = if object.is_null_or_undefined() {
            "Cannot convert undefined or null to object".to_string()
        } else {
            format!("{} is not an object", describe(engine, object))
        };
        engine.throw_error(ErrorKind::TypeError, &message);
        return;
    };
    let outer = current_context(engine);
    engine.enter_context(ExecutionContext::with(outer, r));
}

/// Enters `catch (name)` with the caught exception.
pub fn push_catch_context(engine: &mut Engine, name: Rc<str>, exception: Value) {
    let outer = current_context(engine);
    engine.enter_context(ExecutionContext::catch(outer, name, exception));
}

/// Leaves the innermost `with` or `catch` context.
pub fn pop_context(engine: &mut Engine) {
    engine.leave_context();
}
