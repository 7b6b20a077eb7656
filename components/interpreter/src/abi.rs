//! Runtime-call ABI for generated code
//!
//! `extern "C"` entry points over the runtime helper library. Values cross
//! the boundary NaN-boxed as `u64` (see [`core_types::nanbox`]); a word no
//! encoder produces is read as `undefined`. Every function takes the
//! engine pointer first and follows the same exception contract as the
//! interpreter: after a call, generated code checks [`rt_has_exception`]
//! and, when set, branches to its handler or returns to its caller.
//!
//! Operands must be reachable from the engine's roots (generated code keeps
//! them in the frame's register window) because a helper may collect.

#![allow(unsafe_code)]

use core_types::nanbox::UNDEFINED_BITS;
use core_types::{arith::BitOp, Value};
use bytecode_system::CompareOp;

use crate::engine::Engine;
use crate::runtime;

fn unbox(bits: u64) -> Value {
    Value::from_bits(bits).unwrap_or_default()
}

/// # Safety
///
/// `engine` must be null or point to a live engine not otherwise borrowed.
unsafe fn engine_mut<'a>(engine: *mut Engine) -> Option<&'a mut Engine> {
    engine.as_mut()
}

/// # Safety
///
/// `ptr` must be valid for `len` bytes.
unsafe fn name<'a>(ptr: *const u8, len: usize) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    std::str::from_utf8(std::slice::from_raw_parts(ptr, len)).ok()
}

/// # Safety
///
/// `argv` must be null or valid for `argc` words.
unsafe fn arguments(argv: *const u64, argc: usize) -> Vec<Value> {
    if argv.is_null() || argc == 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(argv, argc).iter().map(|bits| unbox(*bits)).collect()
}

macro_rules! binary_entry {
    ($($(#[$doc:meta])* $name:ident => $helper:path;)*) => {
        $(
            $(#[$doc])*
            ///
            /// # Safety
            ///
            /// `engine` must point to a live engine.
            pub unsafe extern "C" fn $name(engine: *mut Engine, lhs: u64, rhs: u64) -> u64 {
                match engine_mut(engine) {
                    Some(engine) => $helper(engine, unbox(lhs), unbox(rhs)).to_bits(),
                    None => UNDEFINED_BITS,
                }
            }
        )*
    };
}

binary_entry! {
    /// `lhs + rhs`.
    rt_add => runtime::add;
    /// `lhs - rhs`.
    rt_sub => runtime::sub;
    /// `lhs * rhs`.
    rt_mul => runtime::mul;
    /// `lhs / rhs`.
    rt_div => runtime::div;
    /// `lhs % rhs`.
    rt_rem => runtime::rem;
    /// `obj[key]`.
    rt_get_element => runtime::get_element;
}

/// Bitwise operator; `op` is 0 `&`, 1 `|`, 2 `^`, 3 `<<`, 4 `>>`, 5 `>>>`.
///
/// # Safety
///
/// `engine` must point to a live engine.
pub unsafe extern "C" fn rt_bitwise(engine: *mut Engine, op: u32, lhs: u64, rhs: u64) -> u64 {
    let op = match op {
        0 => BitOp::And,
        1 => BitOp::Or,
        2 => BitOp::Xor,
        3 => BitOp::Shl,
        4 => BitOp::Shr,
        5 => BitOp::UShr,
        _ => return UNDEFINED_BITS,
    };
    match engine_mut(engine) {
        Some(engine) => runtime::bitwise(engine, op, unbox(lhs), unbox(rhs)).to_bits(),
        None => UNDEFINED_BITS,
    }
}

/// Comparison with a `CompareOp` byte. Returns 1 for true, 0 for false or
/// an unknown operator.
///
/// # Safety
///
/// `engine` must point to a live engine.
pub unsafe extern "C" fn rt_compare(engine: *mut Engine, op: u8, lhs: u64, rhs: u64) -> u32 {
    let (Some(engine), Some(op)) = (engine_mut(engine), CompareOp::from_byte(op)) else {
        return 0;
    };
    runtime::compare(engine, op, unbox(lhs), unbox(rhs)) as u32
}

/// ToBoolean as 0 or 1.
///
/// # Safety
///
/// `engine` must point to a live engine.
pub unsafe extern "C" fn rt_to_boolean(engine: *mut Engine, value: u64) -> u32 {
    match engine_mut(engine) {
        Some(engine) => runtime::to_boolean(engine, unbox(value)) as u32,
        None => 0,
    }
}

/// ToNumber.
///
/// # Safety
///
/// `engine` must point to a live engine.
pub unsafe extern "C" fn rt_to_number(engine: *mut Engine, value: u64) -> f64 {
    match engine_mut(engine) {
        Some(engine) => runtime::to_number(engine, unbox(value)),
        None => f64::NAN,
    }
}

/// `typeof value`.
///
/// # Safety
///
/// `engine` must point to a live engine.
pub unsafe extern "C" fn rt_type_of(engine: *mut Engine, value: u64) -> u64 {
    match engine_mut(engine) {
        Some(engine) => runtime::type_of(engine, unbox(value)).to_bits(),
        None => UNDEFINED_BITS,
    }
}

/// `object.name` with a UTF-8 name.
///
/// # Safety
///
/// `engine` must point to a live engine and `name_ptr` must be valid for
/// `name_len` bytes.
pub unsafe extern "C" fn rt_get_property(
    engine: *mut Engine,
    object: u64,
    name_ptr: *const u8,
    name_len: usize,
) -> u64 {
    match (engine_mut(engine), name(name_ptr, name_len)) {
        (Some(engine), Some(name)) => runtime::get_property(engine, unbox(object), name).to_bits(),
        _ => UNDEFINED_BITS,
    }
}

/// `object.name = value` with a UTF-8 name.
///
/// # Safety
///
/// `engine` must point to a live engine and `name_ptr` must be valid for
/// `name_len` bytes.
pub unsafe extern "C" fn rt_set_property(
    engine: *mut Engine,
    object: u64,
    name_ptr: *const u8,
    name_len: usize,
    value: u64,
) {
    if let (Some(engine), Some(name)) = (engine_mut(engine), name(name_ptr, name_len)) {
        runtime::set_property(engine, unbox(object), name, unbox(value));
    }
}

/// `object[key] = value`.
///
/// # Safety
///
/// `engine` must point to a live engine.
pub unsafe extern "C" fn rt_set_element(engine: *mut Engine, object: u64, key: u64, value: u64) {
    if let Some(engine) = engine_mut(engine) {
        runtime::set_element(engine, unbox(object), unbox(key), unbox(value));
    }
}

/// `function.call(this, ...argv)`.
///
/// # Safety
///
/// `engine` must point to a live engine and `argv` must be valid for
/// `argc` words.
pub unsafe extern "C" fn rt_call_value(
    engine: *mut Engine,
    function: u64,
    this: u64,
    argv: *const u64,
    argc: usize,
) -> u64 {
    let args = arguments(argv, argc);
    match engine_mut(engine) {
        Some(engine) => runtime::call_value(engine, unbox(function), unbox(this), &args).to_bits(),
        None => UNDEFINED_BITS,
    }
}

/// `new function(...argv)`.
///
/// # Safety
///
/// `engine` must point to a live engine and `argv` must be valid for
/// `argc` words.
pub unsafe extern "C" fn rt_construct(engine: *mut Engine, function: u64, argv: *const u64, argc: usize) -> u64 {
    let args = arguments(argv, argc);
    match engine_mut(engine) {
        Some(engine) => runtime::construct(engine, unbox(function), &args).to_bits(),
        None => UNDEFINED_BITS,
    }
}

/// Raises `value`.
///
/// # Safety
///
/// `engine` must point to a live engine.
pub unsafe extern "C" fn rt_throw(engine: *mut Engine, value: u64) {
    if let Some(engine) = engine_mut(engine) {
        engine.throw_value(unbox(value));
    }
}

/// 1 while an exception is pending.
///
/// # Safety
///
/// `engine` must point to a live engine.
pub unsafe extern "C" fn rt_has_exception(engine: *mut Engine) -> u32 {
    engine_mut(engine).is_some_and(|engine| engine.has_exception()) as u32
}

/// Address of an entry point by name, for code generators emitting
/// direct calls.
pub fn runtime_function_address(name: &str) -> Option<usize> {
    let address = match name {
        "rt_add" => rt_add as usize,
        "rt_sub" => rt_sub as usize,
        "rt_mul" => rt_mul as usize,
        "rt_div" => rt_div as usize,
        "rt_rem" => rt_rem as usize,
        "rt_bitwise" => rt_bitwise as usize,
        "rt_compare" => rt_compare as usize,
        "rt_to_boolean" => rt_to_boolean as usize,
        "rt_to_number" => rt_to_number as usize,
        "rt_type_of" => rt_type_of as usize,
        "rt_get_property" => rt_get_property as usize,
        "rt_set_property" => rt_set_property as usize,
        "rt_get_element" => rt_get_element as usize,
        "rt_set_element" => rt_set_element as usize,
        "rt_call_value" => rt_call_value as usize,
        "rt_construct" => rt_construct as usize,
        "rt_throw" => rt_throw as usize,
        "rt_has_exception" => rt_has_exception as usize,
        _ => return None,
    };
    Some(address)
}
