//! Core value types and error handling for the script engine.
//!
//! This crate provides the leaf types every other component builds on:
//! the tagged value, handles into the managed heap, numeric coercions and
//! the host-facing error type.
//!
//! # Overview
//!
//! - [`Value`] - Tagged representation of script values
//! - [`GcRef`] - Handle to a slot in the managed heap
//! - [`arith`] - int32/double two-tier arithmetic
//! - [`nanbox`] - Bit-level encoding for generated code
//! - [`JsError`] - Uncaught exceptions surfaced to the host
//! - [`SourcePosition`], [`StackFrame`] - Source location tracking
//!
//! # Examples
//!
//! ```
//! use core_types::{arith, ErrorKind, JsError, Value};
//!
//! let sum = arith::add(Value::from_int32(40), Value::from_int32(2));
//! assert_eq!(sum, Some(Value::Int32(42)));
//! assert_eq!(Value::Null.type_of(), "object");
//!
//! let error = JsError::new(ErrorKind::ReferenceError, "x is not defined");
//! assert_eq!(error.kind, ErrorKind::ReferenceError);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod arith;
mod conversions;
mod error;
mod gc_ref;
pub mod nanbox;
mod source;
mod value;

pub use conversions::{
    array_index_from_name, number_to_string, string_to_number, to_int32, to_integer, to_uint32,
};
pub use error::{ErrorKind, JsError};
pub use gc_ref::{GcRef, GC_REF_BITS, MAX_CHUNKS_PER_CLASS, MAX_SIZE_CLASSES, MAX_SLOTS_PER_CHUNK};
pub use source::{SourcePosition, StackFrame};
pub use value::Value;
