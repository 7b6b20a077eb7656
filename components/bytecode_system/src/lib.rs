//! Bytecode format for the JavaScript engine
//!
//! This crate defines the accumulator-machine instruction set executed by
//! the interpreter, its binary encoding, and the compiled-unit container
//! the external compiler produces.
//!
//! # Features
//!
//! - Accumulator + register-file instruction set with fused compare-jumps
//! - Compact tag/operand encoding with absolute jump targets
//! - Load-time validation of units
//! - Byte-image serialization of whole units
//!
//! # Example
//!
//! ```
//! use bytecode_system::{FunctionBuilder, Opcode, UnitBuilder};
//!
//! let mut unit = UnitBuilder::new("sum.js");
//! let mut main = FunctionBuilder::new(unit.intern("main"));
//! let r0 = main.alloc_register();
//! main.emit(Opcode::LoadInt(2));
//! main.emit(Opcode::StoreReg(r0));
//! main.emit(Opcode::LoadInt(3));
//! main.emit(Opcode::Add(r0));
//! main.emit(Opcode::Ret);
//! unit.add_function(main.finish().unwrap());
//!
//! let unit = unit.build();
//! unit.validate().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod constant;
mod error;
pub mod instruction;
pub mod opcode;
pub mod unit;

pub use builder::{FunctionBuilder, Label, UnitBuilder};
pub use constant::Constant;
pub use error::{BuildError, DecodeError};
pub use instruction::{Instructions, NO_HANDLER};
pub use opcode::{CompareOp, Opcode, RegisterId};
pub use unit::{CompilationUnit, CompiledFunction, FunctionFlags, LineEntry};
