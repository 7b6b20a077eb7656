//! Bytecode execution engine
//!
//! Runs compilation units produced by [`bytecode_system`] over the managed
//! heap from [`memory_manager`]:
//! - Accumulator/register dispatch with per-frame exception handlers
//! - Scope chain of function, `with` and `catch` contexts, with call
//!   contexts kept inline until a closure captures them
//! - Shape-keyed lookup caches for global and property access
//! - A runtime helper library shared by the interpreter and by generated
//!   code through the `extern "C"` entry points in [`abi`]
//! - Debugger hooks and a JSON command channel
//!
//! Exceptions follow a flag protocol: a throwing operation sets the
//! engine's pending exception and returns `undefined`; callers check
//! [`Engine::has_exception`] after every operation that can throw.
//!
//! # Example
//!
//! ```
//! use bytecode_system::{FunctionBuilder, Opcode, UnitBuilder};
//! use core_types::Value;
//! use interpreter::Engine;
//!
//! let mut unit = UnitBuilder::new("answer.js");
//! let mut main = FunctionBuilder::new(unit.intern("main"));
//! main.emit(Opcode::LoadInt(42));
//! main.emit(Opcode::Ret);
//! unit.add_function(main.finish().unwrap());
//!
//! let mut engine = Engine::new();
//! let id = engine.load_unit(unit.build()).unwrap();
//! assert_eq!(engine.run_unit(id).unwrap(), Value::Int32(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abi;
pub mod call_frame;
pub mod code_block;
pub mod config;
pub mod context;
pub mod debug;
mod dispatch;
pub mod engine;
pub mod function;
pub mod inline_cache;
mod intrinsics;
pub mod runtime;

// Re-export main types at crate root
pub use call_frame::{CallFrame, ExceptionHandler};
pub use code_block::CodeBlock;
pub use config::{ConfigError, EngineConfig};
pub use context::{Binding, ContextKind, ContextRef, ExecutionContext, FunctionCode};
pub use debug::{Breakpoint, DebugAgent, DebugHooks, FrameInfo, PauseEvent, PauseReason, StepAction};
pub use engine::{Engine, UnitId};
pub use function::{ArgumentsObject, FunctionKind, FunctionObject, NativeFunction};
pub use inline_cache::InlineCache;
