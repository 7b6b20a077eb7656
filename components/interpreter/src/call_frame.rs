//! Per-activation interpreter state

use core_types::Value;
use memory_manager::Tracer;

use crate::context::ContextRef;

/// Installed exception handler of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Resumption offset
    pub target: u32,
    /// Context current when the handler was installed; restored on entry
    pub context: ContextRef,
}

/// One active call of a compiled function
///
/// Frames live on the engine's frame stack in call order. The register
/// window `[base, base + register_count)` of the shared register stack
/// belongs to the frame.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Loaded unit index
    pub unit: usize,
    /// Function index within the unit
    pub function: u32,
    /// Offset of the instruction being executed
    pub pc: usize,
    /// First register of the frame's window
    pub base: usize,
    /// `this` binding
    pub this: Value,
    /// Accumulator as of the last instruction boundary
    pub acc: Value,
    /// The frame's own call context
    pub context: ContextRef,
    /// Context to restore when the frame exits
    pub caller_context: Option<ContextRef>,
    /// Handler installed by `SetExceptionHandler`
    pub handler: Option<ExceptionHandler>,
}

impl CallFrame {
    /// Reports the values the frame holds outside the register stack.
    pub fn trace(&self, tracer: &mut Tracer) {
        tracer.mark_value(self.this);
        tracer.mark_value(self.acc);
        for context in [Some(self.context), self.caller_context, self.handler.map(|h| h.context)]
            .into_iter()
            .flatten()
        {
            if let ContextRef::Heap(r) = context {
                tracer.mark(r);
            }
        }
    }
}
