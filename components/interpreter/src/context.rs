//! Execution contexts and the scope chain
//!
//! A context is one lexical scope: the global scope, a function
//! activation, or the extra scope introduced by `with` and `catch`. Each
//! links to its lexically enclosing context, so name lookup walks `outer`
//! links rather than the call stack.
//!
//! Call contexts of functions that cannot be captured live in a stack of
//! inline slots owned by the engine and die with their frame. Everything
//! else lives on the managed heap. An inline context that turns out to be
//! captured after all is promoted: its contents move to the heap and the
//! inline slot forwards to the copy.

use std::any::Any;
use std::rc::Rc;

use core_types::{GcRef, Value};
use memory_manager::{Managed, Tracer};

/// What kind of scope a context represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Top-level scope backed by the global object
    Global,
    /// Function activation
    Call,
    /// `with (object)` scope
    With,
    /// `catch (name)` scope
    Catch,
}

/// Handle to a context wherever it is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRef {
    /// Context on the managed heap
    Heap(GcRef),
    /// Context in the engine's inline stack
    Inline(usize),
}

/// Compiled code a call context belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionCode {
    /// Index of the loaded unit
    pub unit: usize,
    /// Function index within the unit
    pub function: u32,
}

/// One scope record
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    kind: ContextKind,
    outer: Option<ContextRef>,
    strict: bool,
    code: Option<FunctionCode>,
    function: Value,
    locals: Vec<Value>,
    arguments: Vec<Value>,
    argc: usize,
    object: Option<GcRef>,
    catch_name: Option<Rc<str>>,
    catch_value: Value,
    captured: bool,
}

impl ExecutionContext {
    fn empty(kind: ContextKind, outer: Option<ContextRef>) -> Self {
        ExecutionContext {
            kind,
            outer,
            strict: false,
            code: None,
            function: Value::Undefined,
            locals: Vec::new(),
            arguments: Vec::new(),
            argc: 0,
            object: None,
            catch_name: None,
            catch_value: Value::Undefined,
            captured: false,
        }
    }

    /// Global scope over `global_object`.
    pub fn global(global_object: GcRef) -> Self {
        ExecutionContext {
            object: Some(global_object),
            ..Self::empty(ContextKind::Global, None)
        }
    }

    /// Function activation.
    ///
    /// `args` is padded with `undefined` up to `formal_count`; the real
    /// argument count is kept for `arguments.length`.
    #[allow(clippy::too_many_arguments)]
    pub fn call(
        outer: ContextRef,
        code: FunctionCode,
        function: Value,
        strict: bool,
        mut args: Vec<Value>,
        formal_count: usize,
        local_count: usize,
    ) -> Self {
        let argc = args.len();
        if args.len() < formal_count {
            args.resize(formal_count, Value::Undefined);
        }
        ExecutionContext {
            strict,
            code: Some(code),
            function,
            locals: vec![Value::Undefined; local_count],
            arguments: args,
            argc,
            ..Self::empty(ContextKind::Call, Some(outer))
        }
    }

    /// `with` scope over `object`.
    pub fn with(outer: ContextRef, object: GcRef) -> Self {
        ExecutionContext {
            object: Some(object),
            ..Self::empty(ContextKind::With, Some(outer))
        }
    }

    /// `catch` scope binding `name` to the caught exception.
    pub fn catch(outer: ContextRef, name: Rc<str>, exception: Value) -> Self {
        ExecutionContext {
            catch_name: Some(name),
            catch_value: exception,
            ..Self::empty(ContextKind::Catch, Some(outer))
        }
    }

    /// Scope kind.
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Lexically enclosing context.
    pub fn outer(&self) -> Option<ContextRef> {
        self.outer
    }

    /// Relinks the context, used when its outer context is promoted.
    pub(crate) fn set_outer(&mut self, outer: Option<ContextRef>) {
        self.outer = outer;
    }

    /// Strict-mode activation.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Code of a call context.
    pub fn code(&self) -> Option<FunctionCode> {
        self.code
    }

    /// Function object being executed by a call context.
    pub fn function(&self) -> Value {
        self.function
    }

    /// Object consulted by lookups: the `with` target or the global object.
    pub fn object(&self) -> Option<GcRef> {
        self.object
    }

    /// Bound name of a catch context.
    pub fn catch_name(&self) -> Option<&str> {
        self.catch_name.as_deref()
    }

    /// Value bound by a catch context.
    pub fn catch_value(&self) -> Value {
        self.catch_value
    }

    /// Replaces the value bound by a catch context.
    pub fn set_catch_value(&mut self, value: Value) {
        self.catch_value = value;
    }

    /// Local variable slots.
    pub fn locals(&self) -> &[Value] {
        &self.locals
    }

    /// Local variable.
    pub fn local(&self, index: usize) -> Value {
        self.locals.get(index).copied().unwrap_or(Value::Undefined)
    }

    /// Writes a local variable; out-of-range writes are dropped.
    pub fn set_local(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.locals.get_mut(index) {
            *slot = value;
        }
    }

    /// Argument slots (formals first, then extra arguments).
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Argument by position.
    pub fn argument(&self, index: usize) -> Value {
        self.arguments.get(index).copied().unwrap_or(Value::Undefined)
    }

    /// Writes an argument slot, growing the array for indices past the
    /// actual argument count.
    pub fn set_argument(&mut self, index: usize, value: Value) {
        if index >= self.arguments.len() {
            self.arguments.resize(index + 1, Value::Undefined);
        }
        self.arguments[index] = value;
    }

    /// Number of arguments the caller actually passed.
    pub fn argc(&self) -> usize {
        self.argc
    }

    /// True once a closure or arguments object refers to the context.
    pub fn is_captured(&self) -> bool {
        self.captured
    }

    /// Marks the context as referenced from the heap.
    pub fn mark_captured(&mut self) {
        self.captured = true;
    }

    /// Drops argument references of a context that nothing captured.
    pub fn release_arguments(&mut self) {
        if !self.captured {
            self.arguments = Vec::new();
            self.function = Value::Undefined;
        }
    }

    /// Reports every referenced object.
    pub fn trace_values(&self, tracer: &mut Tracer) {
        if let Some(ContextRef::Heap(outer)) = self.outer {
            tracer.mark(outer);
        }
        tracer.mark_value(self.function);
        tracer.mark_values(&self.locals);
        tracer.mark_values(&self.arguments);
        if let Some(object) = self.object {
            tracer.mark(object);
        }
        tracer.mark_value(self.catch_value);
    }
}

impl Managed for ExecutionContext {
    fn class_name(&self) -> &'static str {
        "ExecutionContext"
    }

    fn trace(&self, tracer: &mut Tracer) {
        self.trace_values(tracer);
    }

    fn finalize(&mut self) {
        self.locals = Vec::new();
        self.arguments = Vec::new();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Entry of the inline context stack
#[derive(Debug)]
pub(crate) enum InlineSlot {
    /// Context stored in place
    Live(ExecutionContext),
    /// Context moved to the heap
    Promoted(GcRef),
}

/// Where a name resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Local variable of a call context
    Local(ContextRef, usize),
    /// Formal parameter of a call context
    Argument(ContextRef, usize),
    /// Exception variable of a catch context
    Catch(ContextRef),
    /// Property of a `with` object
    WithObject(GcRef),
    /// Property of the global object
    Global(GcRef),
}
