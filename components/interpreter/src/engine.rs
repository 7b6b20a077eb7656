//! The engine: heap, scope chain, frames and the host-facing API
//!
//! One [`Engine`] runs on one thread. It owns its managed heap and
//! everything the collector treats as a root: the global object and
//! context, the inline context stack, the frame stack with its shared
//! register stack, the pending exception, and the runtime strings of every
//! loaded unit. The only state shared with other engines is the executable
//! allocator behind [`Engine::install_code`].

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bytecode_system::{CompilationUnit, DecodeError};
use core_types::{ErrorKind, GcRef, JsError, StackFrame, Value};
use exec_allocator::ExecutableAllocator;
use memory_manager::{
    GcStats, Heap, JsObject, JsString, Managed, ObjectClass, RootSet, Tracer,
};
use tracing::{debug, error, trace, warn};

use crate::call_frame::CallFrame;
use crate::code_block::CodeBlock;
use crate::config::EngineConfig;
use crate::context::{ContextKind, ContextRef, ExecutionContext, FunctionCode, InlineSlot};
use crate::debug::{DebugHooks, FrameInfo};
use crate::function::{FunctionObject, NativeFunction};
use crate::inline_cache::UnitCaches;
use crate::intrinsics::{self, Intrinsics};
use crate::runtime;

/// Handle to a unit loaded with [`Engine::load_unit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(pub(crate) usize);

/// A validated unit plus its string table as shared names.
#[derive(Debug)]
pub(crate) struct LoadedUnit {
    pub(crate) unit: CompilationUnit,
    pub(crate) names: Vec<Rc<str>>,
}

impl LoadedUnit {
    pub(crate) fn name(&self, index: u32) -> &str {
        self.names.get(index as usize).map_or("", |n| n)
    }
}

/// Everything the collector must treat as live.
pub(crate) struct Roots {
    pub(crate) global_object: GcRef,
    pub(crate) global_context: GcRef,
    pub(crate) current: Option<ContextRef>,
    pub(crate) inline: Vec<InlineSlot>,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) registers: Vec<Value>,
    pub(crate) scratch: Vec<Value>,
    pub(crate) exception: Value,
    pub(crate) unit_strings: Vec<Vec<Value>>,
    pub(crate) static_strings: Vec<Value>,
    pub(crate) intrinsics: Option<Intrinsics>,
}

impl RootSet for Roots {
    fn trace_roots(&self, tracer: &mut Tracer) {
        tracer.mark(self.global_object);
        tracer.mark(self.global_context);
        if let Some(ContextRef::Heap(r)) = self.current {
            tracer.mark(r);
        }
        for slot in &self.inline {
            match slot {
                InlineSlot::Live(context) => context.trace_values(tracer),
                InlineSlot::Promoted(r) => tracer.mark(*r),
            }
        }
        for frame in &self.frames {
            frame.trace(tracer);
        }
        tracer.mark_values(&self.registers);
        tracer.mark_values(&self.scratch);
        tracer.mark_value(self.exception);
        for strings in &self.unit_strings {
            tracer.mark_values(strings);
        }
        tracer.mark_values(&self.static_strings);
        if let Some(intrinsics) = &self.intrinsics {
            intrinsics.trace(tracer);
        }
    }
}

/// A script engine instance
///
/// # Example
///
/// ```
/// use bytecode_system::{FunctionBuilder, Opcode, UnitBuilder};
/// use core_types::Value;
/// use interpreter::Engine;
///
/// let mut unit = UnitBuilder::new("main.js");
/// let mut main = FunctionBuilder::new(unit.intern("main"));
/// let r0 = main.alloc_register();
/// main.emit(Opcode::LoadInt(2));
/// main.emit(Opcode::StoreReg(r0));
/// main.emit(Opcode::LoadInt(3));
/// main.emit(Opcode::Add(r0));
/// main.emit(Opcode::Ret);
/// unit.add_function(main.finish().unwrap());
///
/// let mut engine = Engine::new();
/// let id = engine.load_unit(unit.build()).unwrap();
/// assert_eq!(engine.run_unit(id).unwrap(), Value::Int32(5));
/// ```
pub struct Engine {
    pub(crate) heap: Heap,
    pub(crate) roots: Roots,
    pub(crate) units: Vec<Rc<LoadedUnit>>,
    pub(crate) caches: Vec<UnitCaches>,
    pub(crate) config: EngineConfig,
    pub(crate) intrinsics: Intrinsics,
    pub(crate) has_exception: bool,
    pub(crate) exception_stack: Vec<StackFrame>,
    pub(crate) interrupt: Arc<AtomicBool>,
    static_index: HashMap<&'static str, usize>,
    debugger: Option<Box<dyn DebugHooks>>,
    code_allocator: Arc<ExecutableAllocator>,
}

impl Engine {
    /// Engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Engine with explicit configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        let mut heap = Heap::with_config(config.heap.clone());
        heap.block_gc();
        let intrinsics = Intrinsics::create(&mut heap);
        let global_object = heap.allocate(
            JsObject::new(Some(intrinsics.object_prototype)),
            &memory_manager::NoRoots,
        );
        let global_context = heap.allocate(
            ExecutionContext::global(global_object),
            &memory_manager::NoRoots,
        );
        heap.unblock_gc();

        let mut engine = Engine {
            heap,
            roots: Roots {
                global_object,
                global_context,
                current: Some(ContextRef::Heap(global_context)),
                inline: Vec::new(),
                frames: Vec::new(),
                registers: Vec::new(),
                scratch: Vec::new(),
                exception: Value::Undefined,
                unit_strings: Vec::new(),
                static_strings: Vec::new(),
                intrinsics: Some(intrinsics),
            },
            units: Vec::new(),
            caches: Vec::new(),
            config,
            intrinsics,
            has_exception: false,
            exception_stack: Vec::new(),
            interrupt: Arc::new(AtomicBool::new(false)),
            static_index: HashMap::new(),
            debugger: None,
            code_allocator: ExecutableAllocator::shared(),
        };
        let global = Value::Managed(global_object);
        engine.set_global("globalThis", global);
        intrinsics::install(&mut engine);
        engine
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The managed heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Mutable access to the managed heap.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Collector statistics.
    pub fn gc_stats(&self) -> GcStats {
        self.heap.stats()
    }

    /// Runs a full collection now. Returns the number of objects freed.
    pub fn collect_garbage(&mut self) -> usize {
        self.heap.collect(&self.roots)
    }

    /// Flag that aborts running script at the next instruction boundary
    /// with an `Error("Execution interrupted")`.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Attaches or detaches a debugger.
    pub fn set_debugger(&mut self, debugger: Option<Box<dyn DebugHooks>>) {
        self.debugger = debugger;
    }

    /// Number of active script frames.
    pub fn call_depth(&self) -> usize {
        self.roots.frames.len()
    }

    // ----------------------------------------------------------------
    // Units

    /// Validates a unit and makes it runnable.
    pub fn load_unit(&mut self, unit: CompilationUnit) -> Result<UnitId, DecodeError> {
        unit.validate()?;
        let id = self.units.len();
        let names: Vec<Rc<str>> = unit.strings.iter().map(|s| Rc::from(s.as_str())).collect();

        let strings = self.no_gc(|engine| {
            unit.strings
                .iter()
                .map(|s| engine.new_string(s))
                .collect::<Vec<_>>()
        });
        self.roots.unit_strings.push(strings);
        self.caches
            .push(UnitCaches::new(unit.functions.iter().map(|f| f.lookup_count)));
        debug!(
            unit = id,
            file = %unit.file_name,
            functions = unit.functions.len(),
            "loaded compilation unit"
        );
        self.units.push(Rc::new(LoadedUnit { unit, names }));
        Ok(UnitId(id))
    }

    /// Runs a unit's top-level code with `this` bound to the global object.
    pub fn run_unit(&mut self, id: UnitId) -> Result<Value, JsError> {
        if id.0 >= self.units.len() {
            return Err(JsError::new(
                ErrorKind::InternalError,
                format!("unknown unit {}", id.0),
            ));
        }
        self.clear_exception();
        let code = FunctionCode {
            unit: id.0,
            function: 0,
        };
        let this = Value::Managed(self.roots.global_object);
        let scope = self.roots.global_context;
        let result = self.invoke_script(Value::Undefined, code, scope, this, Vec::new());
        self.finish_outermost(result)
    }

    /// Calls a function following the exception-flag protocol: when the
    /// call throws, the result is `undefined` and [`has_exception`] is set
    /// until [`take_exception`] is called.
    ///
    /// [`has_exception`]: Engine::has_exception
    /// [`take_exception`]: Engine::take_exception
    pub fn call(&mut self, function: Value, this: Value, args: &[Value]) -> Value {
        let mark = self.roots.scratch.len();
        self.roots.scratch.push(function);
        self.roots.scratch.push(this);
        self.roots.scratch.extend_from_slice(args);
        let result = runtime::call_value(self, function, this, args);
        self.roots.scratch.truncate(mark);
        result
    }

    /// Calls a function and converts an escaping exception into an error.
    pub fn call_function(&mut self, function: Value, this: Value, args: &[Value]) -> Result<Value, JsError> {
        self.clear_exception();
        let result = self.call(function, this, args);
        self.finish_outermost(result)
    }

    fn finish_outermost(&mut self, result: Value) -> Result<Value, JsError> {
        if !self.has_exception {
            return Ok(result);
        }
        let thrown = self.take_exception().unwrap_or_default();
        let err = self.to_js_error(thrown);
        debug!(error = %err, "uncaught exception");
        Err(err)
    }

    // ----------------------------------------------------------------
    // Exceptions

    /// True while an exception is pending.
    pub fn has_exception(&self) -> bool {
        self.has_exception
    }

    /// Takes the pending exception and clears the flag.
    pub fn take_exception(&mut self) -> Option<Value> {
        if !self.has_exception {
            return None;
        }
        self.has_exception = false;
        Some(std::mem::take(&mut self.roots.exception))
    }

    /// Frames active when the pending exception was thrown, innermost
    /// first.
    pub fn exception_stack(&self) -> &[StackFrame] {
        &self.exception_stack
    }

    /// Raises `value`. Returns `undefined` for use as a helper result.
    pub fn throw_value(&mut self, value: Value) -> Value {
        self.roots.exception = value;
        self.has_exception = true;
        self.exception_stack = self.capture_stack();
        Value::Undefined
    }

    /// Raises a new error object of the given kind.
    pub fn throw_error(&mut self, kind: ErrorKind, message: &str) -> Value {
        let error = self.new_error(kind, message);
        self.throw_value(error)
    }

    fn clear_exception(&mut self) {
        self.has_exception = false;
        self.roots.exception = Value::Undefined;
    }

    fn capture_stack(&self) -> Vec<StackFrame> {
        self.roots
            .frames
            .iter()
            .rev()
            .filter_map(|frame| {
                let unit = self.units.get(frame.unit)?;
                let function = unit.unit.functions.get(frame.function as usize)?;
                let name = unit.unit.function_name(frame.function as usize);
                Some(StackFrame {
                    function_name: (!name.is_empty()).then(|| name.to_string()),
                    source_url: Some(unit.unit.file_name.clone()),
                    line: function.line_for_offset(frame.pc).unwrap_or(0),
                    column: 0,
                })
            })
            .collect()
    }

    /// Converts a thrown value into a host error.
    pub fn to_js_error(&self, thrown: Value) -> JsError {
        let error_object = thrown
            .as_managed()
            .filter(|r| {
                self.heap
                    .get_as::<JsObject>(*r)
                    .is_some_and(|o| o.class() == ObjectClass::Error)
            });
        let (kind, message) = match error_object {
            Some(r) => {
                let name = self.property_text(r, "name").unwrap_or_default();
                let message = self.property_text(r, "message").unwrap_or_default();
                (ErrorKind::from_name(&name), message)
            }
            None => (
                ErrorKind::Error,
                format!("Uncaught {}", runtime::describe(self, thrown)),
            ),
        };
        JsError::new(kind, message).with_stack(self.exception_stack.clone())
    }

    fn property_text(&self, object: GcRef, name: &str) -> Option<String> {
        let value = self.heap.get_property(object, name)?;
        self.string_contents(value).map(str::to_string)
    }

    // ----------------------------------------------------------------
    // Allocation

    /// Moves an object into the heap, collecting first if needed.
    pub fn alloc<T: Managed>(&mut self, object: T) -> GcRef {
        self.heap.allocate(object, &self.roots)
    }

    /// Runs `f` with collection blocked, for helpers that hold fresh
    /// objects in locals across several allocations.
    pub fn no_gc<R>(&mut self, f: impl FnOnce(&mut Engine) -> R) -> R {
        self.heap.block_gc();
        let result = f(self);
        self.heap.unblock_gc();
        result
    }

    /// New string value.
    pub fn new_string(&mut self, text: &str) -> Value {
        Value::String(self.alloc(JsString::new(text)))
    }

    /// Shared string for a fixed text such as a `typeof` result.
    pub fn static_string(&mut self, text: &'static str) -> Value {
        if let Some(&index) = self.static_index.get(text) {
            return self.roots.static_strings[index];
        }
        let value = self.new_string(text);
        self.static_index.insert(text, self.roots.static_strings.len());
        self.roots.static_strings.push(value);
        value
    }

    /// Contents of a string value.
    pub fn string_contents(&self, value: Value) -> Option<&str> {
        let r = value.as_string()?;
        self.heap.get_as::<JsString>(r).map(JsString::as_str)
    }

    /// New plain object.
    pub fn new_object(&mut self) -> Value {
        let proto = self.intrinsics.object_prototype;
        Value::Managed(self.alloc(JsObject::new(Some(proto))))
    }

    /// New array holding `elements`.
    pub fn new_array(&mut self, elements: Vec<Value>) -> Value {
        let proto = self.intrinsics.array_prototype;
        Value::Managed(self.alloc(JsObject::array(Some(proto), elements)))
    }

    /// New error object with `message`.
    pub fn new_error(&mut self, kind: ErrorKind, message: &str) -> Value {
        let proto = self.intrinsics.error_prototype(kind);
        let message = self.new_string(message);
        runtime::with_rooted(self, &[message], |engine| {
            let error = engine.alloc(JsObject::error(Some(proto)));
            engine.heap.put_property(error, "message", message);
            Value::Managed(error)
        })
    }

    // ----------------------------------------------------------------
    // Globals

    /// The global object.
    pub fn global_object(&self) -> Value {
        Value::Managed(self.roots.global_object)
    }

    /// Reads a global variable.
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.heap.get_property(self.roots.global_object, name)
    }

    /// Writes a global variable.
    pub fn set_global(&mut self, name: &str, value: Value) {
        let global = self.roots.global_object;
        self.heap.put_property(global, name, value);
    }

    /// Exposes a host function as a global. Returns the function object.
    pub fn register_global_function(&mut self, name: &str, function: NativeFunction) -> Value {
        let proto = self.intrinsics.function_prototype;
        let f = Value::Managed(self.alloc(FunctionObject::native(name, function, Some(proto))));
        self.set_global(name, f);
        f
    }

    /// Reads a property the way a script would, following the exception
    /// protocol.
    pub fn get_property(&mut self, object: Value, name: &str) -> Value {
        runtime::get_property(self, object, name)
    }

    /// Writes a property the way a script would.
    pub fn set_property(&mut self, object: Value, name: &str, value: Value) {
        runtime::set_property(self, object, name, value);
    }

    // ----------------------------------------------------------------
    // Native code

    /// Replaces the executable allocator used by [`install_code`].
    ///
    /// [`install_code`]: Engine::install_code
    pub fn set_code_allocator(&mut self, allocator: Arc<ExecutableAllocator>) {
        self.code_allocator = allocator;
    }

    /// Copies generated machine code into executable memory.
    ///
    /// Running out of executable memory is fatal. Empty code yields an
    /// empty block that owns no memory.
    pub fn install_code(&self, code: &[u8]) -> CodeBlock {
        if code.is_empty() {
            return CodeBlock::empty(Arc::clone(&self.code_allocator));
        }
        let allocation = match self.code_allocator.allocate(code.len()) {
            Ok(allocation) => allocation,
            Err(e) => {
                error!(error = %e, size = code.len(), "cannot allocate executable memory");
                std::process::abort();
            }
        };
        if let Err(e) = self.code_allocator.write(&allocation, 0, code) {
            error!(error = %e, "cannot write executable memory");
            std::process::abort();
        }
        trace!(start = allocation.start(), size = allocation.size(), "installed code");
        CodeBlock::new(Arc::clone(&self.code_allocator), allocation, code.len())
    }

    // ----------------------------------------------------------------
    // Contexts

    /// Resolves a context handle.
    pub fn context(&self, r: ContextRef) -> Option<&ExecutionContext> {
        match r {
            ContextRef::Heap(g) => self.heap.get_as::<ExecutionContext>(g),
            ContextRef::Inline(i) => match self.roots.inline.get(i)? {
                InlineSlot::Live(context) => Some(context),
                InlineSlot::Promoted(g) => self.heap.get_as::<ExecutionContext>(*g),
            },
        }
    }

    /// Resolves a context handle for mutation.
    pub fn context_mut(&mut self, r: ContextRef) -> Option<&mut ExecutionContext> {
        match r {
            ContextRef::Heap(g) => self.heap.get_as_mut::<ExecutionContext>(g),
            ContextRef::Inline(i) => match self.roots.inline.get_mut(i)? {
                InlineSlot::Live(context) => Some(context),
                InlineSlot::Promoted(g) => {
                    let g = *g;
                    self.heap.get_as_mut::<ExecutionContext>(g)
                }
            },
        }
    }

    /// Innermost context of the running code.
    pub fn current_context(&self) -> Option<ContextRef> {
        self.roots.current
    }

    /// Makes a heap context the current one; its outer link must be the
    /// previous current context.
    pub(crate) fn enter_context(&mut self, context: ExecutionContext) {
        let r = self.alloc(context);
        self.roots.current = Some(ContextRef::Heap(r));
    }

    /// Pops a `with` or `catch` context.
    pub(crate) fn leave_context(&mut self) {
        let Some(current) = self.roots.current else {
            return;
        };
        let Some(context) = self.context(current) else {
            return;
        };
        debug_assert!(
            matches!(context.kind(), ContextKind::With | ContextKind::Catch),
            "PopContext on a {:?} context",
            context.kind()
        );
        if matches!(context.kind(), ContextKind::With | ContextKind::Catch) {
            self.roots.current = context.outer();
        }
    }

    /// Moves a context and everything it links to onto the heap so a
    /// closure can keep it. Returns the heap handle.
    pub(crate) fn capture_context(&mut self, r: ContextRef) -> Option<GcRef> {
        let top = self.promote(r)?;
        let mut cursor = top;
        while let Some(outer) = self.heap.get_as::<ExecutionContext>(cursor)?.outer() {
            let next = self.promote(outer)?;
            if matches!(outer, ContextRef::Inline(_)) {
                if let Some(context) = self.heap.get_as_mut::<ExecutionContext>(cursor) {
                    context.set_outer(Some(ContextRef::Heap(next)));
                }
            }
            cursor = next;
        }
        Some(top)
    }

    fn promote(&mut self, r: ContextRef) -> Option<GcRef> {
        match r {
            ContextRef::Heap(g) => {
                self.heap.get_as_mut::<ExecutionContext>(g)?.mark_captured();
                Some(g)
            }
            ContextRef::Inline(i) => {
                let mut copy = match self.roots.inline.get(i)? {
                    InlineSlot::Promoted(g) => return Some(*g),
                    InlineSlot::Live(context) => context.clone(),
                };
                copy.mark_captured();
                let g = self.alloc(copy);
                self.roots.inline[i] = InlineSlot::Promoted(g);
                trace!(slot = i, "promoted inline context");
                Some(g)
            }
        }
    }

    /// Strictness of the innermost running function.
    pub(crate) fn current_strict(&self) -> bool {
        self.roots
            .frames
            .last()
            .and_then(|frame| {
                let unit = self.units.get(frame.unit)?;
                unit.unit.functions.get(frame.function as usize)
            })
            .is_some_and(|f| f.flags.strict)
    }

    // ----------------------------------------------------------------
    // Calls

    /// Runs a compiled function in a fresh call context.
    pub(crate) fn invoke_script(
        &mut self,
        function: Value,
        code: FunctionCode,
        scope: GcRef,
        this: Value,
        args: Vec<Value>,
    ) -> Value {
        if self.roots.frames.len() >= self.config.max_call_depth {
            return self.throw_error(ErrorKind::RangeError, "Maximum call stack size exceeded");
        }
        let Some(unit) = self.units.get(code.unit).cloned() else {
            return self.throw_error(ErrorKind::InternalError, "call into an unloaded unit");
        };
        let Some(compiled) = unit.unit.functions.get(code.function as usize) else {
            return self.throw_error(ErrorKind::InternalError, "call to a missing function");
        };

        let strict = compiled.flags.strict;
        let this = if !strict && this.is_null_or_undefined() {
            Value::Managed(self.roots.global_object)
        } else {
            this
        };
        let slots = compiled.locals.len() + args.len().max(compiled.formals.len());
        let on_heap = compiled.needs_heap_context() || slots > self.config.inline_context_budget;
        let context = ExecutionContext::call(
            ContextRef::Heap(scope),
            code,
            function,
            strict,
            args,
            compiled.formals.len(),
            compiled.locals.len(),
        );

        let mark = self.roots.scratch.len();
        self.roots.scratch.push(this);
        self.roots.scratch.push(function);
        self.roots.scratch.extend_from_slice(context.arguments());
        let context = if on_heap {
            ContextRef::Heap(self.alloc(context))
        } else {
            self.roots.inline.push(InlineSlot::Live(context));
            ContextRef::Inline(self.roots.inline.len() - 1)
        };
        self.roots.scratch.truncate(mark);

        let base = self.roots.registers.len();
        self.roots
            .registers
            .resize(base + compiled.register_count as usize, Value::Undefined);
        let caller_context = self.roots.current.replace(context);
        self.roots.frames.push(CallFrame {
            unit: code.unit,
            function: code.function,
            pc: 0,
            base,
            this,
            acc: Value::Undefined,
            context,
            caller_context,
            handler: None,
        });
        trace!(
            function = unit.unit.function_name(code.function as usize),
            depth = self.roots.frames.len(),
            inline = !on_heap,
            "enter function"
        );
        self.notify_debugger(&unit, HookPoint::Enter);

        let result = self.execute(&unit);

        self.roots.frames.pop();
        self.roots.registers.truncate(base);
        self.roots.current = caller_context;
        match context {
            ContextRef::Inline(i) => {
                debug_assert_eq!(i + 1, self.roots.inline.len());
                self.roots.inline.truncate(i);
            }
            ContextRef::Heap(g) => {
                if let Some(context) = self.heap.get_as_mut::<ExecutionContext>(g) {
                    context.release_arguments();
                }
            }
        }
        result
    }

    // ----------------------------------------------------------------
    // Debugger

    pub(crate) fn notify_debugger(&mut self, unit: &LoadedUnit, point: HookPoint) {
        if !self.config.debug_mode {
            return;
        }
        let Some(mut hooks) = self.debugger.take() else {
            return;
        };
        if let Some(frame) = self.roots.frames.last() {
            let line = unit
                .unit
                .functions
                .get(frame.function as usize)
                .and_then(|f| f.line_for_offset(frame.pc))
                .unwrap_or(0);
            let info = FrameInfo {
                file_name: &unit.unit.file_name,
                function_name: unit.unit.function_name(frame.function as usize),
                line,
                depth: self.roots.frames.len(),
            };
            match point {
                HookPoint::Enter => hooks.enter_function(&info),
                HookPoint::BreakSlot => hooks.break_slot(&info),
            }
        }
        if self.debugger.is_none() {
            self.debugger = Some(hooks);
        } else {
            warn!("debugger replaced from inside a debugger hook");
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum HookPoint {
    Enter,
    BreakSlot,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("units", &self.units.len())
            .field("call_depth", &self.roots.frames.len())
            .field("has_exception", &self.has_exception)
            .field("heap", &self.heap.stats())
            .field("debugger", &self.debugger.is_some())
            .finish()
    }
}
