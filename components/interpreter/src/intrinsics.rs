//! Objects every engine starts with: the base prototypes and the error
//! constructors.

use core_types::{ErrorKind, GcRef, Value};
use memory_manager::{Heap, JsObject, NoRoots, Tracer};

use crate::engine::Engine;
use crate::runtime;

/// Error kinds with a script-visible constructor.
pub(crate) const ERROR_KINDS: [ErrorKind; 7] = [
    ErrorKind::Error,
    ErrorKind::SyntaxError,
    ErrorKind::TypeError,
    ErrorKind::ReferenceError,
    ErrorKind::RangeError,
    ErrorKind::EvalError,
    ErrorKind::URIError,
];

#[derive(Debug, Clone, Copy)]
pub(crate) struct Intrinsics {
    pub(crate) object_prototype: GcRef,
    pub(crate) function_prototype: GcRef,
    pub(crate) array_prototype: GcRef,
    pub(crate) error_prototypes: [GcRef; ERROR_KINDS.len()],
}

impl Intrinsics {
    /// Allocates the prototypes. The heap must have collection blocked.
    pub(crate) fn create(heap: &mut Heap) -> Self {
        debug_assert!(heap.is_gc_blocked());
        let object_prototype = heap.allocate(JsObject::new(None), &NoRoots);
        let function_prototype = heap.allocate(JsObject::new(Some(object_prototype)), &NoRoots);
        let array_prototype = heap.allocate(JsObject::array(Some(object_prototype), Vec::new()), &NoRoots);
        let base_error = heap.allocate(JsObject::new(Some(object_prototype)), &NoRoots);
        let mut error_prototypes = [base_error; ERROR_KINDS.len()];
        for slot in error_prototypes.iter_mut().skip(1) {
            *slot = heap.allocate(JsObject::new(Some(base_error)), &NoRoots);
        }
        Intrinsics {
            object_prototype,
            function_prototype,
            array_prototype,
            error_prototypes,
        }
    }

    pub(crate) fn error_prototype(&self, kind: ErrorKind) -> GcRef {
        ERROR_KINDS
            .iter()
            .position(|k| *k == kind)
            .map_or(self.error_prototypes[0], |i| self.error_prototypes[i])
    }

    pub(crate) fn trace(&self, tracer: &mut Tracer) {
        tracer.mark(self.object_prototype);
        tracer.mark(self.function_prototype);
        tracer.mark(self.array_prototype);
        for proto in self.error_prototypes {
            tracer.mark(proto);
        }
    }
}

macro_rules! error_constructors {
    ($($fn_name:ident => $kind:expr),* $(,)?) => {
        $(
            fn $fn_name(engine: &mut Engine, _this: Value, args: &[Value]) -> Value {
                construct_error(engine, $kind, args)
            }
        )*

        const CONSTRUCTORS: [(ErrorKind, crate::function::NativeFunction); ERROR_KINDS.len()] = [
            $(($kind, $fn_name as crate::function::NativeFunction)),*
        ];
    };
}

error_constructors! {
    error_constructor => ErrorKind::Error,
    syntax_error_constructor => ErrorKind::SyntaxError,
    type_error_constructor => ErrorKind::TypeError,
    reference_error_constructor => ErrorKind::ReferenceError,
    range_error_constructor => ErrorKind::RangeError,
    eval_error_constructor => ErrorKind::EvalError,
    uri_error_constructor => ErrorKind::URIError,
}

/// `Error(message)` and `new Error(message)` both produce a fresh error.
fn construct_error(engine: &mut Engine, kind: ErrorKind, args: &[Value]) -> Value {
    let message = match args.first() {
        Some(v) if !v.is_undefined() => match runtime::to_rust_string(engine, *v) {
            Some(text) => text,
            None => return Value::Undefined,
        },
        _ => String::new(),
    };
    engine.new_error(kind, &message)
}

/// Installs `name`/`message` on the error prototypes and the constructors
/// on the global object.
pub(crate) fn install(engine: &mut Engine) {
    engine.no_gc(|engine| {
        let intrinsics = engine.intrinsics;
        let empty = engine.new_string("");
        for (kind, function) in CONSTRUCTORS {
            let proto = intrinsics.error_prototype(kind);
            let name = engine.new_string(kind.name());
            engine.heap.put_property(proto, "name", name);
            engine.heap.put_property(proto, "message", empty);

            let constructor = engine.register_global_function(kind.name(), function);
            if let Some(ctor) = constructor.as_managed() {
                engine.heap.put_property(ctor, "prototype", Value::Managed(proto));
                engine.heap.put_property(proto, "constructor", constructor);
            }
        }
    });
}
