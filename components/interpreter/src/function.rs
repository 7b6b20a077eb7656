//! Function objects and the arguments object

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use core_types::{GcRef, Value};
use memory_manager::{Managed, PreferredType, Primitive, PropertyStore, Tracer};

use crate::context::FunctionCode;
use crate::engine::Engine;

/// Host function callable from scripts.
///
/// Receives the engine, the `this` value and the arguments. Exceptions are
/// raised through [`Engine::throw_value`] or [`Engine::throw_error`]; the
/// returned value is ignored when the exception flag is set.
pub type NativeFunction = fn(&mut Engine, Value, &[Value]) -> Value;

/// What a function object executes
#[derive(Clone)]
pub enum FunctionKind {
    /// Compiled function closed over a heap context
    Script {
        /// Code to run
        code: FunctionCode,
        /// Context the closure was created in
        scope: GcRef,
    },
    /// Host function
    Native {
        /// Name reported in diagnostics
        name: Rc<str>,
        /// Implementation
        function: NativeFunction,
    },
}

impl fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Script { code, scope } => f
                .debug_struct("Script")
                .field("code", code)
                .field("scope", scope)
                .finish(),
            FunctionKind::Native { name, .. } => {
                f.debug_struct("Native").field("name", name).finish()
            }
        }
    }
}

/// Callable object
#[derive(Debug, Clone)]
pub struct FunctionObject {
    kind: FunctionKind,
    name: Rc<str>,
    properties: PropertyStore,
    prototype: Option<GcRef>,
}

impl FunctionObject {
    /// Closure over `scope`.
    pub fn script(code: FunctionCode, scope: GcRef, name: Rc<str>, prototype: Option<GcRef>) -> Self {
        FunctionObject {
            kind: FunctionKind::Script { code, scope },
            name,
            properties: PropertyStore::new(),
            prototype,
        }
    }

    /// Host function.
    pub fn native(name: &str, function: NativeFunction, prototype: Option<GcRef>) -> Self {
        let name: Rc<str> = Rc::from(name);
        FunctionObject {
            kind: FunctionKind::Native {
                name: name.clone(),
                function,
            },
            name,
            properties: PropertyStore::new(),
            prototype,
        }
    }

    /// What the function runs.
    pub fn kind(&self) -> &FunctionKind {
        &self.kind
    }

    /// Function name, empty for anonymous functions.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Managed for FunctionObject {
    fn class_name(&self) -> &'static str {
        "Function"
    }

    fn trace(&self, tracer: &mut Tracer) {
        if let FunctionKind::Script { scope, .. } = self.kind {
            tracer.mark(scope);
        }
        self.properties.trace(tracer);
        if let Some(proto) = self.prototype {
            tracer.mark(proto);
        }
    }

    fn properties(&self) -> Option<&PropertyStore> {
        Some(&self.properties)
    }

    fn properties_mut(&mut self) -> Option<&mut PropertyStore> {
        Some(&mut self.properties)
    }

    fn prototype(&self) -> Option<GcRef> {
        self.prototype
    }

    fn set_prototype(&mut self, prototype: Option<GcRef>) {
        self.prototype = prototype;
    }

    fn default_value(&self, hint: PreferredType) -> Primitive {
        match hint {
            PreferredType::Number => Primitive::Number(f64::NAN),
            _ => Primitive::Text(format!("function {}() {{ [code] }}", self.name)),
        }
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// `arguments` object: a live view over a call context's argument slots.
#[derive(Debug, Clone)]
pub struct ArgumentsObject {
    context: GcRef,
    properties: PropertyStore,
    prototype: Option<GcRef>,
}

impl ArgumentsObject {
    /// View over the arguments of a heap call context.
    pub fn new(context: GcRef, prototype: Option<GcRef>) -> Self {
        ArgumentsObject {
            context,
            properties: PropertyStore::new(),
            prototype,
        }
    }

    /// The call context whose arguments are exposed.
    pub fn context(&self) -> GcRef {
        self.context
    }
}

impl Managed for ArgumentsObject {
    fn class_name(&self) -> &'static str {
        "Arguments"
    }

    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark(self.context);
        self.properties.trace(tracer);
        if let Some(proto) = self.prototype {
            tracer.mark(proto);
        }
    }

    fn properties(&self) -> Option<&PropertyStore> {
        Some(&self.properties)
    }

    fn properties_mut(&mut self) -> Option<&mut PropertyStore> {
        Some(&mut self.properties)
    }

    fn prototype(&self) -> Option<GcRef> {
        self.prototype
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
