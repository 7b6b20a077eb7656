//! Dispatch loop for bytecode execution
//!
//! One call of [`Engine::execute`] runs one frame. Calls re-enter the loop
//! through the runtime helpers and return once the callee finished or
//! threw. Exceptions never unwind the host stack: a failing instruction
//! leaves the engine's exception flag set, and the loop then either jumps
//! to the frame's installed handler or returns `undefined` so the caller
//! repeats the check.

use std::rc::Rc;
use std::sync::atomic::Ordering;

use bytecode_system::{CompareOp, Constant, Opcode, RegisterId};
use core_types::{arith::BitOp, array_index_from_name, ErrorKind, Value};
use tracing::{error, warn};

use crate::call_frame::ExceptionHandler;
use crate::context::ContextRef;
use crate::engine::{Engine, HookPoint, LoadedUnit};
use crate::runtime;

fn int_compare(op: CompareOp, a: i32, b: i32) -> bool {
    match op {
        CompareOp::Eq | CompareOp::StrictEq => a == b,
        CompareOp::Ne | CompareOp::StrictNe => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    }
}

impl Engine {
    /// Runs the innermost frame until `Ret` or an unhandled exception.
    pub(crate) fn execute(&mut self, unit: &LoadedUnit) -> Value {
        let frame_index = self.roots.frames.len() - 1;
        let (unit_index, function_index, base, frame_context) = {
            let frame = &self.roots.frames[frame_index];
            (frame.unit, frame.function, frame.base, frame.context)
        };
        let Some(function) = unit.unit.functions.get(function_index as usize) else {
            return Value::Undefined;
        };
        let code = function.code.as_slice();

        let mut pc = 0usize;
        let mut acc = Value::Undefined;

        macro_rules! reg {
            ($r:expr) => {
                self.roots.registers[base + $r.0 as usize]
            };
        }

        loop {
            if self.interrupt.swap(false, Ordering::AcqRel) {
                warn!(
                    function = unit.unit.function_name(function_index as usize),
                    pc, "execution interrupted"
                );
                self.throw_error(ErrorKind::Error, "Execution interrupted");
                match self.enter_handler(frame_index) {
                    Some(target) => {
                        pc = target;
                        continue;
                    }
                    None => return Value::Undefined,
                }
            }

            let (op, next) = match Opcode::decode(code, pc) {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug_assert!(false, "malformed bytecode: {e}");
                    error!(error = %e, file = %unit.unit.file_name, "malformed bytecode");
                    return Value::Undefined;
                }
            };
            {
                let frame = &mut self.roots.frames[frame_index];
                frame.pc = pc;
                frame.acc = acc;
            }
            pc = next;

            match op {
                Opcode::Nop => {}
                Opcode::Debug => self.notify_debugger(unit, HookPoint::BreakSlot),

                Opcode::LoadUndefined => acc = Value::Undefined,
                Opcode::LoadNull => acc = Value::Null,
                Opcode::LoadTrue => acc = Value::Boolean(true),
                Opcode::LoadFalse => acc = Value::Boolean(false),
                Opcode::LoadInt(n) => acc = Value::Int32(n),
                Opcode::LoadConst(index) => {
                    acc = match function.constants.get(index as usize) {
                        Some(Constant::Undefined) | None => Value::Undefined,
                        Some(Constant::Null) => Value::Null,
                        Some(Constant::Boolean(b)) => Value::Boolean(*b),
                        Some(Constant::Number(n)) => Value::from_number(*n),
                        Some(Constant::String(s)) => self.unit_string(unit_index, *s),
                    };
                }
                Opcode::LoadRuntimeString(s) => acc = self.unit_string(unit_index, s),

                Opcode::LoadReg(r) => acc = reg!(r),
                Opcode::StoreReg(r) => reg!(r) = acc,
                Opcode::MoveReg { src, dst } => reg!(dst) = reg!(src),

                Opcode::LoadLocal(index) => {
                    acc = self
                        .context(frame_context)
                        .map_or(Value::Undefined, |c| c.local(index as usize));
                }
                Opcode::StoreLocal(index) => {
                    if let Some(context) = self.context_mut(frame_context) {
                        context.set_local(index as usize, acc);
                    }
                }
                Opcode::LoadScopedLocal { scope, index } => {
                    acc = self
                        .scoped_context(scope)
                        .and_then(|r| self.context(r))
                        .map_or(Value::Undefined, |c| c.local(index as usize));
                }
                Opcode::StoreScopedLocal { scope, index } => {
                    if let Some(r) = self.scoped_context(scope) {
                        if let Some(context) = self.context_mut(r) {
                            context.set_local(index as usize, acc);
                        }
                    }
                }
                Opcode::LoadArg(index) => {
                    acc = self
                        .context(frame_context)
                        .map_or(Value::Undefined, |c| c.argument(index as usize));
                }
                Opcode::StoreArg(index) => {
                    if let Some(context) = self.context_mut(frame_context) {
                        context.set_argument(index as usize, acc);
                    }
                }

                Opcode::LoadName(name) => acc = runtime::load_name(self, unit.name(name)),
                Opcode::StoreName(name) => runtime::store_name(self, unit.name(name), acc),
                Opcode::LoadGlobalLookup { name, cache } => {
                    acc = self.global_lookup(unit_index, function_index, cache, unit.name(name));
                }
                Opcode::LoadProperty { name, cache } => {
                    acc = self.cached_get(unit_index, function_index, cache, acc, unit.name(name));
                }
                Opcode::StoreProperty { base: object, name, cache } => {
                    let object = reg!(object);
                    self.cached_put(unit_index, function_index, cache, object, unit.name(name), acc);
                }
                Opcode::LoadElement { base: object } => {
                    let object = reg!(object);
                    acc = runtime::get_element(self, object, acc);
                }
                Opcode::StoreElement { base: object, index } => {
                    let (object, key) = (reg!(object), reg!(index));
                    runtime::set_element(self, object, key, acc);
                }
                Opcode::LoadThis => acc = self.roots.frames[frame_index].this,

                Opcode::CallValue { func, argv, argc } => {
                    let args = self.window(base, argv, argc);
                    let callee = reg!(func);
                    acc = runtime::call_value(self, callee, Value::Undefined, &args);
                }
                Opcode::CallProperty { base: object, name, argv, argc } => {
                    let args = self.window(base, argv, argc);
                    let object = reg!(object);
                    acc = runtime::call_property(self, object, unit.name(name), &args);
                }
                Opcode::CallElement { base: object, index, argv, argc } => {
                    let args = self.window(base, argv, argc);
                    let (object, key) = (reg!(object), reg!(index));
                    acc = runtime::call_element(self, object, key, &args);
                }
                Opcode::CallName { name, argv, argc } => {
                    let args = self.window(base, argv, argc);
                    acc = runtime::call_name(self, unit.name(name), &args);
                }
                Opcode::CallGlobalLookup { name, cache, argv, argc } => {
                    let args = self.window(base, argv, argc);
                    let name = unit.name(name);
                    let callee = self.global_lookup(unit_index, function_index, cache, name);
                    if !self.has_exception {
                        acc = if runtime::is_callable(self, callee) {
                            // The callee lives in a global property, which keeps it rooted.
                            runtime::call_value(self, callee, Value::Undefined, &args)
                        } else {
                            self.throw_error(ErrorKind::TypeError, &format!("{name} is not a function"))
                        };
                    }
                }
                Opcode::Construct { func, argv, argc } => {
                    let args = self.window(base, argv, argc);
                    let callee = reg!(func);
                    acc = runtime::construct(self, callee, &args);
                }

                Opcode::Jump(target) => pc = target as usize,
                Opcode::JumpTrue(target) => {
                    if runtime::to_boolean(self, acc) {
                        pc = target as usize;
                    }
                }
                Opcode::JumpFalse(target) => {
                    if !runtime::to_boolean(self, acc) {
                        pc = target as usize;
                    }
                }
                Opcode::CmpJump { op, lhs, target } => {
                    let taken = match (reg!(lhs), acc) {
                        (Value::Int32(a), Value::Int32(b)) => int_compare(op, a, b),
                        (lhs, rhs) => runtime::compare(self, op, lhs, rhs),
                    };
                    if taken && !self.has_exception {
                        pc = target as usize;
                    }
                }
                Opcode::CmpIntJump { op, imm, target } => {
                    let taken = match acc {
                        Value::Int32(a) => int_compare(op, a, imm),
                        _ => runtime::compare(self, op, acc, Value::Int32(imm)),
                    };
                    if taken && !self.has_exception {
                        pc = target as usize;
                    }
                }

                Opcode::CmpEq(r) => acc = self.compare_op(CompareOp::Eq, reg!(r), acc),
                Opcode::CmpNe(r) => acc = self.compare_op(CompareOp::Ne, reg!(r), acc),
                Opcode::CmpStrictEq(r) => {
                    acc = Value::Boolean(runtime::strict_equals(self, reg!(r), acc));
                }
                Opcode::CmpStrictNe(r) => {
                    acc = Value::Boolean(!runtime::strict_equals(self, reg!(r), acc));
                }
                Opcode::CmpLt(r) => acc = self.compare_op(CompareOp::Lt, reg!(r), acc),
                Opcode::CmpLe(r) => acc = self.compare_op(CompareOp::Le, reg!(r), acc),
                Opcode::CmpGt(r) => acc = self.compare_op(CompareOp::Gt, reg!(r), acc),
                Opcode::CmpGe(r) => acc = self.compare_op(CompareOp::Ge, reg!(r), acc),
                Opcode::CmpIn(r) => {
                    let key = reg!(r);
                    acc = Value::Boolean(runtime::has_property_op(self, key, acc));
                }
                Opcode::CmpInstanceOf(r) => {
                    let lhs = reg!(r);
                    acc = Value::Boolean(runtime::instance_of(self, lhs, acc));
                }

                Opcode::Add(r) => {
                    let lhs = reg!(r);
                    acc = runtime::add(self, lhs, acc);
                }
                Opcode::Sub(r) => {
                    let lhs = reg!(r);
                    acc = runtime::sub(self, lhs, acc);
                }
                Opcode::Mul(r) => {
                    let lhs = reg!(r);
                    acc = runtime::mul(self, lhs, acc);
                }
                Opcode::Div(r) => {
                    let lhs = reg!(r);
                    acc = runtime::div(self, lhs, acc);
                }
                Opcode::Mod(r) => {
                    let lhs = reg!(r);
                    acc = runtime::rem(self, lhs, acc);
                }
                Opcode::BitAnd(r) => {
                    let lhs = reg!(r);
                    acc = runtime::bitwise(self, BitOp::And, lhs, acc);
                }
                Opcode::BitOr(r) => {
                    let lhs = reg!(r);
                    acc = runtime::bitwise(self, BitOp::Or, lhs, acc);
                }
                Opcode::BitXor(r) => {
                    let lhs = reg!(r);
                    acc = runtime::bitwise(self, BitOp::Xor, lhs, acc);
                }
                Opcode::Shl(r) => {
                    let lhs = reg!(r);
                    acc = runtime::bitwise(self, BitOp::Shl, lhs, acc);
                }
                Opcode::Shr(r) => {
                    let lhs = reg!(r);
                    acc = runtime::bitwise(self, BitOp::Shr, lhs, acc);
                }
                Opcode::UShr(r) => {
                    let lhs = reg!(r);
                    acc = runtime::bitwise(self, BitOp::UShr, lhs, acc);
                }

                Opcode::Not => acc = Value::Boolean(!runtime::to_boolean(self, acc)),
                Opcode::UMinus => acc = runtime::negate(self, acc),
                Opcode::UPlus => acc = runtime::plus(self, acc),
                Opcode::UCompl => acc = runtime::complement(self, acc),
                Opcode::Increment => acc = runtime::increment(self, acc),
                Opcode::Decrement => acc = runtime::decrement(self, acc),
                Opcode::TypeOf => acc = runtime::type_of(self, acc),
                Opcode::TypeOfName(name) => acc = runtime::type_of_name(self, unit.name(name)),

                Opcode::SetExceptionHandler(target) => {
                    let context = self.roots.current.unwrap_or(frame_context);
                    self.roots.frames[frame_index].handler =
                        target.map(|target| ExceptionHandler { target, context });
                }
                Opcode::ThrowException => {
                    self.throw_value(acc);
                }
                Opcode::GetException => acc = self.take_exception().unwrap_or_default(),

                Opcode::PushWithContext => runtime::push_with_context(self, acc),
                Opcode::PushCatchContext(name) => {
                    let name = unit
                        .names
                        .get(name as usize)
                        .cloned()
                        .unwrap_or_else(|| Rc::from(""));
                    runtime::push_catch_context(self, name, acc);
                }
                Opcode::PopContext => runtime::pop_context(self),

                Opcode::DefineArray { argv, argc } => {
                    let elements = self.window(base, argv, argc);
                    acc = runtime::define_array(self, elements);
                }
                Opcode::DefineObjectLiteral { keys, argv, argc } => {
                    let values = self.window(base, argv, argc);
                    let keys: Vec<Rc<str>> = unit
                        .unit
                        .literal_keys
                        .get(keys as usize)
                        .map(|keys| {
                            keys.iter()
                                .map(|k| unit.names.get(*k as usize).cloned().unwrap_or_else(|| Rc::from("")))
                                .collect()
                        })
                        .unwrap_or_default();
                    acc = runtime::define_object_literal(self, &keys, &values);
                }
                Opcode::CreateClosure(index) => acc = runtime::create_closure(self, index),
                Opcode::CreateArgumentsObject => acc = runtime::create_arguments_object(self),
                Opcode::DeleteProperty { base: object, name } => {
                    let object = reg!(object);
                    acc = Value::Boolean(runtime::delete_property(self, object, unit.name(name)));
                }
                Opcode::DeleteName(name) => {
                    acc = Value::Boolean(runtime::delete_name(self, unit.name(name)));
                }

                Opcode::Ret => return acc,
            }

            if self.has_exception && op.can_throw() {
                match self.enter_handler(frame_index) {
                    Some(target) => pc = target,
                    None => return Value::Undefined,
                }
            }
        }
    }

    /// Transfers control to the frame's handler, restoring the context
    /// that was current when it was installed. The handler stays
    /// installed; generated code replaces it on entry to the catch block.
    fn enter_handler(&mut self, frame_index: usize) -> Option<usize> {
        let handler = self.roots.frames[frame_index].handler?;
        self.roots.current = Some(handler.context);
        Some(handler.target as usize)
    }

    fn window(&self, base: usize, argv: RegisterId, argc: u32) -> Vec<Value> {
        let start = base + argv.0 as usize;
        self.roots.registers[start..start + argc as usize].to_vec()
    }

    fn unit_string(&self, unit: usize, index: u32) -> Value {
        self.roots
            .unit_strings
            .get(unit)
            .and_then(|strings| strings.get(index as usize))
            .copied()
            .unwrap_or(Value::Undefined)
    }

    fn compare_op(&mut self, op: CompareOp, lhs: Value, rhs: Value) -> Value {
        if let (Value::Int32(a), Value::Int32(b)) = (lhs, rhs) {
            return Value::Boolean(int_compare(op, a, b));
        }
        Value::Boolean(runtime::compare(self, op, lhs, rhs))
    }

    /// Context `hops` outer links away from the current one.
    fn scoped_context(&self, hops: u32) -> Option<ContextRef> {
        let mut r = self.roots.current?;
        for _ in 0..hops {
            r = self.context(r)?.outer()?;
        }
        Some(r)
    }

    /// Global variable read through a shape-keyed cache.
    fn global_lookup(&mut self, unit: usize, function: u32, cache: u32, name: &str) -> Value {
        let global = self.roots.global_object;
        if let Some(shape) = self.heap.shape_of(global) {
            let hit = self.caches[unit].get(function, cache).and_then(|c| c.lookup(shape));
            if let Some(offset) = hit {
                if let Some(value) = self.own_slot(global, offset) {
                    return value;
                }
            }
            if let Some(offset) = self.heap.shapes().lookup(shape, name) {
                if let Some(cache) = self.caches[unit].get_mut(function, cache) {
                    cache.update(shape, offset);
                }
                if let Some(value) = self.own_slot(global, offset) {
                    return value;
                }
            }
        }
        match self.heap.get_property(global, name) {
            Some(value) => value,
            None => self.throw_error(ErrorKind::ReferenceError, &format!("{name} is not defined")),
        }
    }

    fn own_slot(&self, object: core_types::GcRef, offset: u32) -> Option<Value> {
        self.heap.get(object)?.properties()?.value_at(offset)
    }

    /// `object.name` through a shape-keyed cache. Only own named
    /// properties are cached; indexed names always take the slow path.
    fn cached_get(&mut self, unit: usize, function: u32, cache: u32, object: Value, name: &str) -> Value {
        let Some(r) = object.as_managed() else {
            return runtime::get_property(self, object, name);
        };
        let shape = self.heap.shape_of(r);
        if let Some(shape) = shape {
            let hit = self.caches[unit].get(function, cache).and_then(|c| c.lookup(shape));
            if let Some(value) = hit.and_then(|offset| self.own_slot(r, offset)) {
                return value;
            }
        }
        let value = runtime::get_object_property(self, r, name);
        if let Some(shape) = shape.filter(|_| array_index_from_name(name).is_none()) {
            if let Some(offset) = self.heap.shapes().lookup(shape, name) {
                if let Some(cache) = self.caches[unit].get_mut(function, cache) {
                    cache.update(shape, offset);
                }
            }
        }
        value
    }

    /// `object.name = value` through a shape-keyed cache.
    fn cached_put(&mut self, unit: usize, function: u32, cache: u32, object: Value, name: &str, value: Value) {
        let Some(r) = object.as_managed() else {
            runtime::set_property(self, object, name, value);
            return;
        };
        if let Some(shape) = self.heap.shape_of(r) {
            let hit = self.caches[unit].get(function, cache).and_then(|c| c.lookup(shape));
            if let Some(offset) = hit {
                let stored = self
                    .heap
                    .get_mut(r)
                    .and_then(|o| o.properties_mut())
                    .is_some_and(|p| p.set_value_at(offset, value));
                if stored {
                    return;
                }
            }
        }
        runtime::put_object_property(self, r, name, value);
        if self.has_exception || array_index_from_name(name).is_some() {
            return;
        }
        if let Some(shape) = self.heap.shape_of(r) {
            if let Some(offset) = self.heap.shapes().lookup(shape, name) {
                if let Some(cache) = self.caches[unit].get_mut(function, cache) {
                    cache.update(shape, offset);
                }
            }
        }
    }
}
