//! Integration tests for the interpreter
//!
//! Whole compilation units run through the engine: scope chain, calls,
//! exception propagation, closures and collection during execution.

use std::sync::atomic::Ordering;

use bytecode_system::{CompareOp, FunctionBuilder, Opcode, RegisterId, UnitBuilder};
use core_types::{ErrorKind, Value};
use interpreter::{Engine, EngineConfig};

fn run(engine: &mut Engine, unit: UnitBuilder) -> Result<Value, core_types::JsError> {
    let id = engine.load_unit(unit.build()).expect("unit should validate");
    engine.run_unit(id)
}

#[test]
fn test_accumulator_add() {
    let mut unit = UnitBuilder::new("add.js");
    let mut main = FunctionBuilder::new(unit.intern("main"));
    let r0 = main.alloc_register();
    main.emit(Opcode::LoadInt(2));
    main.emit(Opcode::StoreReg(r0));
    main.emit(Opcode::LoadInt(3));
    main.emit(Opcode::Add(r0));
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    let mut engine = Engine::new();
    assert_eq!(run(&mut engine, unit).unwrap(), Value::Int32(5));
}

#[test]
fn test_arithmetic_through_registers() {
    let mut unit = UnitBuilder::new("arith.js");
    let mut main = FunctionBuilder::new(unit.intern("main"));
    let r0 = main.alloc_register();

    // (10 + 5) * 3 - 2
    main.emit(Opcode::LoadInt(10));
    main.emit(Opcode::StoreReg(r0));
    main.emit(Opcode::LoadInt(5));
    main.emit(Opcode::Add(r0));
    main.emit(Opcode::StoreReg(r0));
    main.emit(Opcode::LoadInt(3));
    main.emit(Opcode::Mul(r0));
    main.emit(Opcode::StoreReg(r0));
    main.emit(Opcode::LoadInt(2));
    main.emit(Opcode::Sub(r0));
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    let mut engine = Engine::new();
    assert_eq!(run(&mut engine, unit).unwrap(), Value::Int32(43));
}

#[test]
fn test_counting_loop() {
    let mut unit = UnitBuilder::new("loop.js");
    let mut main = FunctionBuilder::new(unit.intern("main"));
    let i = main.alloc_register();
    let sum = main.alloc_register();

    // for (i = 0, sum = 0; i < 10; i++) sum += i
    main.emit(Opcode::LoadInt(0));
    main.emit(Opcode::StoreReg(i));
    main.emit(Opcode::StoreReg(sum));
    let top = main.new_label();
    let done = main.new_label();
    main.bind(top);
    main.emit(Opcode::LoadReg(i));
    main.emit_jump(done, |target| Opcode::CmpIntJump {
        op: CompareOp::Ge,
        imm: 10,
        target,
    });
    main.emit(Opcode::Add(sum));
    main.emit(Opcode::StoreReg(sum));
    main.emit(Opcode::LoadReg(i));
    main.emit(Opcode::Increment);
    main.emit(Opcode::StoreReg(i));
    main.emit_jump(top, Opcode::Jump);
    main.bind(done);
    main.emit(Opcode::LoadReg(sum));
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    let mut engine = Engine::new();
    assert_eq!(run(&mut engine, unit).unwrap(), Value::Int32(45));
}

#[test]
fn test_with_context_shadows_global() {
    let mut unit = UnitBuilder::new("with.js");
    let x = unit.intern("x");
    let keys = unit.add_literal_keys(&["x"]);
    let mut main = FunctionBuilder::new(unit.intern("main"));
    let value = main.alloc_register();
    let object = main.alloc_register();
    let inside = main.alloc_register();

    // x = 1; o = { x: 2 }; with (o) { inside = x } return inside * 10 + x
    main.emit(Opcode::LoadInt(1));
    main.emit(Opcode::StoreName(x));
    main.emit(Opcode::LoadInt(2));
    main.emit(Opcode::StoreReg(value));
    main.emit(Opcode::DefineObjectLiteral {
        keys,
        argv: value,
        argc: 1,
    });
    main.emit(Opcode::StoreReg(object));
    main.emit(Opcode::PushWithContext);
    main.emit(Opcode::LoadName(x));
    main.emit(Opcode::StoreReg(inside));
    main.emit(Opcode::PopContext);
    main.emit(Opcode::LoadInt(10));
    main.emit(Opcode::Mul(inside));
    main.emit(Opcode::StoreReg(inside));
    main.emit(Opcode::LoadName(x));
    main.emit(Opcode::Add(inside));
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    let mut engine = Engine::new();
    assert_eq!(run(&mut engine, unit).unwrap(), Value::Int32(21));
    assert_eq!(engine.get_global("x"), Some(Value::Int32(1)));
}

#[test]
fn test_assignment_inside_with_writes_the_object() {
    let mut unit = UnitBuilder::new("with_store.js");
    let x = unit.intern("x");
    let keys = unit.add_literal_keys(&["x"]);
    let mut main = FunctionBuilder::new(unit.intern("main"));
    let value = main.alloc_register();
    let object = main.alloc_register();
    let read = main.alloc_lookup();

    main.emit(Opcode::LoadInt(0));
    main.emit(Opcode::StoreReg(value));
    main.emit(Opcode::DefineObjectLiteral {
        keys,
        argv: value,
        argc: 1,
    });
    main.emit(Opcode::StoreReg(object));
    main.emit(Opcode::PushWithContext);
    main.emit(Opcode::LoadInt(7));
    main.emit(Opcode::StoreName(x));
    main.emit(Opcode::PopContext);
    main.emit(Opcode::LoadReg(object));
    main.emit(Opcode::LoadProperty { name: x, cache: read });
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    let mut engine = Engine::new();
    assert_eq!(run(&mut engine, unit).unwrap(), Value::Int32(7));
    assert_eq!(engine.get_global("x"), None);
}

/// main defines f1 -> f2 -> f3, where f3 throws 77.
fn three_frame_unit() -> UnitBuilder {
    let mut unit = UnitBuilder::new("frames.js");
    let names = [unit.intern("f1"), unit.intern("f2"), unit.intern("f3")];

    let mut main = FunctionBuilder::new(unit.intern("main"));
    main.flags_mut().has_nested_functions = true;
    for (i, name) in names.iter().enumerate() {
        main.emit(Opcode::CreateClosure(i as u32 + 1));
        main.emit(Opcode::StoreName(*name));
    }
    main.emit(Opcode::LoadUndefined);
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    for (i, name) in names.iter().enumerate() {
        let mut f = FunctionBuilder::new(*name);
        f.set_line(10 * (i as u32 + 1));
        if let Some(callee) = names.get(i + 1) {
            f.emit(Opcode::CallName {
                name: *callee,
                argv: RegisterId(0),
                argc: 0,
            });
            f.emit(Opcode::Ret);
        } else {
            f.emit(Opcode::LoadInt(77));
            f.emit(Opcode::ThrowException);
        }
        unit.add_function(f.finish().unwrap());
    }
    unit
}

#[test]
fn test_exception_crosses_three_frames() {
    let mut engine = Engine::new();
    run(&mut engine, three_frame_unit()).unwrap();

    let f1 = engine.get_global("f1").unwrap();
    let result = engine.call(f1, Value::Undefined, &[]);
    assert_eq!(result, Value::Undefined);
    assert!(engine.has_exception());

    let frames: Vec<_> = engine
        .exception_stack()
        .iter()
        .map(|frame| (frame.function_name.clone().unwrap_or_default(), frame.line))
        .collect();
    assert_eq!(
        frames,
        vec![
            ("f3".to_string(), 30),
            ("f2".to_string(), 20),
            ("f1".to_string(), 10),
        ]
    );

    assert_eq!(engine.take_exception(), Some(Value::Int32(77)));
    assert!(!engine.has_exception());
    assert_eq!(engine.call_depth(), 0);
}

#[test]
fn test_uncaught_exception_becomes_error() {
    let mut engine = Engine::new();
    run(&mut engine, three_frame_unit()).unwrap();

    let f2 = engine.get_global("f2").unwrap();
    let err = engine.call_function(f2, Value::Undefined, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Error);
    assert_eq!(err.message, "Uncaught 77");
    assert_eq!(err.stack.len(), 2);
    assert!(!engine.has_exception());
}

#[test]
fn test_handler_catches_reference_error() {
    let mut unit = UnitBuilder::new("catch.js");
    let missing = unit.intern("missing");
    let e = unit.intern("e");
    let message = unit.intern("message");
    let mut main = FunctionBuilder::new(unit.intern("main"));
    let saved = main.alloc_register();
    let read = main.alloc_lookup();

    // try { missing } catch (e) { return e.message }
    let catch = main.new_label();
    main.emit_jump(catch, |target| Opcode::SetExceptionHandler(Some(target)));
    main.emit(Opcode::LoadName(missing));
    main.emit(Opcode::Ret);
    main.bind(catch);
    main.emit(Opcode::SetExceptionHandler(None));
    main.emit(Opcode::GetException);
    main.emit(Opcode::PushCatchContext(e));
    main.emit(Opcode::LoadName(e));
    main.emit(Opcode::LoadProperty { name: message, cache: read });
    main.emit(Opcode::StoreReg(saved));
    main.emit(Opcode::PopContext);
    main.emit(Opcode::LoadReg(saved));
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    let mut engine = Engine::new();
    let result = run(&mut engine, unit).unwrap();
    assert_eq!(engine.string_contents(result), Some("missing is not defined"));
    assert!(!engine.has_exception());
}

#[test]
fn test_handler_catches_error_thrown_by_callee() {
    let mut unit = UnitBuilder::new("callee.js");
    let thrower = unit.intern("thrower");
    let type_error = unit.intern("TypeError");
    let bad = unit.intern("bad");

    let mut main = FunctionBuilder::new(unit.intern("main"));
    main.flags_mut().has_nested_functions = true;
    let caught = main.alloc_register();
    let lookup = main.alloc_lookup();
    let catch = main.new_label();
    main.emit(Opcode::CreateClosure(1));
    main.emit(Opcode::StoreName(thrower));
    main.emit_jump(catch, |target| Opcode::SetExceptionHandler(Some(target)));
    main.emit(Opcode::CallName {
        name: thrower,
        argv: RegisterId(0),
        argc: 0,
    });
    main.emit(Opcode::LoadFalse);
    main.emit(Opcode::Ret);
    main.bind(catch);
    main.emit(Opcode::SetExceptionHandler(None));
    main.emit(Opcode::GetException);
    main.emit(Opcode::StoreReg(caught));
    main.emit(Opcode::LoadGlobalLookup {
        name: type_error,
        cache: lookup,
    });
    main.emit(Opcode::CmpInstanceOf(caught));
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    // function thrower() { throw new TypeError("bad") }
    let mut f = FunctionBuilder::new(thrower);
    let ctor = f.alloc_register();
    let arg = f.alloc_register();
    let lookup = f.alloc_lookup();
    f.emit(Opcode::LoadGlobalLookup {
        name: type_error,
        cache: lookup,
    });
    f.emit(Opcode::StoreReg(ctor));
    f.emit(Opcode::LoadRuntimeString(bad));
    f.emit(Opcode::StoreReg(arg));
    f.emit(Opcode::Construct {
        func: ctor,
        argv: arg,
        argc: 1,
    });
    f.emit(Opcode::ThrowException);
    unit.add_function(f.finish().unwrap());

    let mut engine = Engine::new();
    assert_eq!(run(&mut engine, unit).unwrap(), Value::Boolean(true));
}

#[test]
fn test_closure_shares_enclosing_local() {
    let mut unit = UnitBuilder::new("counter.js");
    let mut main = FunctionBuilder::new(unit.intern("main"));
    main.flags_mut().has_nested_functions = true;
    let count = main.add_local(unit.intern("count"));
    let inc = main.alloc_register();

    main.emit(Opcode::LoadInt(0));
    main.emit(Opcode::StoreLocal(count));
    main.emit(Opcode::CreateClosure(1));
    main.emit(Opcode::StoreReg(inc));
    for _ in 0..3 {
        main.emit(Opcode::CallValue {
            func: inc,
            argv: RegisterId(0),
            argc: 0,
        });
    }
    main.emit(Opcode::LoadLocal(count));
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    // function inc() { return ++count }
    let mut f = FunctionBuilder::new(unit.intern("inc"));
    f.emit(Opcode::LoadScopedLocal { scope: 1, index: 0 });
    f.emit(Opcode::Increment);
    f.emit(Opcode::StoreScopedLocal { scope: 1, index: 0 });
    f.emit(Opcode::Ret);
    unit.add_function(f.finish().unwrap());

    let mut engine = Engine::new();
    assert_eq!(run(&mut engine, unit).unwrap(), Value::Int32(3));
}

#[test]
fn test_closure_outlives_inline_context() {
    let mut unit = UnitBuilder::new("escape.js");
    let make = unit.intern("make");
    let n = unit.intern("n");

    let mut main = FunctionBuilder::new(unit.intern("main"));
    main.flags_mut().has_nested_functions = true;
    let maker = main.alloc_register();
    let arg = main.alloc_register();
    let getter = main.alloc_register();
    main.emit(Opcode::CreateClosure(1));
    main.emit(Opcode::StoreReg(maker));
    main.emit(Opcode::LoadInt(41));
    main.emit(Opcode::StoreReg(arg));
    main.emit(Opcode::CallValue {
        func: maker,
        argv: arg,
        argc: 1,
    });
    main.emit(Opcode::StoreReg(getter));
    main.emit(Opcode::CallValue {
        func: getter,
        argv: RegisterId(0),
        argc: 0,
    });
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    // function make(n) { return function () { return n + 1 } }
    // The flag is left off so the call context starts inline and is
    // promoted when the inner closure captures it.
    let mut f = FunctionBuilder::new(make);
    f.add_formal(n);
    f.emit(Opcode::CreateClosure(2));
    f.emit(Opcode::Ret);
    unit.add_function(f.finish().unwrap());

    let mut g = FunctionBuilder::new(unit.intern("get"));
    g.emit(Opcode::LoadName(n));
    g.emit(Opcode::Increment);
    g.emit(Opcode::Ret);
    unit.add_function(g.finish().unwrap());

    let mut engine = Engine::new();
    assert_eq!(run(&mut engine, unit).unwrap(), Value::Int32(42));
}

#[test]
fn test_construct_and_instanceof() {
    let mut unit = UnitBuilder::new("point.js");
    let x = unit.intern("x");

    let mut main = FunctionBuilder::new(unit.intern("main"));
    main.flags_mut().has_nested_functions = true;
    let ctor = main.alloc_register();
    let arg = main.alloc_register();
    let point = main.alloc_register();
    let read = main.alloc_lookup();
    let fail = main.new_label();
    main.emit(Opcode::CreateClosure(1));
    main.emit(Opcode::StoreReg(ctor));
    main.emit(Opcode::LoadInt(4));
    main.emit(Opcode::StoreReg(arg));
    main.emit(Opcode::Construct {
        func: ctor,
        argv: arg,
        argc: 1,
    });
    main.emit(Opcode::StoreReg(point));
    main.emit(Opcode::LoadReg(ctor));
    main.emit(Opcode::CmpInstanceOf(point));
    main.emit_jump(fail, Opcode::JumpFalse);
    main.emit(Opcode::LoadReg(point));
    main.emit(Opcode::LoadProperty { name: x, cache: read });
    main.emit(Opcode::Ret);
    main.bind(fail);
    main.emit(Opcode::LoadInt(-1));
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    // function Point(x) { this.x = x }
    let mut f = FunctionBuilder::new(unit.intern("Point"));
    f.add_formal(x);
    let this = f.alloc_register();
    let write = f.alloc_lookup();
    f.emit(Opcode::LoadThis);
    f.emit(Opcode::StoreReg(this));
    f.emit(Opcode::LoadArg(0));
    f.emit(Opcode::StoreProperty {
        base: this,
        name: x,
        cache: write,
    });
    f.emit(Opcode::LoadUndefined);
    f.emit(Opcode::Ret);
    unit.add_function(f.finish().unwrap());

    let mut engine = Engine::new();
    assert_eq!(run(&mut engine, unit).unwrap(), Value::Int32(4));
}

#[test]
fn test_runaway_recursion_is_a_range_error() {
    let mut unit = UnitBuilder::new("recurse.js");
    let r = unit.intern("r");
    let mut main = FunctionBuilder::new(unit.intern("main"));
    main.flags_mut().has_nested_functions = true;
    main.emit(Opcode::CreateClosure(1));
    main.emit(Opcode::StoreName(r));
    main.emit(Opcode::CallName {
        name: r,
        argv: RegisterId(0),
        argc: 0,
    });
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    let mut f = FunctionBuilder::new(r);
    f.emit(Opcode::CallName {
        name: r,
        argv: RegisterId(0),
        argc: 0,
    });
    f.emit(Opcode::Ret);
    unit.add_function(f.finish().unwrap());

    let config = EngineConfig {
        max_call_depth: 16,
        ..EngineConfig::default()
    };
    let mut engine = Engine::with_config(config);
    let err = run(&mut engine, unit).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RangeError);
    assert_eq!(err.message, "Maximum call stack size exceeded");
    assert_eq!(engine.call_depth(), 0);
}

#[test]
fn test_interrupt_raises_catchable_error() {
    fn tick(engine: &mut Engine, _this: Value, _args: &[Value]) -> Value {
        engine.interrupt_handle().store(true, Ordering::Release);
        Value::Undefined
    }

    let mut unit = UnitBuilder::new("spin.js");
    let tick_name = unit.intern("tick");
    let message = unit.intern("message");
    let mut main = FunctionBuilder::new(unit.intern("main"));
    let read = main.alloc_lookup();
    let catch = main.new_label();
    let top = main.new_label();

    // try { tick(); for (;;) {} } catch (e) { return e.message }
    main.emit_jump(catch, |target| Opcode::SetExceptionHandler(Some(target)));
    main.emit(Opcode::CallName {
        name: tick_name,
        argv: RegisterId(0),
        argc: 0,
    });
    main.bind(top);
    main.emit(Opcode::Nop);
    main.emit_jump(top, Opcode::Jump);
    main.bind(catch);
    main.emit(Opcode::SetExceptionHandler(None));
    main.emit(Opcode::GetException);
    main.emit(Opcode::LoadProperty { name: message, cache: read });
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    let mut engine = Engine::new();
    engine.register_global_function("tick", tick);
    let result = run(&mut engine, unit).unwrap();
    assert_eq!(engine.string_contents(result), Some("Execution interrupted"));
    assert!(!engine.interrupt_handle().load(Ordering::Acquire));
}

#[test]
fn test_uncaught_interrupt_stops_the_unit() {
    let mut unit = UnitBuilder::new("forever.js");
    let mut main = FunctionBuilder::new(unit.intern("main"));
    let top = main.new_label();
    main.bind(top);
    main.emit(Opcode::Nop);
    main.emit_jump(top, Opcode::Jump);
    unit.add_function(main.finish().unwrap());

    let mut engine = Engine::new();
    engine.interrupt_handle().store(true, Ordering::Release);
    let err = run(&mut engine, unit).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Error);
    assert_eq!(err.message, "Execution interrupted");
}

#[test]
fn test_collection_during_execution_keeps_live_values() {
    fn gc(engine: &mut Engine, _this: Value, _args: &[Value]) -> Value {
        engine.collect_garbage();
        Value::Undefined
    }

    let mut unit = UnitBuilder::new("gc.js");
    let gc_name = unit.intern("gc");
    let label = unit.intern("label");
    let keys = unit.add_literal_keys(&["label"]);
    let text = unit.intern("kept");

    let mut main = FunctionBuilder::new(unit.intern("main"));
    let value = main.alloc_register();
    let object = main.alloc_register();
    let read = main.alloc_lookup();
    main.emit(Opcode::LoadRuntimeString(text));
    main.emit(Opcode::StoreReg(value));
    main.emit(Opcode::DefineObjectLiteral {
        keys,
        argv: value,
        argc: 1,
    });
    main.emit(Opcode::StoreReg(object));
    // Garbage that the collection should reclaim.
    main.emit(Opcode::DefineArray { argv: value, argc: 1 });
    main.emit(Opcode::DefineArray { argv: value, argc: 1 });
    main.emit(Opcode::LoadUndefined);
    main.emit(Opcode::CallName {
        name: gc_name,
        argv: RegisterId(0),
        argc: 0,
    });
    main.emit(Opcode::LoadReg(object));
    main.emit(Opcode::LoadProperty { name: label, cache: read });
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    let mut engine = Engine::new();
    engine.register_global_function("gc", gc);
    let result = run(&mut engine, unit).unwrap();
    assert_eq!(engine.string_contents(result), Some("kept"));

    let stats = engine.gc_stats();
    assert!(stats.collections >= 1);
    assert!(stats.freed_last >= 2);
}

#[test]
fn test_arguments_object_reads_actuals() {
    let mut unit = UnitBuilder::new("args.js");
    let length = unit.intern("length");
    let zero = unit.intern("0");
    let mut main = FunctionBuilder::new(unit.intern("main"));
    main.flags_mut().has_nested_functions = true;
    let f = main.alloc_register();
    let args = main.alloc_registers(3);
    main.emit(Opcode::CreateClosure(1));
    main.emit(Opcode::StoreReg(f));
    for (i, n) in [5, 6, 7].into_iter().enumerate() {
        main.emit(Opcode::LoadInt(n));
        main.emit(Opcode::StoreReg(args.offset(i as u32)));
    }
    main.emit(Opcode::CallValue {
        func: f,
        argv: args,
        argc: 3,
    });
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    // function f() { return arguments.length * 10 + arguments[0] }
    let mut g = FunctionBuilder::new(unit.intern("f"));
    g.flags_mut().uses_arguments = true;
    let object = g.alloc_register();
    let scaled = g.alloc_register();
    let read = g.alloc_lookup();
    let first = g.alloc_lookup();
    g.emit(Opcode::CreateArgumentsObject);
    g.emit(Opcode::StoreReg(object));
    g.emit(Opcode::LoadProperty { name: length, cache: read });
    g.emit(Opcode::StoreReg(scaled));
    g.emit(Opcode::LoadInt(10));
    g.emit(Opcode::Mul(scaled));
    g.emit(Opcode::StoreReg(scaled));
    g.emit(Opcode::LoadReg(object));
    g.emit(Opcode::LoadProperty { name: zero, cache: first });
    g.emit(Opcode::Add(scaled));
    g.emit(Opcode::Ret);
    unit.add_function(g.finish().unwrap());

    let mut engine = Engine::new();
    assert_eq!(run(&mut engine, unit).unwrap(), Value::Int32(35));
}
