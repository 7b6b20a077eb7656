//! Contract tests for the interpreter API
//!
//! These tests pin down the host-facing behavior of [`Engine`]: unit
//! loading, the exception-flag protocol and error conversion.

use bytecode_system::{CompilationUnit, FunctionBuilder, Opcode, UnitBuilder};
use core_types::{ErrorKind, Value};
use interpreter::{Engine, EngineConfig};

fn returning(op: Opcode) -> CompilationUnit {
    let mut unit = UnitBuilder::new("contract.js");
    let mut main = FunctionBuilder::new(unit.intern("main"));
    main.emit(op);
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());
    unit.build()
}

/// Engine::new() starts with a global object and the error constructors
#[test]
fn test_engine_new_contract() {
    let engine = Engine::new();
    assert!(engine.global_object().is_managed());
    assert!(engine.get_global("TypeError").is_some());
    assert!(!engine.has_exception());
    assert_eq!(engine.call_depth(), 0);
}

/// load_unit() rejects units that fail validation
#[test]
fn test_load_unit_rejects_malformed_code() {
    let mut unit = UnitBuilder::new("bad.js");
    let mut main = FunctionBuilder::new(unit.intern("main"));
    main.emit(Opcode::LoadInt(1));
    unit.add_function(main.finish().unwrap());

    let mut engine = Engine::new();
    assert!(engine.load_unit(unit.build()).is_err());
}

/// load_unit() rejects argument windows past the register file, even
/// when the window end overflows
#[test]
fn test_load_unit_rejects_overflowing_window() {
    let mut unit = UnitBuilder::new("window.js");
    let mut main = FunctionBuilder::new(unit.intern("main"));
    let callee = main.alloc_registers(3);
    main.emit(Opcode::CallValue {
        func: callee,
        argv: callee.offset(2),
        argc: u32::MAX,
    });
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    let image = unit.build().to_bytes();
    let unit = CompilationUnit::from_bytes(&image).unwrap();
    let mut engine = Engine::new();
    assert!(engine.load_unit(unit).is_err());
}

/// run_unit() returns the top-level completion value
#[test]
fn test_run_unit_contract() {
    let mut engine = Engine::new();
    let id = engine.load_unit(returning(Opcode::LoadInt(42))).unwrap();
    assert_eq!(engine.run_unit(id).unwrap(), Value::Int32(42));
    // Units can be run again.
    assert_eq!(engine.run_unit(id).unwrap(), Value::Int32(42));
}

/// run_unit() converts an uncaught error object into its kind and message
#[test]
fn test_run_unit_reports_uncaught_error() {
    let mut unit = UnitBuilder::new("throws.js");
    let name = unit.intern("undeclared");
    let mut main = FunctionBuilder::new(unit.intern("main"));
    main.set_line(3);
    main.emit(Opcode::LoadName(name));
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    let mut engine = Engine::new();
    let id = engine.load_unit(unit.build()).unwrap();
    let err = engine.run_unit(id).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ReferenceError);
    assert_eq!(err.message, "undeclared is not defined");
    assert_eq!(err.stack.len(), 1);
    assert_eq!(err.stack[0].line, 3);
    assert_eq!(err.stack[0].source_url.as_deref(), Some("throws.js"));
    assert!(!engine.has_exception());
}

/// The host can raise and observe exceptions directly
#[test]
fn test_exception_flag_protocol() {
    let mut engine = Engine::new();
    assert_eq!(engine.take_exception(), None);

    let result = engine.throw_error(ErrorKind::RangeError, "too far");
    assert_eq!(result, Value::Undefined);
    assert!(engine.has_exception());

    let thrown = engine.take_exception().unwrap();
    assert!(!engine.has_exception());
    let err = engine.to_js_error(thrown);
    assert_eq!(err.kind, ErrorKind::RangeError);
    assert_eq!(err.message, "too far");
}

/// call() on a non-callable sets the flag and returns undefined
#[test]
fn test_call_non_function_contract() {
    let mut engine = Engine::new();
    let result = engine.call(Value::Int32(1), Value::Undefined, &[]);
    assert_eq!(result, Value::Undefined);
    let thrown = engine.take_exception().unwrap();
    assert_eq!(engine.to_js_error(thrown).kind, ErrorKind::TypeError);
}

/// Native functions receive `this` and their arguments
#[test]
fn test_native_function_contract() {
    fn sum(engine: &mut Engine, _this: Value, args: &[Value]) -> Value {
        let mut total = 0.0;
        for arg in args {
            total += interpreter::runtime::to_number(engine, *arg);
        }
        Value::from_number(total)
    }

    let mut engine = Engine::new();
    let f = engine.register_global_function("sum", sum);
    let result = engine
        .call_function(f, Value::Undefined, &[Value::Int32(1), Value::Double(2.5)])
        .unwrap();
    assert_eq!(result, Value::Double(3.5));
    assert_eq!(engine.get_global("sum"), Some(f));
}

/// A native function that throws makes the call fail
#[test]
fn test_native_exception_contract() {
    fn fail(engine: &mut Engine, _this: Value, _args: &[Value]) -> Value {
        engine.throw_error(ErrorKind::TypeError, "nope");
        Value::Int32(9)
    }

    let mut engine = Engine::new();
    let f = engine.register_global_function("fail", fail);
    let err = engine.call_function(f, Value::Undefined, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "nope");
}

/// Properties written by the host are visible to scripts and back
#[test]
fn test_property_access_contract() {
    let mut engine = Engine::new();
    let object = engine.new_object();
    engine.set_property(object, "answer", Value::Int32(42));
    assert_eq!(engine.get_property(object, "answer"), Value::Int32(42));
    assert_eq!(engine.get_property(object, "missing"), Value::Undefined);
    assert!(!engine.has_exception());

    engine.get_property(Value::Undefined, "answer");
    assert!(engine.has_exception());
    engine.take_exception();
}

/// Configuration parses from JSON and rejects unusable values
#[test]
fn test_engine_config_contract() {
    let config = EngineConfig::from_json(r#"{ "max_call_depth": 8 }"#).unwrap();
    assert_eq!(config.max_call_depth, 8);
    assert!(EngineConfig::from_json(r#"{ "max_call_depth": 0 }"#).is_err());
    assert!(EngineConfig::from_json("not json").is_err());
}
