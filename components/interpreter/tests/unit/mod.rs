//! Unit tests for interpreter components

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use bytecode_system::{FunctionBuilder, Opcode, RegisterId, UnitBuilder};
use core_types::Value;
use exec_allocator::ExecutableAllocator;
use interpreter::abi::{self, runtime_function_address};
use interpreter::{
    DebugAgent, DebugHooks, Engine, EngineConfig, FrameInfo, PauseEvent, PauseReason, StepAction,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn debug_engine() -> Engine {
    Engine::with_config(EngineConfig {
        debug_mode: true,
        ..EngineConfig::default()
    })
}

/// main.js: line 1 `Debug`, line 2 calls `f`, whose body is line 5.
fn debuggable_unit() -> UnitBuilder {
    let mut unit = UnitBuilder::new("/src/app/main.js");
    let f_name = unit.intern("f");

    let mut main = FunctionBuilder::new(unit.intern("main"));
    main.flags_mut().has_nested_functions = true;
    main.set_line(1);
    main.emit(Opcode::Debug);
    main.emit(Opcode::CreateClosure(1));
    main.emit(Opcode::StoreName(f_name));
    main.set_line(2);
    main.emit(Opcode::Debug);
    main.emit(Opcode::CallName {
        name: f_name,
        argv: RegisterId(0),
        argc: 0,
    });
    main.set_line(3);
    main.emit(Opcode::Debug);
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    let mut f = FunctionBuilder::new(f_name);
    f.set_line(5);
    f.emit(Opcode::Debug);
    f.emit(Opcode::LoadInt(1));
    f.emit(Opcode::Ret);
    unit.add_function(f.finish().unwrap());
    unit
}

#[derive(Default)]
struct Recorder {
    events: Rc<RefCell<Vec<(&'static str, String, u32, usize)>>>,
}

impl DebugHooks for Recorder {
    fn enter_function(&mut self, frame: &FrameInfo<'_>) {
        self.events
            .borrow_mut()
            .push(("enter", frame.function_name.to_string(), frame.line, frame.depth));
    }

    fn break_slot(&mut self, frame: &FrameInfo<'_>) {
        self.events
            .borrow_mut()
            .push(("slot", frame.function_name.to_string(), frame.line, frame.depth));
    }
}

// ============================================================================
// Debugger hooks
// ============================================================================

#[test]
fn test_hooks_see_every_function_entry_and_slot() {
    init_tracing();
    let recorder = Recorder::default();
    let events = Rc::clone(&recorder.events);

    let mut engine = debug_engine();
    engine.set_debugger(Some(Box::new(recorder)));
    let id = engine.load_unit(debuggable_unit().build()).unwrap();
    engine.run_unit(id).unwrap();

    let events = events.borrow();
    let expected = vec![
        ("enter", "main".to_string(), 1, 1),
        ("slot", "main".to_string(), 1, 1),
        ("slot", "main".to_string(), 2, 1),
        ("enter", "f".to_string(), 5, 2),
        ("slot", "f".to_string(), 5, 2),
        ("slot", "main".to_string(), 3, 1),
    ];
    assert_eq!(*events, expected);
}

#[test]
fn test_hooks_silent_without_debug_mode() {
    let recorder = Recorder::default();
    let events = Rc::clone(&recorder.events);

    let mut engine = Engine::new();
    engine.set_debugger(Some(Box::new(recorder)));
    let id = engine.load_unit(debuggable_unit().build()).unwrap();
    engine.run_unit(id).unwrap();
    assert!(events.borrow().is_empty());
}

fn pause_log(agent: &SharedAgent) -> Arc<Mutex<Vec<PauseEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    agent
        .lock()
        .set_pause_handler(move |event| sink.lock().unwrap().push(event.clone()));
    log
}

type SharedAgent = Arc<parking_lot::Mutex<DebugAgent>>;

#[test]
fn test_agent_pauses_on_step_then_breakpoint() {
    init_tracing();
    let agent = DebugAgent::shared();
    let log = pause_log(&agent);
    let breakpoint = {
        let mut agent = agent.lock();
        agent.prepare_step(StepAction::In);
        agent.insert_breakpoint("app/main.js", 5, None).unwrap()
    };

    let mut engine = debug_engine();
    engine.set_debugger(Some(Box::new(Arc::clone(&agent))));
    let id = engine.load_unit(debuggable_unit().build()).unwrap();
    engine.run_unit(id).unwrap();

    let log = log.lock().unwrap();
    let summary: Vec<_> = log
        .iter()
        .map(|e| (e.reason.clone(), e.function_name.as_str(), e.line, e.depth))
        .collect();
    assert_eq!(
        summary,
        vec![
            (PauseReason::Step, "main", 1, 1),
            (PauseReason::Breakpoint(breakpoint), "f", 5, 2),
        ]
    );
    assert_eq!(agent.lock().pause_count(), 2);
}

/// Forwards to a shared agent and prepares a step-over after the first
/// pause, the way a front end would from its pause handler.
struct StepOverAfterPause {
    agent: SharedAgent,
    armed: bool,
}

impl DebugHooks for StepOverAfterPause {
    fn enter_function(&mut self, frame: &FrameInfo<'_>) {
        self.agent.lock().enter_function(frame);
    }

    fn break_slot(&mut self, frame: &FrameInfo<'_>) {
        let mut agent = self.agent.lock();
        agent.break_slot(frame);
        if !self.armed && agent.pause_count() == 1 {
            self.armed = true;
            agent.prepare_step(StepAction::Over);
        }
    }
}

#[test]
fn test_step_over_skips_the_callee() {
    let agent = DebugAgent::shared();
    let log = pause_log(&agent);
    agent.lock().insert_breakpoint("/src/app/main.js", 2, None).unwrap();

    let mut engine = debug_engine();
    engine.set_debugger(Some(Box::new(StepOverAfterPause {
        agent: Arc::clone(&agent),
        armed: false,
    })));
    let id = engine.load_unit(debuggable_unit().build()).unwrap();
    engine.run_unit(id).unwrap();

    let lines: Vec<_> = log
        .lock()
        .unwrap()
        .iter()
        .map(|e| (e.function_name.clone(), e.line))
        .collect();
    assert_eq!(lines, vec![("main".to_string(), 2), ("main".to_string(), 3)]);
}

#[test]
fn test_conditional_breakpoint_consults_evaluator() {
    let agent = DebugAgent::shared();
    let log = pause_log(&agent);
    {
        let mut agent = agent.lock();
        agent.set_condition_evaluator(|condition, frame| condition == "deep" && frame.depth > 1);
        agent.insert_breakpoint("main.js", 1, Some("deep")).unwrap();
        agent.insert_breakpoint("main.js", 5, Some("deep")).unwrap();
    }

    let mut engine = debug_engine();
    engine.set_debugger(Some(Box::new(Arc::clone(&agent))));
    let id = engine.load_unit(debuggable_unit().build()).unwrap();
    engine.run_unit(id).unwrap();

    let lines: Vec<_> = log.lock().unwrap().iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![5]);
}

#[test]
fn test_agent_command_channel() {
    let mut agent = DebugAgent::new();
    assert_eq!(
        agent.handle_command(r#"{"command":"protocolVersion"}"#),
        r#"{"command":"protocolVersion","result":1}"#
    );
    assert_eq!(
        agent.handle_command(r#"{"command":"insertBreakpoint","arguments":{"fullName":"a.js","lineNumber":0}}"#),
        r#"{"command":"insertBreakpoint","result":-1}"#
    );
    assert_eq!(
        agent.handle_command(r#"{"command":"removeBreakpoint","arguments":{"id":9}}"#),
        r#"{"command":"removeBreakpoint","result":-2}"#
    );
    assert_eq!(
        agent.handle_command(r#"{"command":"prepareStep","arguments":{"stepAction":"out"}}"#),
        r#"{"command":"prepareStep","result":0}"#
    );
    assert_eq!(
        agent.handle_command(r#"{"command":"evaluate"}"#),
        r#"{"command":"evaluate","result":-3}"#
    );
    assert_eq!(agent.handle_command("{"), r#"{"command":"","result":-4}"#);
}

// ============================================================================
// Runtime-call ABI
// ============================================================================

type BinaryEntry = unsafe extern "C" fn(*mut Engine, u64, u64) -> u64;
type PropertyEntry = unsafe extern "C" fn(*mut Engine, u64, *const u8, usize) -> u64;

#[test]
fn test_entry_points_callable_by_address() {
    let mut engine = Engine::new();
    let e: *mut Engine = &mut engine;

    let add = runtime_function_address("rt_add").unwrap();
    // SAFETY: the table maps "rt_add" to a function of this signature.
    let add: BinaryEntry = unsafe { std::mem::transmute::<usize, BinaryEntry>(add) };
    let sum = unsafe { add(e, Value::Int32(40).to_bits(), Value::Int32(2).to_bits()) };
    assert_eq!(Value::from_bits(sum), Some(Value::Int32(42)));

    let get = runtime_function_address("rt_get_property").unwrap();
    // SAFETY: as above.
    let get: PropertyEntry = unsafe { std::mem::transmute::<usize, PropertyEntry>(get) };
    let object = engine.new_object();
    engine.set_property(object, "n", Value::Double(0.5));
    let e: *mut Engine = &mut engine;
    let name = "n";
    let value = unsafe { get(e, object.to_bits(), name.as_ptr(), name.len()) };
    assert_eq!(Value::from_bits(value), Some(Value::Double(0.5)));
}

#[test]
fn test_entry_point_calls_script_function() {
    let mut unit = UnitBuilder::new("abi.js");
    let double = unit.intern("double");
    let mut main = FunctionBuilder::new(unit.intern("main"));
    main.flags_mut().has_nested_functions = true;
    main.emit(Opcode::CreateClosure(1));
    main.emit(Opcode::StoreName(double));
    main.emit(Opcode::Ret);
    unit.add_function(main.finish().unwrap());

    let mut f = FunctionBuilder::new(double);
    let x = f.add_formal(unit.intern("x"));
    let r0 = f.alloc_register();
    f.emit(Opcode::LoadArg(x));
    f.emit(Opcode::StoreReg(r0));
    f.emit(Opcode::Add(r0));
    f.emit(Opcode::Ret);
    unit.add_function(f.finish().unwrap());

    let mut engine = Engine::new();
    let id = engine.load_unit(unit.build()).unwrap();
    engine.run_unit(id).unwrap();
    let function = engine.get_global("double").unwrap();

    let e: *mut Engine = &mut engine;
    let argv = [Value::Int32(21).to_bits()];
    let result = unsafe {
        abi::rt_call_value(e, function.to_bits(), Value::Undefined.to_bits(), argv.as_ptr(), argv.len())
    };
    assert_eq!(Value::from_bits(result), Some(Value::Int32(42)));
    assert_eq!(unsafe { abi::rt_has_exception(e) }, 0);

    let result = unsafe { abi::rt_call_value(e, Value::Null.to_bits(), 0, std::ptr::null(), 0) };
    assert_eq!(Value::from_bits(result), Some(Value::Undefined));
    assert_eq!(unsafe { abi::rt_has_exception(e) }, 1);
}

// ============================================================================
// Installed code
// ============================================================================

#[test]
fn test_install_code_copies_bytes() {
    let mut engine = Engine::new();
    let allocator = Arc::new(ExecutableAllocator::new());
    engine.set_code_allocator(Arc::clone(&allocator));

    // ret; int3 padding
    let code = [0xC3u8, 0xCC, 0xCC, 0xCC];
    let block = engine.install_code(&code);
    assert_eq!(block.len(), code.len());
    assert!(block.reserved() >= code.len());
    let installed = unsafe { std::slice::from_raw_parts(block.entry(), block.len()) };
    assert_eq!(installed, &code);
    assert!(allocator.check_consistency());

    drop(block);
    assert!(allocator.check_consistency());
}

#[test]
fn test_install_empty_code() {
    let mut engine = Engine::new();
    let allocator = Arc::new(ExecutableAllocator::new());
    engine.set_code_allocator(Arc::clone(&allocator));

    let block = engine.install_code(&[]);
    assert!(block.is_empty());
    assert!(block.entry().is_null());
    assert_eq!(block.reserved(), 0);
    assert_eq!(allocator.stats().chunks, 0);
    assert!(format!("{block:?}").contains("CodeBlock"));
    drop(block);
    assert_eq!(allocator.stats().allocated_bytes, 0);
}
