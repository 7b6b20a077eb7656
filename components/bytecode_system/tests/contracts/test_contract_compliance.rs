//! Public API contract for bytecode_system

use bytecode_system::{
    BuildError, CompilationUnit, CompiledFunction, Constant, DecodeError, FunctionBuilder,
    FunctionFlags, Opcode, RegisterId, UnitBuilder, NO_HANDLER,
};

#[test]
fn test_contract_add_scenario_encodes() {
    let mut unit = UnitBuilder::new("contract.js");
    let mut f = FunctionBuilder::new(unit.intern("main"));
    let r0 = f.alloc_register();
    assert_eq!(r0, RegisterId(0));
    f.emit(Opcode::LoadInt(2));
    f.emit(Opcode::StoreReg(r0));
    f.emit(Opcode::LoadInt(3));
    f.emit(Opcode::Add(r0));
    f.emit(Opcode::Ret);
    let function: CompiledFunction = f.finish().unwrap();
    assert_eq!(function.register_count, 1);
    assert_eq!(function.code.len(), 5 + 5 + 5 + 5 + 1);
    unit.add_function(function);
    unit.build().validate().unwrap();
}

#[test]
fn test_contract_heap_context_rule() {
    let mut f = FunctionBuilder::new(0);
    f.emit(Opcode::Ret);
    let plain = f.finish().unwrap();
    assert!(!plain.needs_heap_context());

    let mut f = FunctionBuilder::new(0);
    *f.flags_mut() = FunctionFlags {
        uses_arguments: true,
        ..FunctionFlags::default()
    };
    f.emit(Opcode::Ret);
    assert!(f.finish().unwrap().needs_heap_context());
}

#[test]
fn test_contract_errors_display() {
    let e = DecodeError::UnknownOpcode { tag: 0xab, offset: 3 };
    assert_eq!(e.to_string(), "unknown opcode 0xab at offset 3");
    assert_eq!(BuildError::UnboundLabel(2).to_string(), "label 2 was never bound");
}

#[test]
fn test_contract_no_handler_sentinel() {
    let mut code = Vec::new();
    Opcode::SetExceptionHandler(None).encode(&mut code);
    assert_eq!(&code[1..], &NO_HANDLER.to_le_bytes());
}

#[test]
fn test_contract_empty_unit_rejected() {
    assert!(CompilationUnit::default().validate().is_err());
    let _ = Constant::Undefined;
}
