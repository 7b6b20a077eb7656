//! Compilation unit tests

use bytecode_system::{
    CompareOp, CompilationUnit, Constant, DecodeError, FunctionBuilder, Opcode, UnitBuilder,
};

fn loop_unit() -> CompilationUnit {
    // var i = 0; while (i < 10) i++; return i;
    let mut unit = UnitBuilder::new("loop.js");
    let mut f = FunctionBuilder::new(unit.intern("main"));
    let i = unit.intern("i");
    let local = f.add_local(i);
    let top = f.new_label();
    let done = f.new_label();

    f.set_line(1);
    f.emit(Opcode::LoadInt(0));
    f.emit(Opcode::StoreLocal(local));
    f.bind(top);
    f.set_line(2);
    f.emit(Opcode::LoadLocal(local));
    f.emit_jump(done, |target| Opcode::CmpIntJump {
        op: CompareOp::Ge,
        imm: 10,
        target,
    });
    f.emit(Opcode::Increment);
    f.emit(Opcode::StoreLocal(local));
    f.emit_jump(top, Opcode::Jump);
    f.bind(done);
    f.set_line(3);
    f.emit(Opcode::LoadLocal(local));
    f.emit(Opcode::Ret);
    unit.add_function(f.finish().unwrap());
    unit.build()
}

#[test]
fn test_loop_unit_validates() {
    let unit = loop_unit();
    assert_eq!(unit.validate(), Ok(()));
    assert_eq!(unit.function_name(0), "main");
    assert_eq!(unit.functions[0].line_for_offset(0), Some(1));
}

#[test]
fn test_image_preserves_unit() {
    let mut unit = UnitBuilder::new("image.js");
    let keys = unit.add_literal_keys(&["a", "b"]);
    let mut f = FunctionBuilder::new(unit.intern("main"));
    let base = f.alloc_registers(2);
    let k = f.add_constant(Constant::Number(2.5));
    let s = unit.intern("text");
    let s = f.add_constant(Constant::String(s));
    f.flags_mut().strict = true;
    f.emit(Opcode::LoadConst(k));
    f.emit(Opcode::StoreReg(base));
    f.emit(Opcode::LoadConst(s));
    f.emit(Opcode::StoreReg(base.offset(1)));
    f.emit(Opcode::DefineObjectLiteral { keys, argv: base, argc: 2 });
    f.emit(Opcode::Ret);
    unit.add_function(f.finish().unwrap());
    let unit = unit.build();
    unit.validate().unwrap();

    let restored = CompilationUnit::from_bytes(&unit.to_bytes()).unwrap();
    assert_eq!(restored, unit);
    assert!(restored.functions[0].flags.strict);
}

#[test]
fn test_truncated_image() {
    let image = loop_unit().to_bytes();
    for cut in [5, image.len() / 2, image.len() - 1] {
        assert!(matches!(
            CompilationUnit::from_bytes(&image[..cut]),
            Err(DecodeError::InvalidImage(_))
        ));
    }
}

#[test]
fn test_literal_arity_checked() {
    let mut unit = UnitBuilder::new("bad.js");
    let keys = unit.add_literal_keys(&["a", "b"]);
    let mut f = FunctionBuilder::new(0);
    let base = f.alloc_register();
    f.emit(Opcode::DefineObjectLiteral { keys, argv: base, argc: 1 });
    f.emit(Opcode::Ret);
    unit.add_function(f.finish().unwrap());
    assert!(unit.build().validate().is_err());
}

#[test]
fn test_closure_index_checked() {
    let mut unit = UnitBuilder::new("closure.js");
    let mut f = FunctionBuilder::new(unit.intern(""));
    f.emit(Opcode::CreateClosure(1));
    f.emit(Opcode::Ret);
    unit.add_function(f.finish().unwrap());
    assert!(matches!(
        unit.build().validate(),
        Err(DecodeError::IndexOutOfRange { table: "function", .. })
    ));

    let mut unit = UnitBuilder::new("closure.js");
    let main = unit.reserve_function();
    let inner = unit.reserve_function();
    let mut f = FunctionBuilder::new(unit.intern(""));
    f.emit(Opcode::CreateClosure(inner));
    f.emit(Opcode::Ret);
    unit.set_function(main, f.finish().unwrap());
    assert_eq!(unit.build().validate(), Ok(()));
}
