//! Instruction encoding tests

use bytecode_system::{CompareOp, DecodeError, Instructions, Opcode, RegisterId};

fn every_opcode() -> Vec<Opcode> {
    let r = RegisterId(3);
    vec![
        Opcode::Nop,
        Opcode::Debug,
        Opcode::LoadUndefined,
        Opcode::LoadNull,
        Opcode::LoadTrue,
        Opcode::LoadFalse,
        Opcode::LoadInt(-42),
        Opcode::LoadConst(7),
        Opcode::LoadRuntimeString(8),
        Opcode::LoadReg(r),
        Opcode::StoreReg(r),
        Opcode::MoveReg { src: r, dst: RegisterId(4) },
        Opcode::LoadLocal(1),
        Opcode::StoreLocal(2),
        Opcode::LoadScopedLocal { scope: 1, index: 2 },
        Opcode::StoreScopedLocal { scope: 3, index: 4 },
        Opcode::LoadArg(0),
        Opcode::StoreArg(1),
        Opcode::LoadName(9),
        Opcode::StoreName(10),
        Opcode::LoadGlobalLookup { name: 1, cache: 2 },
        Opcode::LoadProperty { name: 3, cache: 4 },
        Opcode::StoreProperty { base: r, name: 5, cache: 6 },
        Opcode::LoadElement { base: r },
        Opcode::StoreElement { base: r, index: RegisterId(5) },
        Opcode::LoadThis,
        Opcode::CallValue { func: r, argv: RegisterId(4), argc: 2 },
        Opcode::CallProperty { base: r, name: 1, argv: RegisterId(4), argc: 0 },
        Opcode::CallElement { base: r, index: RegisterId(4), argv: RegisterId(5), argc: 1 },
        Opcode::CallName { name: 2, argv: r, argc: 3 },
        Opcode::CallGlobalLookup { name: 2, cache: 0, argv: r, argc: 1 },
        Opcode::Construct { func: r, argv: RegisterId(4), argc: 0 },
        Opcode::Jump(100),
        Opcode::JumpTrue(101),
        Opcode::JumpFalse(102),
        Opcode::CmpJump { op: CompareOp::Ge, lhs: r, target: 103 },
        Opcode::CmpIntJump { op: CompareOp::StrictNe, imm: -1, target: 104 },
        Opcode::CmpEq(r),
        Opcode::CmpNe(r),
        Opcode::CmpStrictEq(r),
        Opcode::CmpStrictNe(r),
        Opcode::CmpLt(r),
        Opcode::CmpLe(r),
        Opcode::CmpGt(r),
        Opcode::CmpGe(r),
        Opcode::CmpIn(r),
        Opcode::CmpInstanceOf(r),
        Opcode::Add(r),
        Opcode::Sub(r),
        Opcode::Mul(r),
        Opcode::Div(r),
        Opcode::Mod(r),
        Opcode::BitAnd(r),
        Opcode::BitOr(r),
        Opcode::BitXor(r),
        Opcode::Shl(r),
        Opcode::Shr(r),
        Opcode::UShr(r),
        Opcode::Not,
        Opcode::UMinus,
        Opcode::UPlus,
        Opcode::UCompl,
        Opcode::Increment,
        Opcode::Decrement,
        Opcode::TypeOf,
        Opcode::TypeOfName(4),
        Opcode::SetExceptionHandler(Some(12)),
        Opcode::SetExceptionHandler(None),
        Opcode::ThrowException,
        Opcode::GetException,
        Opcode::PushWithContext,
        Opcode::PushCatchContext(6),
        Opcode::PopContext,
        Opcode::DefineArray { argv: r, argc: 2 },
        Opcode::DefineObjectLiteral { keys: 0, argv: r, argc: 2 },
        Opcode::CreateClosure(1),
        Opcode::CreateArgumentsObject,
        Opcode::DeleteProperty { base: r, name: 1 },
        Opcode::DeleteName(2),
        Opcode::Ret,
    ]
}

#[test]
fn test_stream_decodes_back_in_order() {
    // One stream with every instruction: a tag mismatch between encode and
    // decode shows up as a wrong opcode or a misaligned successor.
    let ops = every_opcode();
    let mut code = Vec::new();
    let mut offsets = Vec::new();
    for op in &ops {
        offsets.push(code.len());
        op.encode(&mut code);
    }

    let decoded: Vec<(usize, Opcode)> = Instructions::new(&code)
        .collect::<Result<_, _>>()
        .expect("stream decodes");
    assert_eq!(decoded.len(), ops.len());
    for ((offset, op), (expected_offset, expected)) in
        decoded.iter().zip(offsets.iter().zip(ops.iter()))
    {
        assert_eq!(offset, expected_offset);
        assert_eq!(op, expected);
    }
}

#[test]
fn test_distinct_tags() {
    let mut tags: Vec<u8> = every_opcode()
        .iter()
        .filter(|op| **op != Opcode::SetExceptionHandler(None))
        .map(|op| {
            let mut buf = Vec::new();
            op.encode(&mut buf);
            buf[0]
        })
        .collect();
    let total = tags.len();
    tags.sort_unstable();
    tags.dedup();
    assert_eq!(tags.len(), total);
}

#[test]
fn test_encoded_len() {
    assert_eq!(Opcode::Ret.encoded_len(), 1);
    assert_eq!(Opcode::LoadInt(0).encoded_len(), 5);
    assert_eq!(
        Opcode::CmpJump { op: CompareOp::Lt, lhs: RegisterId(0), target: 0 }.encoded_len(),
        10
    );
    assert_eq!(
        Opcode::CallElement {
            base: RegisterId(0),
            index: RegisterId(1),
            argv: RegisterId(2),
            argc: 0
        }
        .encoded_len(),
        17
    );
}

#[test]
fn test_decode_past_end() {
    assert_eq!(
        Opcode::decode(&[], 0),
        Err(DecodeError::Truncated { offset: 0 })
    );
}

#[test]
fn test_iterator_stops_after_error() {
    let code = [78u8, 0xee, 78];
    let items: Vec<_> = Instructions::new(&code).collect();
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(items[1].is_err());
}
