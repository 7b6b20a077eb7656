//! Binary instruction encoding
//!
//! Each instruction is a tag byte followed by its operands. Registers,
//! indices, counts and jump targets are little-endian `u32`; integer
//! immediates are little-endian `i32`; comparison operators are one byte.
//! A jump target is always the last four bytes of its instruction, which
//! lets the builder patch forward jumps in place.

use crate::error::DecodeError;
use crate::opcode::{CompareOp, Opcode, RegisterId};

/// Encoded "no handler" for `SetExceptionHandler`.
pub const NO_HANDLER: u32 = u32::MAX;

struct Writer<'a> {
    out: &'a mut Vec<u8>,
}

impl Writer<'_> {
    fn tag(&mut self, tag: u8) -> &mut Self {
        self.out.push(tag);
        self
    }

    fn u32(&mut self, value: u32) -> &mut Self {
        self.out.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn i32(&mut self, value: i32) -> &mut Self {
        self.out.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn reg(&mut self, reg: RegisterId) -> &mut Self {
        self.u32(reg.0)
    }

    fn op(&mut self, op: CompareOp) -> &mut Self {
        self.out.push(op.to_byte());
        self
    }
}

struct Reader<'a> {
    code: &'a [u8],
    start: usize,
    pos: usize,
}

impl Reader<'_> {
    fn bytes<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.pos + N;
        let slice = self
            .code
            .get(self.pos..end)
            .ok_or(DecodeError::Truncated { offset: self.start })?;
        self.pos = end;
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        Ok(buf)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        self.bytes::<4>().map(u32::from_le_bytes)
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        self.bytes::<4>().map(i32::from_le_bytes)
    }

    fn reg(&mut self) -> Result<RegisterId, DecodeError> {
        self.u32().map(RegisterId)
    }

    fn op(&mut self) -> Result<CompareOp, DecodeError> {
        let [byte] = self.bytes::<1>()?;
        CompareOp::from_byte(byte).ok_or(DecodeError::UnknownCompareOp {
            op: byte,
            offset: self.start,
        })
    }
}

impl Opcode {
    /// Appends the encoded instruction to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut w = Writer { out };
        match *self {
            Opcode::Nop => w.tag(0),
            Opcode::Debug => w.tag(1),
            Opcode::LoadUndefined => w.tag(2),
            Opcode::LoadNull => w.tag(3),
            Opcode::LoadTrue => w.tag(4),
            Opcode::LoadFalse => w.tag(5),
            Opcode::LoadInt(v) => w.tag(6).i32(v),
            Opcode::LoadConst(i) => w.tag(7).u32(i),
            Opcode::LoadRuntimeString(i) => w.tag(8).u32(i),
            Opcode::LoadReg(r) => w.tag(9).reg(r),
            Opcode::StoreReg(r) => w.tag(10).reg(r),
            Opcode::MoveReg { src, dst } => w.tag(11).reg(src).reg(dst),
            Opcode::LoadLocal(i) => w.tag(12).u32(i),
            Opcode::StoreLocal(i) => w.tag(13).u32(i),
            Opcode::LoadScopedLocal { scope, index } => w.tag(14).u32(scope).u32(index),
            Opcode::StoreScopedLocal { scope, index } => w.tag(15).u32(scope).u32(index),
            Opcode::LoadArg(i) => w.tag(16).u32(i),
            Opcode::StoreArg(i) => w.tag(17).u32(i),
            Opcode::LoadName(n) => w.tag(18).u32(n),
            Opcode::StoreName(n) => w.tag(19).u32(n),
            Opcode::LoadGlobalLookup { name, cache } => w.tag(20).u32(name).u32(cache),
            Opcode::LoadProperty { name, cache } => w.tag(21).u32(name).u32(cache),
            Opcode::StoreProperty { base, name, cache } => {
                w.tag(22).reg(base).u32(name).u32(cache)
            }
            Opcode::LoadElement { base } => w.tag(23).reg(base),
            Opcode::StoreElement { base, index } => w.tag(24).reg(base).reg(index),
            Opcode::LoadThis => w.tag(25),
            Opcode::CallValue { func, argv, argc } => w.tag(26).reg(func).reg(argv).u32(argc),
            Opcode::CallProperty {
                base,
                name,
                argv,
                argc,
            } => w.tag(27).reg(base).u32(name).reg(argv).u32(argc),
            Opcode::CallElement {
                base,
                index,
                argv,
                argc,
            } => w.tag(28).reg(base).reg(index).reg(argv).u32(argc),
            Opcode::CallName { name, argv, argc } => w.tag(29).u32(name).reg(argv).u32(argc),
            Opcode::CallGlobalLookup {
                name,
                cache,
                argv,
                argc,
            } => w.tag(30).u32(name).u32(cache).reg(argv).u32(argc),
            Opcode::Construct { func, argv, argc } => w.tag(31).reg(func).reg(argv).u32(argc),
            Opcode::Jump(t) => w.tag(32).u32(t),
            Opcode::JumpTrue(t) => w.tag(33).u32(t),
            Opcode::JumpFalse(t) => w.tag(34).u32(t),
            Opcode::CmpJump { op, lhs, target } => w.tag(35).op(op).reg(lhs).u32(target),
            Opcode::CmpIntJump { op, imm, target } => w.tag(36).op(op).i32(imm).u32(target),
            Opcode::CmpEq(r) => w.tag(37).reg(r),
            Opcode::CmpNe(r) => w.tag(38).reg(r),
            Opcode::CmpStrictEq(r) => w.tag(39).reg(r),
            Opcode::CmpStrictNe(r) => w.tag(40).reg(r),
            Opcode::CmpLt(r) => w.tag(41).reg(r),
            Opcode::CmpLe(r) => w.tag(42).reg(r),
            Opcode::CmpGt(r) => w.tag(43).reg(r),
            Opcode::CmpGe(r) => w.tag(44).reg(r),
            Opcode::CmpIn(r) => w.tag(45).reg(r),
            Opcode::CmpInstanceOf(r) => w.tag(46).reg(r),
            Opcode::Add(r) => w.tag(47).reg(r),
            Opcode::Sub(r) => w.tag(48).reg(r),
            Opcode::Mul(r) => w.tag(49).reg(r),
            Opcode::Div(r) => w.tag(50).reg(r),
            Opcode::Mod(r) => w.tag(51).reg(r),
            Opcode::BitAnd(r) => w.tag(52).reg(r),
            Opcode::BitOr(r) => w.tag(53).reg(r),
            Opcode::BitXor(r) => w.tag(54).reg(r),
            Opcode::Shl(r) => w.tag(55).reg(r),
            Opcode::Shr(r) => w.tag(56).reg(r),
            Opcode::UShr(r) => w.tag(57).reg(r),
            Opcode::Not => w.tag(58),
            Opcode::UMinus => w.tag(59),
            Opcode::UPlus => w.tag(60),
            Opcode::UCompl => w.tag(61),
            Opcode::Increment => w.tag(62),
            Opcode::Decrement => w.tag(63),
            Opcode::TypeOf => w.tag(64),
            Opcode::TypeOfName(n) => w.tag(65).u32(n),
            Opcode::SetExceptionHandler(h) => w.tag(66).u32(h.unwrap_or(NO_HANDLER)),
            Opcode::ThrowException => w.tag(67),
            Opcode::GetException => w.tag(68),
            Opcode::PushWithContext => w.tag(69),
            Opcode::PushCatchContext(n) => w.tag(70).u32(n),
            Opcode::PopContext => w.tag(71),
            Opcode::DefineArray { argv, argc } => w.tag(72).reg(argv).u32(argc),
            Opcode::DefineObjectLiteral { keys, argv, argc } => {
                w.tag(73).u32(keys).reg(argv).u32(argc)
            }
            Opcode::CreateClosure(f) => w.tag(74).u32(f),
            Opcode::CreateArgumentsObject => w.tag(75),
            Opcode::DeleteProperty { base, name } => w.tag(76).reg(base).u32(name),
            Opcode::DeleteName(n) => w.tag(77).u32(n),
            Opcode::Ret => w.tag(78),
        };
    }

    /// Encoded length of the instruction in bytes.
    pub fn encoded_len(&self) -> usize {
        let mut buf = Vec::with_capacity(17);
        self.encode(&mut buf);
        buf.len()
    }

    /// Decodes the instruction at `pc`, returning it together with the
    /// offset of the next instruction.
    pub fn decode(code: &[u8], pc: usize) -> Result<(Opcode, usize), DecodeError> {
        let tag = *code.get(pc).ok_or(DecodeError::Truncated { offset: pc })?;
        let mut r = Reader {
            code,
            start: pc,
            pos: pc + 1,
        };
        let opcode = match tag {
            0 => Opcode::Nop,
            1 => Opcode::Debug,
            2 => Opcode::LoadUndefined,
            3 => Opcode::LoadNull,
            4 => Opcode::LoadTrue,
            5 => Opcode::LoadFalse,
            6 => Opcode::LoadInt(r.i32()?),
            7 => Opcode::LoadConst(r.u32()?),
            8 => Opcode::LoadRuntimeString(r.u32()?),
            9 => Opcode::LoadReg(r.reg()?),
            10 => Opcode::StoreReg(r.reg()?),
            11 => Opcode::MoveReg {
                src: r.reg()?,
                dst: r.reg()?,
            },
            12 => Opcode::LoadLocal(r.u32()?),
            13 => Opcode::StoreLocal(r.u32()?),
            14 => Opcode::LoadScopedLocal {
                scope: r.u32()?,
                index: r.u32()?,
            },
            15 => Opcode::StoreScopedLocal {
                scope: r.u32()?,
                index: r.u32()?,
            },
            16 => Opcode::LoadArg(r.u32()?),
            17 => Opcode::StoreArg(r.u32()?),
            18 => Opcode::LoadName(r.u32()?),
            19 => Opcode::StoreName(r.u32()?),
            20 => Opcode::LoadGlobalLookup {
                name: r.u32()?,
                cache: r.u32()?,
            },
            21 => Opcode::LoadProperty {
                name: r.u32()?,
                cache: r.u32()?,
            },
            22 => Opcode::StoreProperty {
                base: r.reg()?,
                name: r.u32()?,
                cache: r.u32()?,
            },
            23 => Opcode::LoadElement { base: r.reg()? },
            24 => Opcode::StoreElement {
                base: r.reg()?,
                index: r.reg()?,
            },
            25 => Opcode::LoadThis,
            26 => Opcode::CallValue {
                func: r.reg()?,
                argv: r.reg()?,
                argc: r.u32()?,
            },
            27 => Opcode::CallProperty {
                base: r.reg()?,
                name: r.u32()?,
                argv: r.reg()?,
                argc: r.u32()?,
            },
            28 => Opcode::CallElement {
                base: r.reg()?,
                index: r.reg()?,
                argv: r.reg()?,
                argc: r.u32()?,
            },
            29 => Opcode::CallName {
                name: r.u32()?,
                argv: r.reg()?,
                argc: r.u32()?,
            },
            30 => Opcode::CallGlobalLookup {
                name: r.u32()?,
                cache: r.u32()?,
                argv: r.reg()?,
                argc: r.u32()?,
            },
            31 => Opcode::Construct {
                func: r.reg()?,
                argv: r.reg()?,
                argc: r.u32()?,
            },
            32 => Opcode::Jump(r.u32()?),
            33 => Opcode::JumpTrue(r.u32()?),
            34 => Opcode::JumpFalse(r.u32()?),
            35 => Opcode::CmpJump {
                op: r.op()?,
                lhs: r.reg()?,
                target: r.u32()?,
            },
            36 => Opcode::CmpIntJump {
                op: r.op()?,
                imm: r.i32()?,
                target: r.u32()?,
            },
            37 => Opcode::CmpEq(r.reg()?),
            38 => Opcode::CmpNe(r.reg()?),
            39 => Opcode::CmpStrictEq(r.reg()?),
            40 => Opcode::CmpStrictNe(r.reg()?),
            41 => Opcode::CmpLt(r.reg()?),
            42 => Opcode::CmpLe(r.reg()?),
            43 => Opcode::CmpGt(r.reg()?),
            44 => Opcode::CmpGe(r.reg()?),
            45 => Opcode::CmpIn(r.reg()?),
            46 => Opcode::CmpInstanceOf(r.reg()?),
            47 => Opcode::Add(r.reg()?),
            48 => Opcode::Sub(r.reg()?),
            49 => Opcode::Mul(r.reg()?),
            50 => Opcode::Div(r.reg()?),
            51 => Opcode::Mod(r.reg()?),
            52 => Opcode::BitAnd(r.reg()?),
            53 => Opcode::BitOr(r.reg()?),
            54 => Opcode::BitXor(r.reg()?),
            55 => Opcode::Shl(r.reg()?),
            56 => Opcode::Shr(r.reg()?),
            57 => Opcode::UShr(r.reg()?),
            58 => Opcode::Not,
            59 => Opcode::UMinus,
            60 => Opcode::UPlus,
            61 => Opcode::UCompl,
            62 => Opcode::Increment,
            63 => Opcode::Decrement,
            64 => Opcode::TypeOf,
            65 => Opcode::TypeOfName(r.u32()?),
            66 => {
                let handler = r.u32()?;
                Opcode::SetExceptionHandler((handler != NO_HANDLER).then_some(handler))
            }
            67 => Opcode::ThrowException,
            68 => Opcode::GetException,
            69 => Opcode::PushWithContext,
            70 => Opcode::PushCatchContext(r.u32()?),
            71 => Opcode::PopContext,
            72 => Opcode::DefineArray {
                argv: r.reg()?,
                argc: r.u32()?,
            },
            73 => Opcode::DefineObjectLiteral {
                keys: r.u32()?,
                argv: r.reg()?,
                argc: r.u32()?,
            },
            74 => Opcode::CreateClosure(r.u32()?),
            75 => Opcode::CreateArgumentsObject,
            76 => Opcode::DeleteProperty {
                base: r.reg()?,
                name: r.u32()?,
            },
            77 => Opcode::DeleteName(r.u32()?),
            78 => Opcode::Ret,
            _ => return Err(DecodeError::UnknownOpcode { tag, offset: pc }),
        };
        Ok((opcode, r.pos))
    }
}

/// Iterator over the instructions of a code buffer, yielding each
/// instruction with its offset.
pub struct Instructions<'a> {
    code: &'a [u8],
    pc: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    /// Starts decoding at offset zero.
    pub fn new(code: &'a [u8]) -> Self {
        Instructions {
            code,
            pc: 0,
            failed: false,
        }
    }
}

impl Iterator for Instructions<'_> {
    type Item = Result<(usize, Opcode), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pc >= self.code.len() {
            return None;
        }
        let offset = self.pc;
        match Opcode::decode(self.code, offset) {
            Ok((opcode, next)) => {
                self.pc = next;
                Some(Ok((offset, opcode)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
