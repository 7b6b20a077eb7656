//! Bytecode opcodes for the accumulator machine
//!
//! Most instructions read from or write to an implicit accumulator. Binary
//! operators and comparisons take their left operand from a register and
//! their right operand from the accumulator, leaving the result in the
//! accumulator. Call instructions pass arguments as a window of consecutive
//! registers starting at `argv`.
//!
//! Name operands index the compilation unit's string table; `cache`
//! operands index the function's lookup-cache slots; jump targets are
//! absolute byte offsets into the function's code.

/// Register identifier within a function's register file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterId(pub u32);

impl RegisterId {
    /// Register `self + offset`, used to address argument windows.
    pub fn offset(self, offset: u32) -> RegisterId {
        RegisterId(self.0 + offset)
    }

    /// Like [`offset`](RegisterId::offset), but `None` past `u32::MAX`.
    pub fn checked_offset(self, offset: u32) -> Option<RegisterId> {
        self.0.checked_add(offset).map(RegisterId)
    }
}

/// Comparison used by the fused compare-and-jump instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNe,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Encoding of the operator.
    pub fn to_byte(self) -> u8 {
        match self {
            CompareOp::Eq => 0,
            CompareOp::Ne => 1,
            CompareOp::StrictEq => 2,
            CompareOp::StrictNe => 3,
            CompareOp::Lt => 4,
            CompareOp::Le => 5,
            CompareOp::Gt => 6,
            CompareOp::Ge => 7,
        }
    }

    /// Decodes an operator byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => CompareOp::Eq,
            1 => CompareOp::Ne,
            2 => CompareOp::StrictEq,
            3 => CompareOp::StrictNe,
            4 => CompareOp::Lt,
            5 => CompareOp::Le,
            6 => CompareOp::Gt,
            7 => CompareOp::Ge,
            _ => return None,
        })
    }
}

/// Decoded bytecode instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Opcode {
    /// Does nothing
    Nop,
    /// Potential breakpoint; calls the debugger's per-instruction hook
    Debug,

    // Accumulator loads
    /// acc = undefined
    LoadUndefined,
    /// acc = null
    LoadNull,
    /// acc = true
    LoadTrue,
    /// acc = false
    LoadFalse,
    /// acc = integer immediate
    LoadInt(i32),
    /// acc = constant pool entry
    LoadConst(u32),
    /// acc = string from the unit's runtime-string table
    LoadRuntimeString(u32),

    // Registers
    /// acc = register
    LoadReg(RegisterId),
    /// register = acc
    StoreReg(RegisterId),
    /// dst = src, accumulator untouched
    MoveReg {
        /// Source register
        src: RegisterId,
        /// Destination register
        dst: RegisterId,
    },

    // Context slots
    /// acc = local of the current call context
    LoadLocal(u32),
    /// local of the current call context = acc
    StoreLocal(u32),
    /// acc = local of the context `scope` levels out
    LoadScopedLocal {
        /// Number of parent links to follow
        scope: u32,
        /// Local index in that context
        index: u32,
    },
    /// local of the context `scope` levels out = acc
    StoreScopedLocal {
        /// Number of parent links to follow
        scope: u32,
        /// Local index in that context
        index: u32,
    },
    /// acc = argument of the current call context
    LoadArg(u32),
    /// argument of the current call context = acc
    StoreArg(u32),

    // Named and keyed access
    /// acc = scope-chain lookup of a name; ReferenceError if undeclared
    LoadName(u32),
    /// scope-chain assignment of a name = acc
    StoreName(u32),
    /// acc = global object property, through a lookup cache
    LoadGlobalLookup {
        /// Property name
        name: u32,
        /// Lookup-cache slot
        cache: u32,
    },
    /// acc = acc.name
    LoadProperty {
        /// Property name
        name: u32,
        /// Lookup-cache slot
        cache: u32,
    },
    /// base.name = acc
    StoreProperty {
        /// Register holding the object
        base: RegisterId,
        /// Property name
        name: u32,
        /// Lookup-cache slot
        cache: u32,
    },
    /// acc = base[acc]
    LoadElement {
        /// Register holding the object
        base: RegisterId,
    },
    /// base[index] = acc
    StoreElement {
        /// Register holding the object
        base: RegisterId,
        /// Register holding the key
        index: RegisterId,
    },
    /// acc = this
    LoadThis,

    // Calls
    /// acc = func(argv..argv+argc) with `this` undefined
    CallValue {
        /// Register holding the callee
        func: RegisterId,
        /// First argument register
        argv: RegisterId,
        /// Argument count
        argc: u32,
    },
    /// acc = base.name(args)
    CallProperty {
        /// Register holding the receiver
        base: RegisterId,
        /// Method name
        name: u32,
        /// First argument register
        argv: RegisterId,
        /// Argument count
        argc: u32,
    },
    /// acc = base[index](args)
    CallElement {
        /// Register holding the receiver
        base: RegisterId,
        /// Register holding the key
        index: RegisterId,
        /// First argument register
        argv: RegisterId,
        /// Argument count
        argc: u32,
    },
    /// acc = name(args), resolving the name on the scope chain
    CallName {
        /// Function name
        name: u32,
        /// First argument register
        argv: RegisterId,
        /// Argument count
        argc: u32,
    },
    /// acc = global name(args), through a lookup cache
    CallGlobalLookup {
        /// Function name
        name: u32,
        /// Lookup-cache slot
        cache: u32,
        /// First argument register
        argv: RegisterId,
        /// Argument count
        argc: u32,
    },
    /// acc = new func(args)
    Construct {
        /// Register holding the constructor
        func: RegisterId,
        /// First argument register
        argv: RegisterId,
        /// Argument count
        argc: u32,
    },

    // Control flow
    /// Unconditional jump
    Jump(u32),
    /// Jump if acc converts to true
    JumpTrue(u32),
    /// Jump if acc converts to false
    JumpFalse(u32),
    /// Jump if `lhs op acc`
    CmpJump {
        /// Operator
        op: CompareOp,
        /// Register holding the left operand
        lhs: RegisterId,
        /// Jump target
        target: u32,
    },
    /// Jump if `acc op imm`
    CmpIntJump {
        /// Operator
        op: CompareOp,
        /// Right operand
        imm: i32,
        /// Jump target
        target: u32,
    },

    // Comparisons: acc = lhs OP acc
    /// `==`
    CmpEq(RegisterId),
    /// `!=`
    CmpNe(RegisterId),
    /// `===`
    CmpStrictEq(RegisterId),
    /// `!==`
    CmpStrictNe(RegisterId),
    /// `<`
    CmpLt(RegisterId),
    /// `<=`
    CmpLe(RegisterId),
    /// `>`
    CmpGt(RegisterId),
    /// `>=`
    CmpGe(RegisterId),
    /// `in`
    CmpIn(RegisterId),
    /// `instanceof`
    CmpInstanceOf(RegisterId),

    // Binary operators: acc = lhs OP acc
    /// `+`
    Add(RegisterId),
    /// `-`
    Sub(RegisterId),
    /// `*`
    Mul(RegisterId),
    /// `/`
    Div(RegisterId),
    /// `%`
    Mod(RegisterId),
    /// `&`
    BitAnd(RegisterId),
    /// `|`
    BitOr(RegisterId),
    /// `^`
    BitXor(RegisterId),
    /// `<<`
    Shl(RegisterId),
    /// `>>`
    Shr(RegisterId),
    /// `>>>`
    UShr(RegisterId),

    // Unary operators on the accumulator
    /// `!acc`
    Not,
    /// `-acc`
    UMinus,
    /// `+acc`
    UPlus,
    /// `~acc`
    UCompl,
    /// `acc + 1` after number conversion
    Increment,
    /// `acc - 1` after number conversion
    Decrement,
    /// `typeof acc`
    TypeOf,
    /// `typeof name` without a ReferenceError for undeclared names
    TypeOfName(u32),

    // Exceptions
    /// Installs (or with `None` clears) the frame's exception handler
    SetExceptionHandler(Option<u32>),
    /// Throws acc
    ThrowException,
    /// acc = pending exception; clears the exception flag
    GetException,

    // Scopes
    /// Pushes a `with` context over the object in acc
    PushWithContext,
    /// Pushes a `catch` context binding the accumulator (the caught exception) to a name
    PushCatchContext(u32),
    /// Pops the innermost `with`/`catch` context
    PopContext,

    // Literals
    /// acc = new array of argc registers starting at argv
    DefineArray {
        /// First element register
        argv: RegisterId,
        /// Element count
        argc: u32,
    },
    /// acc = new object from a key list and argc value registers
    DefineObjectLiteral {
        /// Index into the unit's literal key table
        keys: u32,
        /// First value register
        argv: RegisterId,
        /// Value count
        argc: u32,
    },
    /// acc = closure over a unit function in the current context
    CreateClosure(u32),
    /// acc = arguments object of the current call
    CreateArgumentsObject,
    /// acc = delete base.name
    DeleteProperty {
        /// Register holding the object
        base: RegisterId,
        /// Property name
        name: u32,
    },
    /// acc = delete name
    DeleteName(u32),

    /// Returns acc to the caller
    Ret,
}

impl Opcode {
    /// Jump target carried by the instruction, if any.
    pub fn jump_target(&self) -> Option<u32> {
        match self {
            Opcode::Jump(t) | Opcode::JumpTrue(t) | Opcode::JumpFalse(t) => Some(*t),
            Opcode::CmpJump { target, .. } | Opcode::CmpIntJump { target, .. } => Some(*target),
            Opcode::SetExceptionHandler(handler) => *handler,
            _ => None,
        }
    }

    /// True if control never falls through to the next instruction.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Opcode::Jump(_) | Opcode::Ret | Opcode::ThrowException)
    }

    /// True if executing the instruction can raise a script exception.
    pub fn can_throw(&self) -> bool {
        !matches!(
            self,
            Opcode::Nop
                | Opcode::LoadUndefined
                | Opcode::LoadNull
                | Opcode::LoadTrue
                | Opcode::LoadFalse
                | Opcode::LoadInt(_)
                | Opcode::LoadConst(_)
                | Opcode::LoadRuntimeString(_)
                | Opcode::LoadReg(_)
                | Opcode::StoreReg(_)
                | Opcode::MoveReg { .. }
                | Opcode::LoadLocal(_)
                | Opcode::StoreLocal(_)
                | Opcode::LoadScopedLocal { .. }
                | Opcode::StoreScopedLocal { .. }
                | Opcode::LoadArg(_)
                | Opcode::StoreArg(_)
                | Opcode::LoadThis
                | Opcode::Jump(_)
                | Opcode::CmpStrictEq(_)
                | Opcode::CmpStrictNe(_)
                | Opcode::Not
                | Opcode::SetExceptionHandler(_)
                | Opcode::GetException
                | Opcode::PopContext
                | Opcode::Ret
        )
    }

    /// Registers the instruction reads or writes, for validation.
    pub fn registers(&self) -> Vec<RegisterId> {
        match *self {
            Opcode::LoadReg(r) | Opcode::StoreReg(r) => vec![r],
            Opcode::MoveReg { src, dst } => vec![src, dst],
            Opcode::StoreProperty { base, .. }
            | Opcode::LoadElement { base }
            | Opcode::DeleteProperty { base, .. } => vec![base],
            Opcode::StoreElement { base, index } => vec![base, index],
            Opcode::CmpJump { lhs, .. } => vec![lhs],
            Opcode::CmpEq(r)
            | Opcode::CmpNe(r)
            | Opcode::CmpStrictEq(r)
            | Opcode::CmpStrictNe(r)
            | Opcode::CmpLt(r)
            | Opcode::CmpLe(r)
            | Opcode::CmpGt(r)
            | Opcode::CmpGe(r)
            | Opcode::CmpIn(r)
            | Opcode::CmpInstanceOf(r)
            | Opcode::Add(r)
            | Opcode::Sub(r)
            | Opcode::Mul(r)
            | Opcode::Div(r)
            | Opcode::Mod(r)
            | Opcode::BitAnd(r)
            | Opcode::BitOr(r)
            | Opcode::BitXor(r)
            | Opcode::Shl(r)
            | Opcode::Shr(r)
            | Opcode::UShr(r) => vec![r],
            Opcode::CallValue { func, argv, argc } | Opcode::Construct { func, argv, argc } => {
                window(argv, argc, &[func])
            }
            Opcode::CallProperty { base, argv, argc, .. } => window(argv, argc, &[base]),
            Opcode::CallElement {
                base,
                index,
                argv,
                argc,
            } => window(argv, argc, &[base, index]),
            Opcode::CallName { argv, argc, .. }
            | Opcode::CallGlobalLookup { argv, argc, .. }
            | Opcode::DefineArray { argv, argc }
            | Opcode::DefineObjectLiteral { argv, argc, .. } => window(argv, argc, &[]),
            _ => Vec::new(),
        }
    }
}

fn window(argv: RegisterId, argc: u32, extra: &[RegisterId]) -> Vec<RegisterId> {
    let mut registers = extra.to_vec();
    if argc > 0 {
        registers.push(argv);
        // A window running past the last encodable register can never be
        // in range; report it as the largest one.
        registers.push(argv.checked_offset(argc - 1).unwrap_or(RegisterId(u32::MAX)));
    }
    registers
}
