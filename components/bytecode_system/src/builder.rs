//! Programmatic construction of compiled functions and units
//!
//! Used by hosts that generate bytecode directly and by the test suites.

use std::collections::HashMap;

use crate::constant::Constant;
use crate::error::BuildError;
use crate::opcode::{Opcode, RegisterId};
use crate::unit::{CompilationUnit, CompiledFunction, FunctionFlags, LineEntry};

/// Forward-referenceable jump target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Builds one [`CompiledFunction`]
#[derive(Debug)]
pub struct FunctionBuilder {
    name: u32,
    code: Vec<u8>,
    constants: Vec<Constant>,
    formals: Vec<u32>,
    locals: Vec<u32>,
    register_count: u32,
    lookup_count: u32,
    flags: FunctionFlags,
    line_table: Vec<LineEntry>,
    labels: Vec<Option<u32>>,
    patches: Vec<(usize, Label)>,
}

impl FunctionBuilder {
    /// Starts a function with the given name (string-table index).
    pub fn new(name: u32) -> Self {
        FunctionBuilder {
            name,
            code: Vec::new(),
            constants: Vec::new(),
            formals: Vec::new(),
            locals: Vec::new(),
            register_count: 0,
            lookup_count: 0,
            flags: FunctionFlags::default(),
            line_table: Vec::new(),
            labels: Vec::new(),
            patches: Vec::new(),
        }
    }

    /// Declares a formal parameter; returns its argument index.
    pub fn add_formal(&mut self, name: u32) -> u32 {
        self.formals.push(name);
        (self.formals.len() - 1) as u32
    }

    /// Declares a local variable; returns its local index.
    pub fn add_local(&mut self, name: u32) -> u32 {
        self.locals.push(name);
        (self.locals.len() - 1) as u32
    }

    /// Reserves a register.
    pub fn alloc_register(&mut self) -> RegisterId {
        self.register_count += 1;
        RegisterId(self.register_count - 1)
    }

    /// Reserves `count` consecutive registers, returning the first.
    pub fn alloc_registers(&mut self, count: u32) -> RegisterId {
        let first = RegisterId(self.register_count);
        self.register_count += count;
        first
    }

    /// Reserves a lookup-cache slot.
    pub fn alloc_lookup(&mut self) -> u32 {
        self.lookup_count += 1;
        self.lookup_count - 1
    }

    /// Adds a constant, reusing an identical entry.
    pub fn add_constant(&mut self, constant: Constant) -> u32 {
        let same = |c: &Constant| match (c, &constant) {
            (Constant::Number(a), Constant::Number(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        };
        if let Some(index) = self.constants.iter().position(same) {
            return index as u32;
        }
        self.constants.push(constant);
        (self.constants.len() - 1) as u32
    }

    /// Mutable access to the function's flags.
    pub fn flags_mut(&mut self) -> &mut FunctionFlags {
        &mut self.flags
    }

    /// Marks the following instructions as belonging to `line`.
    pub fn set_line(&mut self, line: u32) {
        let offset = self.code.len() as u32;
        match self.line_table.last_mut() {
            Some(last) if last.offset == offset => last.line = line,
            Some(last) if last.line == line => {}
            _ => self.line_table.push(LineEntry { offset, line }),
        }
    }

    /// Offset the next instruction will be emitted at.
    pub fn offset(&self) -> u32 {
        self.code.len() as u32
    }

    /// Appends an instruction and returns its offset.
    pub fn emit(&mut self, opcode: Opcode) -> u32 {
        let offset = self.offset();
        opcode.encode(&mut self.code);
        offset
    }

    /// Creates an unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds a label to the current offset.
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.offset());
    }

    /// Emits a jump-carrying instruction whose target is `label`.
    ///
    /// `make` builds the instruction from a target offset; the offset is
    /// patched when the function is finished.
    pub fn emit_jump(&mut self, label: Label, make: impl FnOnce(u32) -> Opcode) -> u32 {
        let offset = self.emit(make(0));
        self.patches.push((self.code.len() - 4, label));
        offset
    }

    /// Resolves labels and produces the function.
    pub fn finish(mut self) -> Result<CompiledFunction, BuildError> {
        for (pos, label) in std::mem::take(&mut self.patches) {
            let target = self.labels[label.0].ok_or(BuildError::UnboundLabel(label.0))?;
            self.code[pos..pos + 4].copy_from_slice(&target.to_le_bytes());
        }
        Ok(CompiledFunction {
            name: self.name,
            code: self.code,
            constants: self.constants,
            formals: self.formals,
            locals: self.locals,
            register_count: self.register_count,
            lookup_count: self.lookup_count,
            flags: self.flags,
            line_table: self.line_table,
        })
    }
}

/// Builds a [`CompilationUnit`]
#[derive(Debug, Default)]
pub struct UnitBuilder {
    file_name: String,
    strings: Vec<String>,
    string_index: HashMap<String, u32>,
    literal_keys: Vec<Vec<u32>>,
    functions: Vec<Option<CompiledFunction>>,
}

impl UnitBuilder {
    /// Starts a unit for `file_name`.
    pub fn new(file_name: impl Into<String>) -> Self {
        UnitBuilder {
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    /// Interns a string, returning its table index.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&index) = self.string_index.get(s) {
            return index;
        }
        let index = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.string_index.insert(s.to_string(), index);
        index
    }

    /// Adds a key list for `DefineObjectLiteral`.
    pub fn add_literal_keys(&mut self, keys: &[&str]) -> u32 {
        let ids = keys.iter().map(|k| self.intern(k)).collect();
        self.literal_keys.push(ids);
        (self.literal_keys.len() - 1) as u32
    }

    /// Reserves a function index so closures can reference functions that
    /// are built later.
    pub fn reserve_function(&mut self) -> u32 {
        self.functions.push(None);
        (self.functions.len() - 1) as u32
    }

    /// Fills a reserved function index.
    pub fn set_function(&mut self, index: u32, function: CompiledFunction) {
        self.functions[index as usize] = Some(function);
    }

    /// Appends a function and returns its index.
    pub fn add_function(&mut self, function: CompiledFunction) -> u32 {
        self.functions.push(Some(function));
        (self.functions.len() - 1) as u32
    }

    /// Produces the unit. Reserved but unfilled functions become empty
    /// functions returning `undefined`.
    pub fn build(self) -> CompilationUnit {
        let functions = self
            .functions
            .into_iter()
            .map(|f| {
                f.unwrap_or_else(|| {
                    let mut code = Vec::new();
                    Opcode::LoadUndefined.encode(&mut code);
                    Opcode::Ret.encode(&mut code);
                    CompiledFunction {
                        name: 0,
                        code,
                        constants: Vec::new(),
                        formals: Vec::new(),
                        locals: Vec::new(),
                        register_count: 0,
                        lookup_count: 0,
                        flags: FunctionFlags::default(),
                        line_table: Vec::new(),
                    }
                })
            })
            .collect();
        CompilationUnit {
            file_name: self.file_name,
            strings: self.strings,
            literal_keys: self.literal_keys,
            functions,
        }
    }
}
