//! Compiled functions and compilation units
//!
//! A [`CompilationUnit`] is what the external compiler hands to the engine:
//! a string table, object-literal key lists and a list of functions whose
//! first entry is the unit's top-level code. Units can be validated once at
//! load time and serialized to a flat byte image.

use std::collections::HashSet;

use crate::constant::Constant;
use crate::error::DecodeError;
use crate::instruction::Instructions;
use crate::opcode::Opcode;

const IMAGE_MAGIC: &[u8; 4] = b"JSCU";
const IMAGE_VERSION: u8 = 1;

/// Per-function compile-time facts that steer context allocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    /// Strict-mode code
    pub strict: bool,
    /// The body reads `arguments`
    pub uses_arguments: bool,
    /// The body defines closures that may capture its context
    pub has_nested_functions: bool,
}

impl FunctionFlags {
    fn to_byte(self) -> u8 {
        (self.strict as u8) | (self.uses_arguments as u8) << 1 | (self.has_nested_functions as u8) << 2
    }

    fn from_byte(byte: u8) -> Self {
        FunctionFlags {
            strict: byte & 1 != 0,
            uses_arguments: byte & 2 != 0,
            has_nested_functions: byte & 4 != 0,
        }
    }
}

/// Maps a code offset to the source line it was compiled from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    /// First code offset belonging to the line
    pub offset: u32,
    /// 1-based source line
    pub line: u32,
}

/// One function's bytecode and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    /// Function name (string-table index)
    pub name: u32,
    /// Encoded instructions
    pub code: Vec<u8>,
    /// Constant pool used by `LoadConst`
    pub constants: Vec<Constant>,
    /// Formal parameter names (string-table indices)
    pub formals: Vec<u32>,
    /// Local variable names (string-table indices)
    pub locals: Vec<u32>,
    /// Size of the register file the function needs
    pub register_count: u32,
    /// Number of lookup-cache slots used by the function
    pub lookup_count: u32,
    /// Compile-time flags
    pub flags: FunctionFlags,
    /// Offset-to-line table, sorted by offset
    pub line_table: Vec<LineEntry>,
}

impl CompiledFunction {
    /// True if calls to this function must keep their context on the heap.
    pub fn needs_heap_context(&self) -> bool {
        self.flags.has_nested_functions || self.flags.uses_arguments
    }

    /// Source line of the instruction at `offset`, if the function has
    /// line information.
    pub fn line_for_offset(&self, offset: usize) -> Option<u32> {
        let idx = self
            .line_table
            .partition_point(|entry| entry.offset as usize <= offset);
        idx.checked_sub(1).map(|i| self.line_table[i].line)
    }

    /// Decodes the function's instructions.
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions::new(&self.code)
    }
}

/// A unit of compiled code
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompilationUnit {
    /// Source file the unit was compiled from
    pub file_name: String,
    /// Names, property keys and runtime strings
    pub strings: Vec<String>,
    /// Key lists for `DefineObjectLiteral`
    pub literal_keys: Vec<Vec<u32>>,
    /// Functions; index 0 is the top-level code
    pub functions: Vec<CompiledFunction>,
}

impl CompilationUnit {
    /// String-table entry.
    pub fn string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Name of a function, or `""` for anonymous ones.
    pub fn function_name(&self, index: usize) -> &str {
        self.functions
            .get(index)
            .and_then(|f| self.string(f.name))
            .unwrap_or("")
    }

    /// Checks every function for well-formed instructions and in-range
    /// operands.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.functions.is_empty() {
            return Err(DecodeError::InvalidImage("unit has no functions".to_string()));
        }
        for (index, function) in self.functions.iter().enumerate() {
            self.validate_function(index, function)?;
        }
        for keys in &self.literal_keys {
            if let Some(&bad) = keys.iter().find(|&&k| k as usize >= self.strings.len()) {
                return Err(DecodeError::IndexOutOfRange {
                    function: 0,
                    table: "string",
                    index: bad,
                    offset: 0,
                });
            }
        }
        Ok(())
    }

    fn validate_function(&self, index: usize, function: &CompiledFunction) -> Result<(), DecodeError> {
        let mut boundaries = HashSet::new();
        let mut jumps = Vec::new();
        let mut last = None;

        for item in function.instructions() {
            let (offset, opcode) = item?;
            boundaries.insert(offset as u32);
            if let Some(target) = opcode.jump_target() {
                jumps.push((offset, target));
            }
            let check = |table: &'static str, value: u32, limit: usize| {
                if value as usize >= limit {
                    Err(DecodeError::IndexOutOfRange {
                        function: index,
                        table,
                        index: value,
                        offset,
                    })
                } else {
                    Ok(())
                }
            };

            for reg in opcode.registers() {
                check("register", reg.0, function.register_count as usize)?;
            }

            let strings = self.strings.len();
            match opcode {
                Opcode::LoadConst(i) => check("constant", i, function.constants.len())?,
                Opcode::LoadRuntimeString(i)
                | Opcode::LoadName(i)
                | Opcode::StoreName(i)
                | Opcode::TypeOfName(i)
                | Opcode::PushCatchContext(i)
                | Opcode::DeleteName(i)
                | Opcode::DeleteProperty { name: i, .. }
                | Opcode::CallName { name: i, .. }
                | Opcode::CallProperty { name: i, .. } => check("string", i, strings)?,
                Opcode::LoadGlobalLookup { name, cache }
                | Opcode::LoadProperty { name, cache }
                | Opcode::StoreProperty { name, cache, .. }
                | Opcode::CallGlobalLookup { name, cache, .. } => {
                    check("string", name, strings)?;
                    check("lookup cache", cache, function.lookup_count as usize)?;
                }
                Opcode::LoadLocal(i) | Opcode::StoreLocal(i) => {
                    check("local", i, function.locals.len())?
                }
                Opcode::LoadArg(i) | Opcode::StoreArg(i) => {
                    check("argument", i, function.formals.len())?
                }
                Opcode::CreateClosure(f) => check("function", f, self.functions.len())?,
                Opcode::DefineObjectLiteral { keys, argc, .. } => {
                    check("literal keys", keys, self.literal_keys.len())?;
                    if self.literal_keys[keys as usize].len() != argc as usize {
                        return Err(DecodeError::IndexOutOfRange {
                            function: index,
                            table: "literal value",
                            index: argc,
                            offset,
                        });
                    }
                }
                _ => {}
            }
            last = Some(opcode);
        }

        for (offset, target) in jumps {
            if !boundaries.contains(&target) {
                return Err(DecodeError::BadJumpTarget {
                    function: index,
                    offset,
                    target,
                });
            }
        }

        match last {
            Some(opcode) if opcode.is_terminator() => Ok(()),
            _ => Err(DecodeError::MissingTerminator { function: index }),
        }
    }

    /// Serializes the unit to a byte image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ImageWriter::default();
        w.bytes.extend_from_slice(IMAGE_MAGIC);
        w.bytes.push(IMAGE_VERSION);
        w.str(&self.file_name);

        w.u32(self.strings.len() as u32);
        for s in &self.strings {
            w.str(s);
        }

        w.u32(self.literal_keys.len() as u32);
        for keys in &self.literal_keys {
            w.u32_list(keys);
        }

        w.u32(self.functions.len() as u32);
        for f in &self.functions {
            w.u32(f.name);
            w.bytes.push(f.flags.to_byte());
            w.u32(f.register_count);
            w.u32(f.lookup_count);
            w.u32_list(&f.formals);
            w.u32_list(&f.locals);
            w.u32(f.constants.len() as u32);
            for c in &f.constants {
                c.write_to(&mut w.bytes);
            }
            w.u32(f.line_table.len() as u32);
            for entry in &f.line_table {
                w.u32(entry.offset);
                w.u32(entry.line);
            }
            w.u32(f.code.len() as u32);
            w.bytes.extend_from_slice(&f.code);
        }
        w.bytes
    }

    /// Reads a unit back from [`to_bytes`](Self::to_bytes) output. The
    /// result is not validated.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = ImageReader { bytes, pos: 0 };
        if r.take(4)? != IMAGE_MAGIC {
            return Err(DecodeError::InvalidImage("bad magic".to_string()));
        }
        let version = r.u8()?;
        if version != IMAGE_VERSION {
            return Err(DecodeError::InvalidImage(format!(
                "unsupported version {}",
                version
            )));
        }
        let file_name = r.str()?;

        let count = r.u32()? as usize;
        let mut strings = Vec::with_capacity(count.min(bytes.len()));
        for _ in 0..count {
            strings.push(r.str()?);
        }

        let count = r.u32()? as usize;
        let mut literal_keys = Vec::with_capacity(count.min(bytes.len()));
        for _ in 0..count {
            literal_keys.push(r.u32_list()?);
        }

        let count = r.u32()? as usize;
        let mut functions = Vec::with_capacity(count.min(bytes.len()));
        for _ in 0..count {
            let name = r.u32()?;
            let flags = FunctionFlags::from_byte(r.u8()?);
            let register_count = r.u32()?;
            let lookup_count = r.u32()?;
            let formals = r.u32_list()?;
            let locals = r.u32_list()?;

            let n = r.u32()? as usize;
            let mut constants = Vec::with_capacity(n.min(bytes.len()));
            for _ in 0..n {
                let (constant, used) = Constant::read_from(&bytes[r.pos..])?;
                r.pos += used;
                constants.push(constant);
            }

            let n = r.u32()? as usize;
            let mut line_table = Vec::with_capacity(n.min(bytes.len()));
            for _ in 0..n {
                line_table.push(LineEntry {
                    offset: r.u32()?,
                    line: r.u32()?,
                });
            }

            let len = r.u32()? as usize;
            let code = r.take(len)?.to_vec();

            functions.push(CompiledFunction {
                name,
                code,
                constants,
                formals,
                locals,
                register_count,
                lookup_count,
                flags,
                line_table,
            });
        }

        if r.pos != bytes.len() {
            return Err(DecodeError::InvalidImage("trailing bytes".to_string()));
        }

        Ok(CompilationUnit {
            file_name,
            strings,
            literal_keys,
            functions,
        })
    }
}

#[derive(Default)]
struct ImageWriter {
    bytes: Vec<u8>,
}

impl ImageWriter {
    fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn str(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.bytes.extend_from_slice(s.as_bytes());
    }

    fn u32_list(&mut self, values: &[u32]) {
        self.u32(values.len() as u32);
        for v in values {
            self.u32(*v);
        }
    }
}

struct ImageReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ImageReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| DecodeError::InvalidImage(format!("truncated at byte {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn str(&mut self) -> Result<String, DecodeError> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| DecodeError::InvalidImage(format!("invalid UTF-8: {}", e)))
    }

    fn u32_list(&mut self) -> Result<Vec<u32>, DecodeError> {
        let len = self.u32()? as usize;
        let mut values = Vec::with_capacity(len.min(self.bytes.len()));
        for _ in 0..len {
            values.push(self.u32()?);
        }
        Ok(values)
    }
}
