//! Errors raised while decoding or validating bytecode.

use thiserror::Error;

/// Malformed bytecode
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The instruction at `offset` runs past the end of the code.
    #[error("truncated instruction at offset {offset}")]
    Truncated {
        /// Offset of the instruction's tag byte
        offset: usize,
    },

    /// Unknown opcode tag.
    #[error("unknown opcode 0x{tag:02x} at offset {offset}")]
    UnknownOpcode {
        /// The tag byte
        tag: u8,
        /// Offset of the tag byte
        offset: usize,
    },

    /// Unknown comparison operator byte.
    #[error("unknown comparison operator {op} at offset {offset}")]
    UnknownCompareOp {
        /// The operator byte
        op: u8,
        /// Offset of the instruction
        offset: usize,
    },

    /// A jump target that is not an instruction boundary.
    #[error("function {function}: jump at offset {offset} targets {target}, which is not an instruction boundary")]
    BadJumpTarget {
        /// Function index within the unit
        function: usize,
        /// Offset of the jump instruction
        offset: usize,
        /// Encoded target
        target: u32,
    },

    /// An operand indexes past the end of one of the unit's tables.
    #[error("function {function}: {table} index {index} out of range at offset {offset}")]
    IndexOutOfRange {
        /// Function index within the unit
        function: usize,
        /// Which table was indexed
        table: &'static str,
        /// The operand value
        index: u32,
        /// Offset of the instruction
        offset: usize,
    },

    /// Control can run off the end of the function's code.
    #[error("function {function} does not end in a terminating instruction")]
    MissingTerminator {
        /// Function index within the unit
        function: usize,
    },

    /// Serialized unit is malformed.
    #[error("invalid compilation unit image: {0}")]
    InvalidImage(String),
}

/// Errors from [`FunctionBuilder::finish`](crate::FunctionBuilder::finish)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A label was used as a jump target but never bound.
    #[error("label {0} was never bound")]
    UnboundLabel(usize),
}
