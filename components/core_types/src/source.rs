//! Source locations attached to errors and debugger events.

use std::fmt;

/// A position in script source.
///
/// Lines are 1-based as emitted by the compiler's line table; `offset` is
/// the bytecode offset when the position was recovered from a running
/// frame, or the byte offset into the source text when it came from the
/// compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePosition {
    /// 1-based line
    pub line: u32,
    /// Column, 0 when unknown
    pub column: u32,
    /// Byte offset, see the type docs
    pub offset: usize,
}

/// One frame of an unwound script stack.
///
/// # Examples
///
/// ```
/// use core_types::StackFrame;
///
/// let frame = StackFrame {
///     function_name: Some("update".to_string()),
///     source_url: Some("qrc:/main.qml".to_string()),
///     line: 25,
///     column: 0,
/// };
/// assert_eq!(frame.to_string(), "update@qrc:/main.qml:25");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Name of the function, or None for anonymous code
    pub function_name: Option<String>,
    /// File the function was compiled from
    pub source_url: Option<String>,
    /// Line being executed in this frame
    pub line: u32,
    /// Column, 0 when unknown
    pub column: u32,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}",
            self.function_name.as_deref().unwrap_or("<anonymous>"),
            self.source_url.as_deref().unwrap_or("<unknown>"),
            self.line
        )
    }
}
