//! Script error types as seen by the embedding host.
//!
//! Inside the interpreter exceptions are plain [`Value`](crate::Value)s
//! carried by the engine's exception flag. When an exception reaches the
//! outermost caller it is converted into a [`JsError`].

use std::fmt;

use thiserror::Error;

use crate::{SourcePosition, StackFrame};

/// The kind of script error.
///
/// These correspond to the built-in error constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Plain `Error`, also used for thrown non-error values
    Error,
    /// Syntax error in source or in a dynamically evaluated string
    SyntaxError,
    /// Type error (e.g., calling a non-function)
    TypeError,
    /// Reference to an undeclared variable
    ReferenceError,
    /// Value out of allowed range
    RangeError,
    /// Error in eval() function
    EvalError,
    /// Error in URI handling functions
    URIError,
    /// Internal engine error
    InternalError,
}

impl ErrorKind {
    /// Constructor name as scripts see it.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::EvalError => "EvalError",
            ErrorKind::URIError => "URIError",
            ErrorKind::InternalError => "InternalError",
        }
    }

    /// Maps a constructor name back to a kind; unknown names are `Error`.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_types::ErrorKind;
    ///
    /// assert_eq!(ErrorKind::from_name("RangeError"), ErrorKind::RangeError);
    /// assert_eq!(ErrorKind::from_name("MyError"), ErrorKind::Error);
    /// ```
    pub fn from_name(name: &str) -> Self {
        match name {
            "SyntaxError" => ErrorKind::SyntaxError,
            "TypeError" => ErrorKind::TypeError,
            "ReferenceError" => ErrorKind::ReferenceError,
            "RangeError" => ErrorKind::RangeError,
            "EvalError" => ErrorKind::EvalError,
            "URIError" => ErrorKind::URIError,
            "InternalError" => ErrorKind::InternalError,
            _ => ErrorKind::Error,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An uncaught script exception surfaced to the host.
///
/// # Examples
///
/// ```
/// use core_types::{JsError, ErrorKind};
///
/// let error = JsError::new(ErrorKind::TypeError, "undefined is not a function");
/// assert_eq!(error.to_string(), "TypeError: undefined is not a function");
/// ```
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct JsError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Frames the exception unwound through, innermost first
    pub stack: Vec<StackFrame>,
    /// Source position where the error occurred
    pub source_position: Option<SourcePosition>,
}

impl JsError {
    /// Creates an error without stack information.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        JsError {
            kind,
            message: message.into(),
            stack: Vec::new(),
            source_position: None,
        }
    }

    /// Attaches the unwound stack.
    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.source_position = stack.first().map(|frame| SourcePosition {
            line: frame.line,
            column: frame.column,
            offset: 0,
        });
        self.stack = stack;
        self
    }
}
