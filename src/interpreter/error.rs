use thiserror::Error;

use crate::token::Span;

/// Errors raised while evaluating a program. Every variant points at the
/// offending expression.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String, span: Span },
    #[error("invalid number literal '{literal}'")]
    InvalidNumber { literal: String, span: Span },
    #[error("value of type {type_name} is not an array or table")]
    NotIndexable { type_name: &'static str, span: Span },
    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds { index: i64, len: usize, span: Span },
    #[error("key '{key}' not found in table")]
    KeyNotFound { key: String, span: Span },
    #[error("array index must be an integer")]
    ArrayIndexType { span: Span },
    #[error("table key must be a string")]
    TableKeyType { span: Span },
    #[error("cannot assign to field '{field}' on a value of type {type_name}")]
    FieldOnNonTable {
        field: String,
        type_name: &'static str,
        span: Span,
    },
    #[error("cannot assign to this expression")]
    InvalidAssignTarget { span: Span },
    #[error("expected a number, but got {type_name}")]
    ExpectedNumber { type_name: &'static str, span: Span },
    #[error("expected a boolean, but got {type_name}")]
    ExpectedBool { type_name: &'static str, span: Span },
    #[error("divide by zero")]
    DivideByZero { span: Span },
    #[error("'{callee}' is not a function")]
    NotAFunction { callee: String, span: Span },
    #[error("'break' outside of a loop")]
    BreakOutsideLoop { span: Span },
    #[error("'continue' outside of a loop")]
    ContinueOutsideLoop { span: Span },
    #[error("maximum recursion depth exceeded")]
    RecursionLimit { span: Span },
    #[error("import path must be a string, but got {type_name}")]
    ImportPathType { type_name: &'static str, span: Span },
    #[error("duplicate import: '{path}' was already imported")]
    DuplicateImport { path: String, span: Span },
    #[error("failed to import file '{path}': {reason}")]
    ImportFailed {
        path: String,
        reason: String,
        span: Span,
    },
    /// A native function returned an error; the message is surfaced at the
    /// call site.
    #[error("{message}")]
    NativeCall { message: String, span: Span },
}

impl RuntimeError {
    pub fn span(&self) -> &Span {
        match self {
            Self::UndefinedVariable { span, .. }
            | Self::InvalidNumber { span, .. }
            | Self::NotIndexable { span, .. }
            | Self::IndexOutOfBounds { span, .. }
            | Self::KeyNotFound { span, .. }
            | Self::ArrayIndexType { span }
            | Self::TableKeyType { span }
            | Self::FieldOnNonTable { span, .. }
            | Self::InvalidAssignTarget { span }
            | Self::ExpectedNumber { span, .. }
            | Self::ExpectedBool { span, .. }
            | Self::DivideByZero { span }
            | Self::NotAFunction { span, .. }
            | Self::BreakOutsideLoop { span }
            | Self::ContinueOutsideLoop { span }
            | Self::RecursionLimit { span }
            | Self::ImportPathType { span, .. }
            | Self::DuplicateImport { span, .. }
            | Self::ImportFailed { span, .. }
            | Self::NativeCall { span, .. } => span,
        }
    }
}
