use thiserror::Error;

use crate::interpreter::RuntimeError;
use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::token::Span;

/// Everything the embedding host (or the CLI) can see go wrong: frontend
/// errors, runtime diagnostics, and type mismatches from the typed getters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VmError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("'{name}' is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },
    #[error("undefined variable '{name}'")]
    Undefined { name: String },
}

impl From<ParseError> for VmError {
    fn from(error: ParseError) -> Self {
        match error {
            // Lexer diagnostics keep their own rendering (square brackets).
            ParseError::Lex(inner) => Self::Lex(inner),
            other => Self::Parse(other),
        }
    }
}

impl VmError {
    pub fn span(&self) -> Option<&Span> {
        match self {
            Self::Lex(error) => Some(error.span()),
            Self::Parse(error) => Some(error.span()),
            Self::Runtime(error) => Some(error.span()),
            Self::TypeMismatch { .. } | Self::Undefined { .. } => None,
        }
    }

    /// The single-line diagnostic form:
    /// `error (<file>:<line>:<col>): <message>` for parse and runtime
    /// errors, `error [<file>:<line>:<col>]: <message>` for lexer errors,
    /// and `error: <message>` when no source location exists.
    pub fn render(&self) -> String {
        match self.span() {
            Some(span) => match self {
                Self::Lex(_) => format!("error [{span}]: {self}"),
                _ => format!("error ({span}): {self}"),
            },
            None => format!("error: {self}"),
        }
    }
}
