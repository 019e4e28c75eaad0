//! Shared error taxonomy for compile-time and run-time failures.
//!
//! Every fallible entry point in the engine returns `Result<T, JinxError>`.
//! There is no unwinding across the host/script boundary (see spec §1);
//! native callbacks report failure through `Script::error` instead of by
//! propagating a Rust error type across the embedding API.

use std::fmt;

/// Source position attached to a diagnostic, 1-indexed for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub fn new(line: u32, column: u32) -> Self {
        SourcePos { line, column }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The error kinds from spec §7. Each kind carries a human-readable message
/// and, when available, the source position that produced it.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum JinxError {
    #[error("syntax error at {pos}: {message}")]
    Syntax { message: String, pos: SourcePos },

    #[error("resolution error: {message}")]
    Resolution { message: String },

    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },

    #[error("out of bounds: {message}")]
    Bounds { message: String },

    #[error("arithmetic error: {message}")]
    Arithmetic { message: String },

    #[error("internal stack error: {message}")]
    Stack { message: String },

    #[error("instruction quota exceeded: {message}")]
    Quota { message: String },

    #[error("bytecode format error: {message}")]
    Format { message: String },
}

impl JinxError {
    pub fn syntax(message: impl Into<String>, pos: SourcePos) -> Self {
        JinxError::Syntax {
            message: message.into(),
            pos,
        }
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        JinxError::Resolution {
            message: message.into(),
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        JinxError::TypeMismatch {
            message: message.into(),
        }
    }

    pub fn bounds(message: impl Into<String>) -> Self {
        JinxError::Bounds {
            message: message.into(),
        }
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        JinxError::Arithmetic {
            message: message.into(),
        }
    }

    pub fn stack(message: impl Into<String>) -> Self {
        JinxError::Stack {
            message: message.into(),
        }
    }

    pub fn quota(message: impl Into<String>) -> Self {
        JinxError::Quota {
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        JinxError::Format {
            message: message.into(),
        }
    }
}

pub type JinxResult<T> = Result<T, JinxError>;
