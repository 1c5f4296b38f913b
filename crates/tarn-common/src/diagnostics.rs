//! Diagnostics for the Tarn compiler.
//!
//! Tarn compiles in a single pass and stops at the first error: every
//! fallible compilation step returns `CompileResult<T>` and the first
//! `Diagnostic` propagates all the way out of `compile`. There is no
//! recovery and no diagnostic accumulation.

use crate::span::Pos;

/// A fatal compile-time diagnostic.
///
/// Rendered as `file:line:col: message`, one line, naming the failing
/// construct and, where available, the offending type or identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: String,
    pub pos: Pos,
    pub message: String,
}

impl Diagnostic {
    pub fn error(file: impl Into<String>, pos: Pos, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            pos,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.pos, self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// The result of any fallible compilation step.
pub type CompileResult<T> = Result<T, Diagnostic>;
