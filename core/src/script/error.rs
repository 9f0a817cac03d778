//! Errors raised inside the script engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScriptError>;

/// Script-internal error; the sandbox maps these onto the lifecycle result
/// the machine inspects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// Lexing or parsing failure.
    #[error("line {line}: {message}")]
    Syntax { line: u32, message: String },

    /// Fault while executing guest code.
    #[error("line {line}: {message}")]
    Runtime { line: u32, message: String },

    /// Module resolution or loading failure; the message names the path.
    #[error("{0}")]
    Module(String),

    /// Raised by the CPU-budget watchdog.
    #[error("cpu limit exceeded")]
    Timeout { budget_ms: u64 },
}

impl ScriptError {
    pub fn runtime(line: u32, message: impl Into<String>) -> Self {
        ScriptError::Runtime {
            line,
            message: message.into(),
        }
    }

    pub fn syntax(line: u32, message: impl Into<String>) -> Self {
        ScriptError::Syntax {
            line,
            message: message.into(),
        }
    }
}
