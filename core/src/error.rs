//! Error taxonomy for the machine and its guest scripts.

use thiserror::Error;

/// Host-surface failures (asset loading, sheet saving). Guest faults never
/// travel through this type; they are [`ScriptFailure`] values the machine
/// inspects.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("sprite sheet: {0}")]
    Sheet(String),
}

/// Tagged outcome of a guest lifecycle call. The machine looks at the tag to
/// decide the fault transition; no unwinding crosses this boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptFailure {
    /// Malformed source; aborts the load that produced it and nothing else.
    #[error("compile error in {name}: {message}")]
    Compile { name: String, message: String },

    /// Uncaught fault inside a lifecycle call.
    #[error("{0}")]
    Runtime(String),

    /// The CPU-budget watchdog aborted the call.
    #[error("cpu limit exceeded ({budget_ms} ms)")]
    Timeout { budget_ms: u64 },
}

impl ScriptFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScriptFailure::Timeout { .. })
    }
}
