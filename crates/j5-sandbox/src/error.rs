use thiserror::Error;

/// Failure of one sandbox invocation.
///
/// `Failed` and `TimedOut` render differently so callers can tell a broken
/// script from one that never returns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("Script execution failed: {0}")]
    Failed(String),

    #[error("Script execution timed out after {timeout_ms} ms")]
    TimedOut { timeout_ms: u64 },

    #[error("Script sandbox unavailable: {0}")]
    Setup(String),
}

impl ScriptError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}
