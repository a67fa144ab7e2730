use thiserror::Error;

use j5_sandbox::ScriptError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    InvalidRequest,
    Body,
    Other,
}

/// Connection-level failure: no HTTP exchange completed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_builder() {
            TransportErrorKind::InvalidRequest
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Other
        };
        // reqwest's Display stops at the outermost layer; keep the cause chain.
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self { kind, message }
    }
}

/// Coarse classification of a failed call, for logs and callers that care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Script,
    ScriptTimeout,
    Cancelled,
}

/// Reasons a pipeline call aborts. Only the Display text reaches
/// `ExecutionResult::error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("{source}")]
    PreRequestScript { source: ScriptError },

    #[error("{source}")]
    PostResponseScript { source: ScriptError },

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("Request cancelled")]
    Cancelled,
}

impl ExecutionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::PreRequestScript { source } | Self::PostResponseScript { source } => {
                if source.is_timeout() {
                    FailureKind::ScriptTimeout
                } else {
                    FailureKind::Script
                }
            }
            Self::Transport(_) => FailureKind::Transport,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }
}
