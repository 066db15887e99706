//! Backend error types.

use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

/// Matting failures. The display text is what the user sees after `Failed: `.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0} CLI not found. Ensure the package is installed and on PATH.")]
    ToolNotFound(String),

    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("No output produced by {0}.")]
    NoOutput(String),

    #[error("Unexpected response from processing API: {0}")]
    MalformedResponse(String),

    #[error("Prediction {status}: {message}")]
    PredictionFailed { status: String, message: String },

    #[error("Processing API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BackendError {
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the request never reached the server.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, BackendError::Transport(e) if e.is_connect())
    }

    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            BackendError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
