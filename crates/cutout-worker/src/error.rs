//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Matting failed. Displayed as-is to the user.
    #[error("{0}")]
    Backend(#[from] cutout_matting::BackendError),

    /// Sending the result to the chat failed.
    #[error("Delivery failed: {0}")]
    Delivery(#[from] cutout_telegram::TransportError),

    #[error("Media error: {0}")]
    Media(#[from] cutout_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] cutout_queue::QueueError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Metric label for the failing stage.
    pub fn stage(&self) -> &'static str {
        match self {
            WorkerError::Backend(_) => "backend",
            WorkerError::Delivery(_) => "delivery",
            WorkerError::Media(_) => "compress",
            WorkerError::Queue(_) => "queue",
            WorkerError::ConfigError(_) => "config",
            WorkerError::Io(_) => "io",
        }
    }
}
