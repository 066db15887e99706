//! Intake error types.

use cutout_queue::QueueError;
use cutout_telegram::TransportError;
use thiserror::Error;

pub type IntakeResult<T> = Result<T, IntakeError>;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("File is {size_mb:.2} MB. Max allowed is {max_mb} MB.")]
    TooLarge { size_mb: f64, max_mb: f64 },

    #[error("Could not download the file: {0}")]
    Materialize(#[source] TransportError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntakeError {
    /// Text to answer the user with, if the user should hear about it.
    ///
    /// Queue failures already edited the status message, and a failed post
    /// means the chat is unreachable anyway.
    pub fn reply_text(&self) -> Option<String> {
        match self {
            IntakeError::TooLarge { .. } => Some(self.to_string()),
            IntakeError::Materialize(_) => {
                Some("Could not download your file. Please try again.".to_string())
            }
            IntakeError::Io(_) => Some("Something went wrong. Please try again.".to_string()),
            IntakeError::Transport(_) | IntakeError::Queue(_) => None,
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, IntakeError::TooLarge { .. })
    }
}
