//! Model error types.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid output reference: {0}")]
    InvalidOutputRef(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl ModelError {
    pub fn invalid_output_ref(msg: impl Into<String>) -> Self {
        Self::InvalidOutputRef(msg.into())
    }
}
