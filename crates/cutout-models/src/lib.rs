//! Shared data models for the cutout bot.
//!
//! This crate provides Serde-serializable types for:
//! - Job records handed from intake to the worker
//! - Matting results and their output references
//! - The status message state machine shown to the user

pub mod chat;
pub mod error;
pub mod job;
pub mod media;
pub mod status;

pub use chat::{ChatId, MessageId};
pub use error::{ModelError, ModelResult};
pub use job::{CutoutJob, JobId, DEFAULT_JOB_TIMEOUT_SECS};
pub use media::{MediaKind, MediaResult, OutputRef};
pub use status::{truncate_message, StatusState, MAX_MESSAGE_CHARS};
