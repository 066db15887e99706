//! Seams between the core and the chat transport.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use cutout_models::{ChatId, MessageId};

use crate::error::TransportResult;
use crate::types::{MediaPayload, UpdateBatch};

/// Outbound chat operations used by intake and the worker.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post a new message and return its id.
    async fn post_message(&self, chat: ChatId, text: &str) -> TransportResult<MessageId>;

    /// Edit a message in place. Fails if the target no longer exists.
    async fn edit_message(&self, chat: ChatId, message: MessageId, text: &str)
        -> TransportResult<()>;

    async fn send_video(&self, chat: ChatId, media: MediaPayload) -> TransportResult<()>;

    async fn send_animation(&self, chat: ChatId, media: MediaPayload) -> TransportResult<()>;

    /// Download a user's file to `dest`.
    async fn download_file(&self, file_id: &str, dest: &Path) -> TransportResult<()>;
}

/// Inbound event source for the bot front end.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Long-poll for updates with id >= `offset`.
    ///
    /// Updates the bot cannot act on are left out of `updates` but still
    /// count towards `last_update_id`, so the caller can acknowledge them.
    async fn poll_updates(&self, offset: Option<i64>, timeout: Duration)
        -> TransportResult<UpdateBatch>;
}
