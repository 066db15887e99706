//! Transport-facing types.

use std::path::PathBuf;
use url::Url;

use cutout_models::{ChatId, MediaKind, MessageId};

/// How the final artifact reaches the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaPayload {
    /// The transport fetches the file itself
    Url(Url),
    /// Bytes are streamed from this local file
    File(PathBuf),
}

/// A media file a user sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMedia {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    /// Transport handle used to materialize the file
    pub file_id: String,
    /// Size reported by the transport, if any
    pub file_size_bytes: Option<u64>,
    pub kind: MediaKind,
}

/// What an inbound message carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundContent {
    /// A bot command such as `/start` (without arguments)
    Command(String),
    Media(InboundMedia),
    /// Anything else in a chat (plain text, stickers, ...)
    Other,
}

/// One polled update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub content: InboundContent,
}

/// Result of one long poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateBatch {
    /// Updates the bot can act on
    pub updates: Vec<InboundUpdate>,
    /// Highest raw update id in the reply, including skipped updates
    pub last_update_id: Option<i64>,
}

impl UpdateBatch {
    /// Offset that acknowledges everything in this batch.
    pub fn next_offset(&self) -> Option<i64> {
        self.last_update_id.map(|id| id + 1)
    }
}
