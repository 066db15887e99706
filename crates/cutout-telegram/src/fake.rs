//! In-memory transport that records every call.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use cutout_models::{ChatId, MessageId};

use crate::error::{TransportError, TransportResult};
use crate::transport::ChatTransport;
use crate::types::MediaPayload;

/// One observed transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Post { chat: ChatId, text: String },
    Edit { chat: ChatId, message: MessageId, text: String },
    SendVideo { chat: ChatId, media: MediaPayload },
    SendAnimation { chat: ChatId, media: MediaPayload },
    Download { file_id: String, dest: std::path::PathBuf },
}

/// Recording fake with switchable failures.
#[derive(Debug)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    next_message_id: AtomicI64,
    download_bytes: Mutex<Vec<u8>>,
    fail_edits: AtomicBool,
    fail_posts: AtomicBool,
    fail_sends: AtomicBool,
    fail_downloads: AtomicBool,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(1000),
            download_bytes: Mutex::new(b"data".to_vec()),
            fail_edits: AtomicBool::new(false),
            fail_posts: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            fail_downloads: AtomicBool::new(false),
        }
    }

    /// Bytes written by `download_file`.
    pub fn with_download_bytes(self, bytes: impl Into<Vec<u8>>) -> Self {
        *self.download_bytes.lock().unwrap() = bytes.into();
        self
    }

    pub fn fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_posts(&self, fail: bool) {
        self.fail_posts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_downloads(&self, fail: bool) {
        self.fail_downloads.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Texts of posts and edits, in call order.
    pub fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Post { text, .. } | TransportCall::Edit { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Texts of edits only, in call order.
    pub fn edits(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Edit { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn rejected(what: &str) -> TransportError {
        TransportError::api(400, format!("Bad Request: {what}"))
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn post_message(&self, chat: ChatId, text: &str) -> TransportResult<MessageId> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(Self::rejected("chat not found"));
        }
        self.record(TransportCall::Post {
            chat,
            text: text.to_string(),
        });
        Ok(MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn edit_message(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
    ) -> TransportResult<()> {
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(Self::rejected("message to edit not found"));
        }
        self.record(TransportCall::Edit {
            chat,
            message,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_video(&self, chat: ChatId, media: MediaPayload) -> TransportResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Self::rejected("file is too big"));
        }
        self.record(TransportCall::SendVideo { chat, media });
        Ok(())
    }

    async fn send_animation(&self, chat: ChatId, media: MediaPayload) -> TransportResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Self::rejected("file is too big"));
        }
        self.record(TransportCall::SendAnimation { chat, media });
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> TransportResult<()> {
        self.record(TransportCall::Download {
            file_id: file_id.to_string(),
            dest: dest.to_path_buf(),
        });
        if self.fail_downloads.load(Ordering::SeqCst) {
            // Simulate a download that dies halfway through.
            tokio::fs::write(dest, b"partial").await?;
            return Err(TransportError::download_failed("connection reset"));
        }
        let bytes = self.download_bytes.lock().unwrap().clone();
        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }
}
