//! Best-effort status message updates.
//!
//! The reporter owns the job's position in the status state machine and
//! mirrors it into the chat. Transport failures are logged, never returned:
//! a status edit must not abort a job or its cleanup.

use std::sync::Arc;

use cutout_models::{ChatId, MessageId, StatusState};
use cutout_telegram::ChatTransport;

use crate::logging::JobLogger;

pub struct StatusReporter {
    transport: Arc<dyn ChatTransport>,
    chat: ChatId,
    message: MessageId,
    state: StatusState,
    logger: JobLogger,
}

impl StatusReporter {
    /// Start from `Accepted`, which intake posted.
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        chat: ChatId,
        message: MessageId,
        logger: JobLogger,
    ) -> Self {
        Self {
            transport,
            chat,
            message,
            state: StatusState::Accepted,
            logger,
        }
    }

    pub fn state(&self) -> StatusState {
        self.state
    }

    fn advance(&mut self, next: StatusState) -> bool {
        match self.state.transition(next) {
            Ok(state) => {
                self.state = state;
                true
            }
            Err(e) => {
                self.logger.log_warning(&format!("Ignoring status update: {}", e));
                false
            }
        }
    }

    /// Backend call started. No chat update.
    pub fn processing(&mut self) {
        self.advance(StatusState::Processing);
    }

    pub async fn uploading(&mut self) {
        if self.advance(StatusState::Uploading) {
            self.edit(StatusState::Uploading).await;
        }
    }

    pub async fn done(&mut self) {
        if self.advance(StatusState::Done) {
            self.edit(StatusState::Done).await;
        }
    }

    /// Report a failure. If the status message cannot be edited the text
    /// is posted as a new message instead.
    pub async fn failed(&mut self, reason: &str) {
        if !self.advance(StatusState::Failed) {
            return;
        }

        let text = StatusState::failed_text(reason);
        if let Err(e) = self.transport.edit_message(self.chat, self.message, &text).await {
            self.logger
                .log_warning(&format!("Failed to edit status message: {}", e));
            if let Err(e) = self.transport.post_message(self.chat, &text).await {
                self.logger
                    .log_warning(&format!("Failed to post failure message: {}", e));
            }
        }
    }

    async fn edit(&self, state: StatusState) {
        let Some(text) = state.text() else {
            return;
        };
        if let Err(e) = self.transport.edit_message(self.chat, self.message, text).await {
            self.logger
                .log_warning(&format!("Failed to edit status message: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutout_models::{CutoutJob, MediaKind};
    use cutout_telegram::fake::{RecordingTransport, TransportCall};

    fn reporter(transport: Arc<RecordingTransport>) -> StatusReporter {
        let job = CutoutJob::new(ChatId(7), MessageId(70), "/tmp/in.mp4", MediaKind::Video);
        StatusReporter::new(transport, ChatId(7), MessageId(70), JobLogger::new(&job, 1))
    }

    #[tokio::test]
    async fn test_success_sequence() {
        let transport = Arc::new(RecordingTransport::new());
        let mut status = reporter(transport.clone());

        status.processing();
        status.uploading().await;
        status.done().await;

        assert_eq!(
            transport.edits(),
            vec!["Uploading your cutout… 🚀".to_string(), "Done ✅".to_string()]
        );
        assert_eq!(status.state(), StatusState::Done);
    }

    #[tokio::test]
    async fn test_failed_edit_falls_back_to_post() {
        let transport = Arc::new(RecordingTransport::new());
        transport.fail_edits(true);
        let mut status = reporter(transport.clone());

        status.failed("boom").await;

        assert_eq!(
            transport.calls(),
            vec![TransportCall::Post {
                chat: ChatId(7),
                text: "Failed: boom".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_secondary_failures_are_swallowed() {
        let transport = Arc::new(RecordingTransport::new());
        transport.fail_edits(true);
        transport.fail_posts(true);
        let mut status = reporter(transport.clone());

        status.uploading().await;
        status.failed("boom").await;

        assert!(transport.calls().is_empty());
        assert_eq!(status.state(), StatusState::Failed);
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let transport = Arc::new(RecordingTransport::new());
        let mut status = reporter(transport.clone());

        status.uploading().await;
        status.done().await;
        status.failed("late").await;

        assert_eq!(transport.edits().len(), 2);
        assert_eq!(status.state(), StatusState::Done);
    }
}
