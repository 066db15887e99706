//! Admission control for inbound media.
//!
//! An accepted upload is downloaded into the staging directory, announced
//! with the initial status message, then enqueued. From then on the worker
//! owns the staged file.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use cutout_models::{CutoutJob, JobId, MediaKind, MessageId, StatusState};
use cutout_queue::JobQueue;
use cutout_telegram::{ChatTransport, InboundMedia};

use crate::config::BotConfig;
use crate::error::{IntakeError, IntakeResult};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// What an accepted intake produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub job_id: JobId,
    pub status_message_id: MessageId,
    pub staged_path: PathBuf,
}

/// Validates uploads and hands them to the queue.
pub struct IntakeValidator {
    transport: Arc<dyn ChatTransport>,
    queue: Arc<dyn JobQueue>,
    config: BotConfig,
}

impl IntakeValidator {
    pub fn new(transport: Arc<dyn ChatTransport>, queue: Arc<dyn JobQueue>, config: BotConfig) -> Self {
        Self {
            transport,
            queue,
            config,
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Reject sizes over the cap. A missing size counts as zero.
    pub fn check_size(&self, size_bytes: Option<u64>) -> IntakeResult<f64> {
        // Compare at the precision shown in the rejection text.
        let size_mb = round_mb(size_bytes.unwrap_or(0) as f64 / BYTES_PER_MB);
        if size_mb > self.config.max_file_mb {
            return Err(IntakeError::TooLarge {
                size_mb,
                max_mb: self.config.max_file_mb,
            });
        }
        Ok(size_mb)
    }

    /// Admit one upload: size check, download, status post, enqueue.
    ///
    /// On any error the staged file is gone and no job exists.
    pub async fn admit(&self, media: &InboundMedia) -> IntakeResult<Admission> {
        let size_mb = self.check_size(media.file_size_bytes)?;

        let suffix = match media.kind {
            MediaKind::Video => ".mp4",
            MediaKind::Animation => ".gif",
        };
        // Removed on drop until handed over to the worker.
        let staged = tempfile::Builder::new()
            .prefix("cutout-in-")
            .suffix(suffix)
            .tempfile_in(&self.config.staging_dir)?
            .into_temp_path();

        debug!(
            "Downloading {} ({:.2} MB) for chat {} to {}",
            media.file_id,
            size_mb,
            media.chat_id,
            staged.display()
        );
        self.transport
            .download_file(&media.file_id, &staged)
            .await
            .map_err(IntakeError::Materialize)?;

        let accepted_text = StatusState::Accepted.text().unwrap_or_default();
        let status_message_id = self
            .transport
            .post_message(media.chat_id, accepted_text)
            .await?;

        let job = CutoutJob::new(media.chat_id, status_message_id, staged.to_path_buf(), media.kind)
            .with_timeout(self.config.job_timeout);
        let job_id = job.job_id.clone();

        if let Err(e) = self.queue.enqueue(job.into()).await {
            let text = StatusState::failed_text("could not queue the job");
            if let Err(edit_err) = self
                .transport
                .edit_message(media.chat_id, status_message_id, &text)
                .await
            {
                warn!("Failed to mark status {} as failed: {}", status_message_id, edit_err);
            }
            return Err(e.into());
        }

        let staged_path = staged.keep().map_err(|e| IntakeError::Io(e.error))?;

        info!(
            "Accepted {} from chat {} as job {}",
            media.kind, media.chat_id, job_id
        );

        Ok(Admission {
            job_id,
            status_message_id,
            staged_path,
        })
    }
}

fn round_mb(mb: f64) -> f64 {
    (mb * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutout_models::ChatId;
    use cutout_queue::{MemoryQueue, QueueJob};
    use cutout_telegram::fake::{RecordingTransport, TransportCall};
    use std::time::Duration;
    use tempfile::TempDir;

    const MB: u64 = 1024 * 1024;

    struct Harness {
        dir: TempDir,
        transport: Arc<RecordingTransport>,
        queue: Arc<MemoryQueue>,
        intake: IntakeValidator,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(RecordingTransport::new().with_download_bytes(b"video bytes".to_vec()));
        let queue = Arc::new(MemoryQueue::default());
        let config = BotConfig {
            staging_dir: dir.path().to_path_buf(),
            job_timeout: Duration::from_secs(90),
            ..Default::default()
        };
        let intake = IntakeValidator::new(transport.clone(), queue.clone(), config);
        Harness {
            dir,
            transport,
            queue,
            intake,
        }
    }

    fn media(size_bytes: Option<u64>, kind: MediaKind) -> InboundMedia {
        InboundMedia {
            chat_id: ChatId(42),
            message_id: MessageId(1),
            file_id: "file-1".to_string(),
            file_size_bytes: size_bytes,
            kind,
        }
    }

    fn staged_files(dir: &TempDir) -> Vec<PathBuf> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    #[test]
    fn test_size_boundary() {
        let h = harness();
        assert!(h.intake.check_size(Some(50 * MB)).is_ok());
        assert!(h.intake.check_size(None).is_ok());
        // Rounds to 50.00, so it must not be reported as over 50.
        assert_eq!(h.intake.check_size(Some(50 * MB + 1)).unwrap(), 50.0);
        assert!(h.intake.check_size(Some(50 * MB + MB / 400)).is_ok());

        let err = h.intake.check_size(Some(50 * MB + MB / 50)).unwrap_err();
        assert!(matches!(err, IntakeError::TooLarge { .. }));
        assert_eq!(
            err.reply_text().as_deref(),
            Some("File is 50.02 MB. Max allowed is 50 MB.")
        );
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected_untouched() {
        let h = harness();

        let err = h.intake.admit(&media(Some(60 * MB), MediaKind::Video)).await.unwrap_err();

        assert!(err.to_string().contains("Max allowed"));
        assert_eq!(err.to_string(), "File is 60.00 MB. Max allowed is 50 MB.");
        assert!(h.transport.calls().is_empty());
        assert_eq!(h.queue.len().await.unwrap(), 0);
        assert!(staged_files(&h.dir).is_empty());
    }

    #[tokio::test]
    async fn test_accepted_upload_stages_posts_and_enqueues_once() {
        let h = harness();

        let admission = h.intake.admit(&media(Some(10 * MB), MediaKind::Video)).await.unwrap();

        assert_eq!(staged_files(&h.dir), vec![admission.staged_path.clone()]);
        assert_eq!(
            std::fs::read(&admission.staged_path).unwrap(),
            b"video bytes".to_vec()
        );
        assert!(admission
            .staged_path
            .extension()
            .is_some_and(|ext| ext == "mp4"));

        let posts: Vec<_> = h
            .transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, TransportCall::Post { .. }))
            .collect();
        assert_eq!(
            posts,
            vec![TransportCall::Post {
                chat: ChatId(42),
                text: "Got it. Cooking your cutout… ⏳".to_string(),
            }]
        );

        let deliveries = h
            .queue
            .consume("test", Duration::from_millis(10), 10)
            .await
            .unwrap();
        assert_eq!(deliveries.len(), 1);
        let QueueJob::RemoveBackground(job) = &deliveries[0].job;
        assert_eq!(job.job_id, admission.job_id);
        assert_eq!(job.chat_id, ChatId(42));
        assert_eq!(job.status_message_id, admission.status_message_id);
        assert_eq!(job.input_path(), admission.staged_path.as_path());
        assert_eq!(job.input_kind, MediaKind::Video);
        assert_eq!(job.timeout(), Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_animation_is_staged_as_gif() {
        let h = harness();

        let admission = h.intake.admit(&media(None, MediaKind::Animation)).await.unwrap();

        assert!(admission
            .staged_path
            .extension()
            .is_some_and(|ext| ext == "gif"));
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let h = harness();
        h.transport.fail_downloads(true);

        let err = h.intake.admit(&media(Some(MB), MediaKind::Video)).await.unwrap_err();

        assert!(matches!(err, IntakeError::Materialize(_)));
        assert!(staged_files(&h.dir).is_empty());
        assert!(h.transport.texts().is_empty());
        assert_eq!(h.queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_status_post_removes_staged_file() {
        let h = harness();
        h.transport.fail_posts(true);

        let err = h.intake.admit(&media(Some(MB), MediaKind::Video)).await.unwrap_err();

        assert!(matches!(err, IntakeError::Transport(_)));
        assert!(staged_files(&h.dir).is_empty());
        assert_eq!(h.queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_enqueue_marks_status_failed() {
        let h = harness();
        let queue = Arc::new(FailingQueue);
        let intake = IntakeValidator::new(h.transport.clone(), queue, h.intake.config().clone());

        let err = intake.admit(&media(Some(MB), MediaKind::Video)).await.unwrap_err();

        assert!(matches!(err, IntakeError::Queue(_)));
        assert!(staged_files(&h.dir).is_empty());
        assert_eq!(
            h.transport.edits(),
            vec!["Failed: could not queue the job".to_string()]
        );
    }

    struct FailingQueue;

    #[async_trait::async_trait]
    impl JobQueue for FailingQueue {
        async fn enqueue(&self, job: QueueJob) -> cutout_queue::QueueResult<String> {
            Err(cutout_queue::QueueError::Duplicate(job.job_id().to_string()))
        }

        async fn consume(
            &self,
            _: &str,
            _: Duration,
            _: usize,
        ) -> cutout_queue::QueueResult<Vec<cutout_queue::Delivery>> {
            Ok(Vec::new())
        }

        async fn claim_expired(
            &self,
            _: &str,
            _: usize,
        ) -> cutout_queue::QueueResult<cutout_queue::ClaimOutcome> {
            Ok(Default::default())
        }

        async fn ack(&self, _: &str) -> cutout_queue::QueueResult<()> {
            Ok(())
        }

        async fn dead_letter(
            &self,
            _: &cutout_queue::Delivery,
            _: &str,
        ) -> cutout_queue::QueueResult<()> {
            Ok(())
        }

        async fn len(&self) -> cutout_queue::QueueResult<u64> {
            Ok(0)
        }

        async fn dlq_len(&self) -> cutout_queue::QueueResult<u64> {
            Ok(0)
        }

        fn max_deliveries(&self) -> u32 {
            1
        }
    }
}
