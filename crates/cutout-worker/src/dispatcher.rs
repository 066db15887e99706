//! One job, start to finish.
//!
//! `Accepted -> Processing -> Uploading -> Done`, or `Failed` from any of
//! them. Backend and delivery failures are reported the same way. The
//! staged input and any backend output are deleted when `run` returns or
//! its future is dropped.

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use cutout_matting::MattingBackend;
use cutout_media::{GifCompressor, GifEncoder};
use cutout_models::{CutoutJob, MediaKind, MediaResult, OutputRef};
use cutout_telegram::{ChatTransport, MediaPayload};

use crate::cleanup::CleanupGuard;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics;
use crate::status::StatusReporter;

/// How a job ended, as seen by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    Failed {
        /// Failing stage, for metrics
        stage: &'static str,
        reason: String,
    },
}

/// Runs jobs against one backend and one transport.
pub struct Dispatcher {
    backend: Arc<dyn MattingBackend>,
    transport: Arc<dyn ChatTransport>,
    compressor: GifCompressor<Arc<dyn GifEncoder>>,
    gif_max_mb: f64,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn MattingBackend>,
        transport: Arc<dyn ChatTransport>,
        encoder: Arc<dyn GifEncoder>,
        gif_max_mb: f64,
    ) -> Self {
        Self {
            backend,
            transport,
            compressor: GifCompressor::new(encoder),
            gif_max_mb,
        }
    }

    /// Process one job. Never fails: errors end up in the status message.
    pub async fn run(&self, job: &CutoutJob, attempt: u32) -> JobOutcome {
        let logger = JobLogger::new(job, attempt);
        let span = logger.span();

        async {
            let mut cleanup = CleanupGuard::new(job.input_path());
            let mut status = StatusReporter::new(
                Arc::clone(&self.transport),
                job.chat_id,
                job.status_message_id,
                logger.clone(),
            );

            logger.log_start(&format!(
                "{} {} via {}",
                job.input_kind,
                job.input_path().display(),
                self.backend.name()
            ));

            match self.execute(job, &mut status, &mut cleanup, &logger).await {
                Ok(()) => {
                    status.done().await;
                    logger.log_completion("delivered");
                    JobOutcome::Done
                }
                Err(e) => {
                    let reason = e.to_string();
                    logger.log_error(&reason);
                    status.failed(&reason).await;
                    JobOutcome::Failed {
                        stage: e.stage(),
                        reason,
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Mark a job the executor gave up on as failed and drop its input.
    pub async fn abandon(&self, job: &CutoutJob, attempt: u32, reason: &str) {
        let logger = JobLogger::new(job, attempt);
        let _cleanup = CleanupGuard::new(job.input_path());

        logger.log_error(&format!("abandoned: {}", reason));
        let mut status = StatusReporter::new(
            Arc::clone(&self.transport),
            job.chat_id,
            job.status_message_id,
            logger,
        );
        status.failed(reason).await;
    }

    async fn execute(
        &self,
        job: &CutoutJob,
        status: &mut StatusReporter,
        cleanup: &mut CleanupGuard,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        status.processing();

        let started = Instant::now();
        let result = self.backend.process(job.input_path(), job.input_kind).await?;
        metrics::record_backend_duration(self.backend.name(), started.elapsed().as_secs_f64());

        if let Some(path) = result.output.local_path() {
            cleanup.track(path);
        }
        logger.log_progress(&format!("{} result ready", result.kind));

        status.uploading().await;

        if result.kind == MediaKind::Animation && result.is_local_gif() {
            if let OutputRef::LocalPath(path) = &result.output {
                let report = self.compressor.shrink(path, self.gif_max_mb).await?;
                metrics::record_gif_compression(report.met_target);
                if !report.met_target {
                    logger.log_warning(&format!(
                        "GIF still {} bytes after {} passes, sending anyway",
                        report.final_size, report.attempts
                    ));
                }
            }
        }

        self.deliver(job, &result).await
    }

    async fn deliver(&self, job: &CutoutJob, result: &MediaResult) -> WorkerResult<()> {
        let payload = match &result.output {
            OutputRef::Url(url) => MediaPayload::Url(url.clone()),
            OutputRef::LocalPath(path) => MediaPayload::File(path.clone()),
        };

        match result.kind {
            MediaKind::Video => self.transport.send_video(job.chat_id, payload).await?,
            MediaKind::Animation => self.transport.send_animation(job.chat_id, payload).await?,
        }

        Ok(())
    }
}
