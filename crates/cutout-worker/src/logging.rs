//! Structured job logging.

use tracing::{error, info, warn, Span};

use cutout_models::{ChatId, CutoutJob};

/// Logger carrying the job's identifying fields on every event.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    chat_id: ChatId,
    attempt: u32,
}

impl JobLogger {
    pub fn new(job: &CutoutJob, attempt: u32) -> Self {
        Self {
            job_id: job.job_id.to_string(),
            chat_id: job.chat_id,
            attempt,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            chat_id = %self.chat_id,
            attempt = self.attempt,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            chat_id = %self.chat_id,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            chat_id = %self.chat_id,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            chat_id = %self.chat_id,
            attempt = self.attempt,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            chat_id = %self.chat_id,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Span for everything one job does, including backend and transport
    /// events emitted from other crates.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            chat_id = %self.chat_id,
            attempt = self.attempt
        )
    }
}
