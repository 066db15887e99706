//! Job record handed from intake to the worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::{ChatId, MediaKind, MessageId};

/// Hard wall-clock cap for a single job (20 minutes).
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 20 * 60;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A background-removal job.
///
/// Created once by intake and read-only afterwards. The file at
/// `input_path` belongs to this job alone; the worker deletes it when the
/// job reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutoutJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Chat that receives status updates and the result
    pub chat_id: ChatId,
    /// The "in progress" message edited as the job advances
    pub status_message_id: MessageId,
    /// Staged local copy of the user's upload
    pub input_path: PathBuf,
    /// What the user sent
    #[serde(default)]
    pub input_kind: MediaKind,
    /// Hard cap in seconds, enforced by the queue/executor
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_JOB_TIMEOUT_SECS
}

impl CutoutJob {
    /// Create a new job with the default timeout.
    pub fn new(
        chat_id: ChatId,
        status_message_id: MessageId,
        input_path: impl Into<PathBuf>,
        input_kind: MediaKind,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            chat_id,
            status_message_id,
            input_path: input_path.into(),
            input_kind,
            timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            created_at: Utc::now(),
        }
    }

    /// Override the hard cap.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Hard cap as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("cutout:{}", self.job_id)
    }
}
