//! Queue payloads and deliveries.

use std::time::Duration;

use cutout_models::{CutoutJob, JobId};
use serde::{Deserialize, Serialize};

/// Job enum for the queue. The tag names the function the worker runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Remove the background of one staged upload
    RemoveBackground(CutoutJob),
}

impl QueueJob {
    /// Get the job ID.
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::RemoveBackground(j) => &j.job_id,
        }
    }

    /// Get the idempotency key.
    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::RemoveBackground(j) => j.idempotency_key(),
        }
    }

    /// Visibility timeout: how long a delivery may stay unacknowledged.
    pub fn timeout(&self) -> Duration {
        match self {
            QueueJob::RemoveBackground(j) => j.timeout(),
        }
    }
}

impl From<CutoutJob> for QueueJob {
    fn from(job: CutoutJob) -> Self {
        QueueJob::RemoveBackground(job)
    }
}

/// One hand-out of a job to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Queue-assigned id, used to ack or dead-letter
    pub id: String,
    pub job: QueueJob,
    /// 1 on first delivery, incremented on each re-delivery
    pub attempt: u32,
}

/// Result of reclaiming expired deliveries.
#[derive(Debug, Default)]
pub struct ClaimOutcome {
    /// Handed out again to the claiming consumer
    pub redelivered: Vec<Delivery>,
    /// Out of deliveries; already moved to the dead-letter stream
    pub dead_lettered: Vec<Delivery>,
}

impl ClaimOutcome {
    pub fn is_empty(&self) -> bool {
        self.redelivered.is_empty() && self.dead_lettered.is_empty()
    }
}
