//! The queue seam.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueResult;
use crate::job::{ClaimOutcome, Delivery, QueueJob};

/// Durable, at-least-once FIFO of jobs keyed by job id.
///
/// - `enqueue` accepts each job id once; a repeat is `QueueError::Duplicate`.
/// - A delivery that is not acked within the job's timeout becomes
///   claimable by any consumer through `claim_expired`, with its attempt
///   incremented. Past the configured delivery limit the job is moved to
///   the dead-letter stream instead.
/// - Acked and dead-lettered jobs never come back.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job, returning its job id.
    async fn enqueue(&self, job: QueueJob) -> QueueResult<String>;

    /// Wait up to `block` for new jobs and take at most `count` of them.
    async fn consume(
        &self,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Take over deliveries whose visibility timeout has passed.
    async fn claim_expired(&self, consumer: &str, count: usize) -> QueueResult<ClaimOutcome>;

    /// Mark a delivery as finished.
    async fn ack(&self, delivery_id: &str) -> QueueResult<()>;

    /// Move a delivery to the dead-letter stream and ack it.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> QueueResult<()>;

    /// Jobs waiting or in flight.
    async fn len(&self) -> QueueResult<u64>;

    /// Jobs in the dead-letter stream.
    async fn dlq_len(&self) -> QueueResult<u64>;

    /// Configured delivery limit.
    fn max_deliveries(&self) -> u32;
}
