//! In-process queue with the same delivery policy as the Redis one.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_DEDUP_TTL, DEFAULT_VISIBILITY_GRACE};
use crate::error::{QueueError, QueueResult};
use crate::job::{ClaimOutcome, Delivery, QueueJob};
use crate::queue::JobQueue;

#[derive(Debug)]
struct InFlight {
    job: QueueJob,
    deliveries: u32,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    ready: VecDeque<(String, QueueJob)>,
    in_flight: HashMap<String, InFlight>,
    /// Ids in delivery order, so claims stay FIFO
    in_flight_order: VecDeque<String>,
    /// Reserved job ids and when each reservation lapses
    seen: HashMap<String, Instant>,
    dead: Vec<(QueueJob, String)>,
}

/// Queue held in memory. Lost on restart.
#[derive(Debug)]
pub struct MemoryQueue {
    state: Mutex<State>,
    notify: Notify,
    max_deliveries: u32,
    visibility_grace: Duration,
    dedup_ttl: Duration,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(2)
    }
}

impl MemoryQueue {
    pub fn new(max_deliveries: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            max_deliveries: max_deliveries.max(1),
            visibility_grace: DEFAULT_VISIBILITY_GRACE,
            dedup_ttl: DEFAULT_DEDUP_TTL,
        }
    }

    /// Extra time past the job timeout before a delivery is reclaimable.
    pub fn with_visibility_grace(mut self, grace: Duration) -> Self {
        self.visibility_grace = grace;
        self
    }

    /// How long a job id stays reserved after enqueue.
    pub fn with_dedup_ttl(mut self, ttl: Duration) -> Self {
        self.dedup_ttl = ttl;
        self
    }

    fn visibility(&self, job: &QueueJob) -> Duration {
        job.timeout() + self.visibility_grace
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave the state half-updated.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Dead-lettered jobs with their reasons.
    pub fn dead_letters(&self) -> Vec<(QueueJob, String)> {
        self.lock().dead.clone()
    }

    fn take_ready(&self, count: usize) -> Vec<Delivery> {
        let mut state = self.lock();
        let mut out = Vec::new();

        while out.len() < count {
            let Some((id, job)) = state.ready.pop_front() else {
                break;
            };
            let deadline = Instant::now() + self.visibility(&job);
            state.in_flight.insert(
                id.clone(),
                InFlight {
                    job: job.clone(),
                    deliveries: 1,
                    deadline,
                },
            );
            state.in_flight_order.push_back(id.clone());
            out.push(Delivery {
                id,
                job,
                attempt: 1,
            });
        }

        out
    }

    fn remove_in_flight(state: &mut State, id: &str) -> Option<InFlight> {
        let entry = state.in_flight.remove(id)?;
        state.in_flight_order.retain(|other| other != id);
        Some(entry)
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: QueueJob) -> QueueResult<String> {
        let job_id = job.job_id().to_string();
        {
            let mut state = self.lock();
            let now = Instant::now();
            state.seen.retain(|_, expires| *expires > now);
            if state.seen.contains_key(&job_id) {
                warn!("Duplicate job rejected: {}", job_id);
                return Err(QueueError::Duplicate(job_id));
            }
            state.seen.insert(job_id.clone(), now + self.dedup_ttl);
            state.next_id += 1;
            let id = format!("mem-{}", state.next_id);
            state.ready.push_back((id, job));
        }
        self.notify.notify_one();

        info!("Enqueued job {}", job_id);
        Ok(job_id)
    }

    async fn consume(
        &self,
        _consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let deadline = Instant::now() + block;

        loop {
            // Register interest before checking, so an enqueue in between
            // is not missed.
            let notified = self.notify.notified();

            let batch = self.take_ready(count);
            if !batch.is_empty() {
                return Ok(batch);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn claim_expired(&self, _consumer: &str, count: usize) -> QueueResult<ClaimOutcome> {
        let now = Instant::now();
        let grace = self.visibility_grace;
        let mut outcome = ClaimOutcome::default();
        let mut state = self.lock();

        let expired: Vec<String> = state
            .in_flight_order
            .iter()
            .filter(|id| state.in_flight.get(*id).is_some_and(|e| e.deadline <= now))
            .take(count)
            .cloned()
            .collect();

        for id in expired {
            let Some(entry) = state.in_flight.get_mut(&id) else {
                continue;
            };
            let attempt = entry.deliveries + 1;

            if attempt > self.max_deliveries {
                let delivery = Delivery {
                    id: id.clone(),
                    job: entry.job.clone(),
                    attempt: entry.deliveries,
                };
                Self::remove_in_flight(&mut state, &id);
                let reason = format!("not acknowledged after {} deliveries", delivery.attempt);
                warn!("Moved job {} to DLQ: {}", delivery.job.job_id(), reason);
                state.dead.push((delivery.job.clone(), reason));
                outcome.dead_lettered.push(delivery);
            } else {
                entry.deliveries = attempt;
                entry.deadline = now + entry.job.timeout() + grace;
                debug!("Re-delivering job {} (attempt {})", entry.job.job_id(), attempt);
                outcome.redelivered.push(Delivery {
                    id: id.clone(),
                    job: entry.job.clone(),
                    attempt,
                });
            }
        }

        Ok(outcome)
    }

    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        let mut state = self.lock();
        Self::remove_in_flight(&mut state, delivery_id)
            .map(|_| ())
            .ok_or_else(|| QueueError::DeliveryNotFound(delivery_id.to_string()))
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> QueueResult<()> {
        let mut state = self.lock();
        Self::remove_in_flight(&mut state, &delivery.id)
            .ok_or_else(|| QueueError::DeliveryNotFound(delivery.id.clone()))?;
        state.dead.push((delivery.job.clone(), reason.to_string()));

        warn!("Moved job {} to DLQ: {}", delivery.job.job_id(), reason);
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let state = self.lock();
        Ok((state.ready.len() + state.in_flight.len()) as u64)
    }

    async fn dlq_len(&self) -> QueueResult<u64> {
        Ok(self.lock().dead.len() as u64)
    }

    fn max_deliveries(&self) -> u32 {
        self.max_deliveries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutout_models::{ChatId, CutoutJob, MediaKind, MessageId};
    use std::sync::Arc;

    fn strict(max_deliveries: u32) -> MemoryQueue {
        MemoryQueue::new(max_deliveries).with_visibility_grace(Duration::ZERO)
    }

    fn job(timeout_secs: u64) -> QueueJob {
        CutoutJob::new(ChatId(1), MessageId(10), "/tmp/in.mp4", MediaKind::Video)
            .with_timeout(Duration::from_secs(timeout_secs))
            .into()
    }

    const BLOCK: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_fifo_delivery() {
        let queue = MemoryQueue::default();
        let first = job(60);
        let second = job(60);
        queue.enqueue(first.clone()).await.unwrap();
        queue.enqueue(second.clone()).await.unwrap();

        let batch = queue.consume("w1", BLOCK, 10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].job, first);
        assert_eq!(batch[1].job, second);
        assert!(batch.iter().all(|d| d.attempt == 1));
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_rejected() {
        let queue = MemoryQueue::default();
        let j = job(60);
        queue.enqueue(j.clone()).await.unwrap();

        let err = queue.enqueue(j).await.unwrap_err();
        assert!(matches!(err, QueueError::Duplicate(_)));
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dedup_reservation_lapses() {
        let queue = MemoryQueue::default().with_dedup_ttl(Duration::from_secs(60));
        let j = job(60);
        queue.enqueue(j.clone()).await.unwrap();
        let delivery = queue.consume("w1", BLOCK, 1).await.unwrap().remove(0);
        queue.ack(&delivery.id).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(matches!(
            queue.enqueue(j.clone()).await,
            Err(QueueError::Duplicate(_))
        ));

        tokio::time::advance(Duration::from_secs(2)).await;
        queue.enqueue(j.clone()).await.unwrap();
        // Only the fresh reservation is left.
        assert_eq!(queue.lock().seen.len(), 1);
    }

    #[tokio::test]
    async fn test_consume_times_out_when_empty() {
        let queue = MemoryQueue::default();
        assert!(queue.consume("w1", BLOCK, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_consume_wakes_on_enqueue() {
        let queue = Arc::new(MemoryQueue::default());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.consume("w1", Duration::from_secs(5), 1).await })
        };

        tokio::task::yield_now().await;
        queue.enqueue(job(60)).await.unwrap();

        let batch = consumer.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_acked_jobs_never_return() {
        let queue = strict(2);
        queue.enqueue(job(1)).await.unwrap();
        let delivery = queue.consume("w1", BLOCK, 1).await.unwrap().remove(0);
        queue.ack(&delivery.id).await.unwrap();

        tokio::time::pause();
        tokio::time::advance(Duration::from_secs(5)).await;

        assert!(queue.claim_expired("w2", 10).await.unwrap().is_empty());
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacked_delivery_is_redelivered_after_timeout() {
        let queue = strict(2);
        queue.enqueue(job(30)).await.unwrap();
        let first = queue.consume("w1", BLOCK, 1).await.unwrap().remove(0);

        // Still within the visibility timeout.
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(queue.claim_expired("w2", 10).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(21)).await;
        let outcome = queue.claim_expired("w2", 10).await.unwrap();
        assert_eq!(outcome.redelivered.len(), 1);
        assert!(outcome.dead_lettered.is_empty());

        let again = &outcome.redelivered[0];
        assert_eq!(again.id, first.id);
        assert_eq!(again.attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_job_is_dead_lettered() {
        let queue = strict(2);
        queue.enqueue(job(30)).await.unwrap();
        queue.consume("w1", BLOCK, 1).await.unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;
        let outcome = queue.claim_expired("w2", 10).await.unwrap();
        assert_eq!(outcome.redelivered.len(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let outcome = queue.claim_expired("w3", 10).await.unwrap();
        assert!(outcome.redelivered.is_empty());
        assert_eq!(outcome.dead_lettered.len(), 1);

        assert_eq!(queue.dlq_len().await.unwrap(), 1);
        assert_eq!(queue.len().await.unwrap(), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(queue.claim_expired("w4", 10).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_delays_reclaim() {
        let queue = MemoryQueue::new(2).with_visibility_grace(Duration::from_secs(30));
        queue.enqueue(job(30)).await.unwrap();
        queue.consume("w1", BLOCK, 1).await.unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(queue.claim_expired("w2", 10).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(16)).await;
        assert_eq!(queue.claim_expired("w2", 10).await.unwrap().redelivered.len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_dead_letter() {
        let queue = MemoryQueue::default();
        queue.enqueue(job(60)).await.unwrap();
        let delivery = queue.consume("w1", BLOCK, 1).await.unwrap().remove(0);

        queue.dead_letter(&delivery, "timed out").await.unwrap();

        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].1, "timed out");
        assert!(matches!(
            queue.ack(&delivery.id).await,
            Err(QueueError::DeliveryNotFound(_))
        ));
    }
}
