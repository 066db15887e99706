//! Job executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use cutout_queue::{Delivery, JobQueue, QueueJob};

use crate::config::WorkerConfig;
use crate::dispatcher::{Dispatcher, JobOutcome};
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::retry::{retry_async, FailureTracker, RetryConfig};

/// Text shown to the user when a job is killed or runs out of deliveries.
const TIMED_OUT: &str = "timed out";

const CONSUME_ERROR_BACKOFF: Duration = Duration::from_secs(5);
const MAX_LOGGED_FAILURES: u32 = 3;
/// `tokio::time::interval` panics on zero.
const MIN_CLAIM_INTERVAL: Duration = Duration::from_millis(10);

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<dyn JobQueue>,
    dispatcher: Arc<Dispatcher>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: Arc<dyn JobQueue>, dispatcher: Arc<Dispatcher>) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue,
            dispatcher,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Consume until [`JobExecutor::shutdown`] is called, then wait for
    /// in-flight jobs up to the shutdown timeout.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        let claim_task = tokio::spawn(Self::claim_loop(
            Arc::clone(&self.queue),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.job_semaphore),
            self.consumer_name.clone(),
            self.config.claim_interval,
            self.shutdown.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut failures = FailureTracker::new(MAX_LOGGED_FAILURES);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    match result {
                        Ok(()) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                error!("Error consuming jobs: {}", e);
                            }
                            tokio::time::sleep(CONSUME_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "Shutdown timeout of {:?} reached with jobs still running",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .queue
            .consume(&self.consumer_name, self.config.consume_block, available.min(5))
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", deliveries.len());

        for delivery in deliveries {
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::config_error("job semaphore closed"))?;

            tokio::spawn(Self::execute_job(
                Arc::clone(&self.dispatcher),
                Arc::clone(&self.queue),
                delivery,
                permit,
            ));
        }

        Ok(())
    }

    /// Periodically take over deliveries whose visibility timeout passed.
    async fn claim_loop(
        queue: Arc<dyn JobQueue>,
        dispatcher: Arc<Dispatcher>,
        semaphore: Arc<Semaphore>,
        consumer_name: String,
        interval: Duration,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(interval.max(MIN_CLAIM_INTERVAL));
        let mut failures = FailureTracker::new(MAX_LOGGED_FAILURES);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let outcome = match queue.claim_expired(&consumer_name, 5).await {
                        Ok(outcome) => {
                            failures.record_success();
                            outcome
                        }
                        Err(e) => {
                            if failures.record_failure() {
                                warn!("Failed to claim expired jobs: {}", e);
                            }
                            continue;
                        }
                    };

                    for delivery in outcome.dead_lettered {
                        metrics::record_job_dead_lettered("deliveries_exhausted");
                        let QueueJob::RemoveBackground(job) = &delivery.job;
                        dispatcher.abandon(job, delivery.attempt, TIMED_OUT).await;
                    }

                    if !outcome.redelivered.is_empty() {
                        info!("Claimed {} expired jobs", outcome.redelivered.len());
                    }
                    for delivery in outcome.redelivered {
                        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                            break;
                        };
                        tokio::spawn(Self::execute_job(
                            Arc::clone(&dispatcher),
                            Arc::clone(&queue),
                            delivery,
                            permit,
                        ));
                    }
                }
            }
        }
    }

    /// Run one delivery under its job's timeout, then ack or dead-letter.
    async fn execute_job(
        dispatcher: Arc<Dispatcher>,
        queue: Arc<dyn JobQueue>,
        delivery: Delivery,
        _permit: OwnedSemaphorePermit,
    ) {
        let QueueJob::RemoveBackground(job) = &delivery.job;
        let job_id = job.job_id.to_string();
        info!("Executing job {} (attempt {})", job_id, delivery.attempt);
        metrics::record_job_started(delivery.attempt);

        let started = Instant::now();
        let result = tokio::time::timeout(job.timeout(), dispatcher.run(job, delivery.attempt)).await;

        match result {
            Ok(outcome) => {
                match outcome {
                    JobOutcome::Done => {
                        metrics::record_job_completed(started.elapsed().as_secs_f64());
                    }
                    JobOutcome::Failed { stage, .. } => metrics::record_job_failed(stage),
                }

                let retry = RetryConfig::new("ack");
                if let Err(e) = retry_async(&retry, || queue.ack(&delivery.id)).await {
                    error!("Failed to ack job {}: {}", job_id, e);
                }
            }
            Err(_) => {
                warn!(
                    "Job {} exceeded its timeout of {:?}, moving to DLQ",
                    job_id,
                    job.timeout()
                );
                metrics::record_job_dead_lettered("timeout");
                dispatcher.abandon(job, delivery.attempt, TIMED_OUT).await;

                let reason = format!("timed out after {}s", job.timeout_secs);
                let retry = RetryConfig::new("dead_letter");
                if let Err(e) = retry_async(&retry, || queue.dead_letter(&delivery, &reason)).await
                {
                    error!("Failed to move job {} to DLQ: {}", job_id, e);
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
