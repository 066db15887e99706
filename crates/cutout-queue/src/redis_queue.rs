//! Job queue on Redis Streams.
//!
//! Layout, for `QUEUE_NAME=bgremove`:
//! - `bgremove:jobs`: the stream, consumed through group `bgremove:workers`
//! - `bgremove:dlq`: dead-lettered jobs with the reason
//! - `bgremove:dedup:<job id>`: reserved on enqueue with `SET NX EX`
//!
//! Unacked entries stay in the group's pending list. `claim_expired` pages
//! through it and takes over entries idle for longer than their job's
//! timeout plus the configured grace.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamRangeReply, StreamReadReply,
};
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::job::{ClaimOutcome, Delivery, QueueJob};
use crate::queue::JobQueue;

/// Pending entries fetched per `XPENDING` round trip.
const PENDING_PAGE_SIZE: usize = 100;

/// Redis-backed queue. Build once per process and share.
pub struct RedisQueue {
    conn: MultiplexedConnection,
    /// Separate connection for `XREADGROUP BLOCK`, which would otherwise
    /// stall every other command on `conn`.
    blocking: Mutex<MultiplexedConnection>,
    config: QueueConfig,
}

impl RedisQueue {
    /// Open the client, the shared connection and the blocking-read one.
    pub async fn connect(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let conn = open_connection(&client, &config).await?;
        let blocking = open_connection(&client, &config).await?;

        Ok(Self {
            conn,
            blocking: Mutex::new(blocking),
            config,
        })
    }

    /// Connect using environment variables.
    pub async fn from_env() -> QueueResult<Self> {
        Self::connect(QueueConfig::from_env()).await
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Create the consumer group if it does not exist.
    ///
    /// The group starts at the beginning of the stream so jobs enqueued
    /// before the first worker came up are not skipped.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let group = self.config.consumer_group();

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(self.config.stream_name())
            .arg(&group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Decode an entry; malformed entries are acked and dropped.
    async fn decode(&self, entry: &StreamId) -> Option<QueueJob> {
        let parsed = entry
            .get::<String>("job")
            .map(|payload| serde_json::from_str::<QueueJob>(&payload));

        match parsed {
            Some(Ok(job)) => Some(job),
            Some(Err(e)) => {
                warn!("Dropping malformed job payload {}: {}", entry.id, e);
                self.ack(&entry.id).await.ok();
                None
            }
            None => {
                warn!("Dropping entry {} without a job field", entry.id);
                self.ack(&entry.id).await.ok();
                None
            }
        }
    }
}

async fn open_connection(
    client: &redis::Client,
    config: &QueueConfig,
) -> QueueResult<MultiplexedConnection> {
    client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| QueueError::connection_failed(format!("{}: {}", config.redis_url, e)))
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: QueueJob) -> QueueResult<String> {
        let mut conn = self.conn.clone();
        let job_id = job.job_id().to_string();
        let payload = serde_json::to_string(&job)?;

        let reserved: Option<String> = redis::cmd("SET")
            .arg(self.config.dedup_key(&job_id))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs())
            .query_async(&mut conn)
            .await?;

        if reserved.is_none() {
            warn!("Duplicate job rejected: {}", job_id);
            return Err(QueueError::Duplicate(job_id));
        }

        let message_id: String = redis::cmd("XADD")
            .arg(self.config.stream_name())
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(job.idempotency_key())
            .query_async(&mut conn)
            .await?;

        info!("Enqueued job {} with message ID {}", job_id, message_id);
        Ok(job_id)
    }

    async fn consume(
        &self,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let reply: Option<StreamReadReply> = {
            let mut conn = self.blocking.lock().await;
            redis::cmd("XREADGROUP")
                .arg("GROUP")
                .arg(self.config.consumer_group())
                .arg(consumer)
                .arg("COUNT")
                .arg(count)
                .arg("BLOCK")
                .arg(block.as_millis() as u64)
                .arg("STREAMS")
                .arg(self.config.stream_name())
                .arg(">")
                .query_async(&mut *conn)
                .await?
        };

        let mut deliveries = Vec::new();

        for stream in reply.map(|r| r.keys).unwrap_or_default() {
            for entry in stream.ids {
                if let Some(job) = self.decode(&entry).await {
                    debug!("Consumed job {} from stream", job.job_id());
                    deliveries.push(Delivery {
                        id: entry.id,
                        job,
                        attempt: 1,
                    });
                }
            }
        }

        Ok(deliveries)
    }

    async fn claim_expired(&self, consumer: &str, count: usize) -> QueueResult<ClaimOutcome> {
        let mut conn = self.conn.clone();
        let stream = self.config.stream_name();
        let group = self.config.consumer_group();
        let mut outcome = ClaimOutcome::default();

        // Every candidate has been idle for at least the grace; the per-job
        // timeout is checked below once the payload is read.
        let min_idle_ms = self.config.visibility_grace.as_millis() as u64;
        let page_size = count.max(PENDING_PAGE_SIZE);
        let mut start = "-".to_string();

        'pages: loop {
            let page: StreamPendingCountReply = redis::cmd("XPENDING")
                .arg(&stream)
                .arg(&group)
                .arg("IDLE")
                .arg(min_idle_ms)
                .arg(&start)
                .arg("+")
                .arg(page_size)
                .query_async(&mut conn)
                .await?;

            let exhausted = page.ids.len() < page_size;
            if let Some(last) = page.ids.last() {
                start = format!("({}", last.id);
            }

            for entry in page.ids {
                if outcome.redelivered.len() + outcome.dead_lettered.len() >= count {
                    break 'pages;
                }

                let range: StreamRangeReply = conn.xrange(&stream, &entry.id, &entry.id).await?;

                let Some(stored) = range.ids.first() else {
                    // Deleted while pending; nothing left to run.
                    self.ack(&entry.id).await.ok();
                    continue;
                };
                let Some(job) = self.decode(stored).await else {
                    continue;
                };

                let visibility_ms =
                    (job.timeout() + self.config.visibility_grace).as_millis() as u64;
                if (entry.last_delivered_ms as u64) < visibility_ms {
                    continue;
                }

                // The idle guard makes a concurrent claim by another worker lose.
                let claimed: StreamClaimReply = redis::cmd("XCLAIM")
                    .arg(&stream)
                    .arg(&group)
                    .arg(consumer)
                    .arg(visibility_ms)
                    .arg(&entry.id)
                    .query_async(&mut conn)
                    .await?;

                if claimed.ids.is_empty() {
                    continue;
                }

                let previous = entry.times_delivered as u32;
                if previous >= self.config.max_deliveries {
                    let delivery = Delivery {
                        id: entry.id.clone(),
                        job,
                        attempt: previous,
                    };
                    let reason = format!("not acknowledged after {} deliveries", previous);
                    self.dead_letter(&delivery, &reason).await?;
                    outcome.dead_lettered.push(delivery);
                } else {
                    info!(
                        "Claimed pending job {} (attempt {})",
                        job.job_id(),
                        previous + 1
                    );
                    outcome.redelivered.push(Delivery {
                        id: entry.id.clone(),
                        job,
                        attempt: previous + 1,
                    });
                }
            }

            if exhausted {
                break;
            }
        }

        Ok(outcome)
    }

    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let stream = self.config.stream_name();

        redis::cmd("XACK")
            .arg(&stream)
            .arg(self.config.consumer_group())
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&stream)
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged job: {}", delivery_id);
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&delivery.job)?;

        redis::cmd("XADD")
            .arg(self.config.dlq_stream_name())
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(reason)
            .arg("original_id")
            .arg(&delivery.id)
            .arg("attempt")
            .arg(delivery.attempt)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(&delivery.id).await?;

        warn!("Moved job {} to DLQ: {}", delivery.job.job_id(), reason);
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.xlen(self.config.stream_name()).await?;
        Ok(len)
    }

    async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.xlen(self.config.dlq_stream_name()).await?;
        Ok(len)
    }

    fn max_deliveries(&self) -> u32 {
        self.config.max_deliveries
    }
}
