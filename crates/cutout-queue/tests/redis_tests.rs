//! Redis queue integration tests.

use std::time::Duration;

use cutout_models::{ChatId, CutoutJob, MediaKind, MessageId};
use cutout_queue::{JobQueue, QueueConfig, QueueError, QueueJob, RedisQueue};

/// Queue on a throwaway name so runs do not see each other's jobs.
async fn queue(max_deliveries: u32) -> RedisQueue {
    dotenvy::dotenv().ok();

    let config = QueueConfig {
        queue_name: format!("cutout-test-{}", uuid_suffix()),
        max_deliveries,
        visibility_grace: Duration::ZERO,
        ..QueueConfig::from_env()
    };
    let queue = RedisQueue::connect(config).await.expect("Failed to connect");
    queue.init().await.expect("Failed to initialize queue");
    queue
}

fn uuid_suffix() -> String {
    cutout_models::JobId::new().to_string()
}

fn job(timeout_secs: u64) -> QueueJob {
    CutoutJob::new(ChatId(1), MessageId(2), "/tmp/in.mp4", MediaKind::Video)
        .with_timeout(Duration::from_secs(timeout_secs))
        .into()
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_consume_ack() {
    let queue = queue(2).await;
    let job = job(60);
    let job_id = queue.enqueue(job.clone()).await.expect("Failed to enqueue");
    assert_eq!(job_id, job.job_id().to_string());

    let deliveries = queue
        .consume("test-consumer", Duration::from_secs(1), 1)
        .await
        .expect("Failed to consume");
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].job, job);
    assert_eq!(deliveries[0].attempt, 1);

    queue.ack(&deliveries[0].id).await.expect("Failed to ack");
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_duplicate_rejected() {
    let queue = queue(2).await;
    let job = job(60);
    queue.enqueue(job.clone()).await.unwrap();

    assert!(matches!(
        queue.enqueue(job).await,
        Err(QueueError::Duplicate(_))
    ));
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_expired_delivery_is_reclaimed_then_dead_lettered() {
    let queue = queue(2).await;
    queue.enqueue(job(1)).await.unwrap();

    let first = queue
        .consume("crashed-worker", Duration::from_secs(1), 1)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let outcome = queue.claim_expired("rescuer", 10).await.unwrap();
    assert_eq!(outcome.redelivered.len(), 1);
    assert_eq!(outcome.redelivered[0].attempt, 2);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let outcome = queue.claim_expired("rescuer", 10).await.unwrap();
    assert!(outcome.redelivered.is_empty());
    assert_eq!(outcome.dead_lettered.len(), 1);
    assert_eq!(queue.dlq_len().await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_expired_delivery_behind_live_ones_is_reclaimed() {
    let queue = queue(3).await;
    for _ in 0..3 {
        queue.enqueue(job(600)).await.unwrap();
    }
    let live = queue
        .consume("busy-worker", Duration::from_secs(1), 3)
        .await
        .unwrap();
    assert_eq!(live.len(), 3);

    let short = job(1);
    queue.enqueue(short.clone()).await.unwrap();
    let crashed = queue
        .consume("crashed-worker", Duration::from_secs(1), 1)
        .await
        .unwrap();
    assert_eq!(crashed.len(), 1);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    // The three live entries come first in the pending list.
    let outcome = queue.claim_expired("rescuer", 1).await.unwrap();
    assert_eq!(outcome.redelivered.len(), 1);
    assert_eq!(outcome.redelivered[0].job, short);
    assert!(outcome.dead_lettered.is_empty());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_blocking_consume_does_not_stall_other_commands() {
    let queue = std::sync::Arc::new(queue(2).await);

    let reader = tokio::spawn({
        let queue = queue.clone();
        async move { queue.consume("idle-worker", Duration::from_secs(2), 1).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Served while the read above is still parked on the server.
    let len = tokio::time::timeout(Duration::from_millis(500), queue.len())
        .await
        .expect("len stalled behind the blocking read")
        .unwrap();
    assert_eq!(len, 0);

    assert!(reader.await.unwrap().unwrap().is_empty());
}
