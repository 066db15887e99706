//! Job queue for background-removal work.
//!
//! This crate provides:
//! - The `JobQueue` seam used by the bot (enqueue) and the worker (consume)
//! - A durable implementation on Redis Streams consumer groups
//! - An in-process implementation with the same delivery policy
//! - Dead-lettering of jobs that exhaust their deliveries

pub mod config;
pub mod error;
pub mod job;
pub mod memory;
pub mod queue;
pub mod redis_queue;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use job::{ClaimOutcome, Delivery, QueueJob};
pub use memory::MemoryQueue;
pub use queue::JobQueue;
pub use redis_queue::RedisQueue;
