//! Background-removal worker.
//!
//! This crate provides:
//! - The per-job dispatcher driving the status message state machine
//! - The executor consuming the queue with bounded concurrency
//! - Timeout enforcement, dead-lettering and reclaiming of expired jobs
//! - Temp file cleanup on every outcome
//! - Graceful shutdown

pub mod cleanup;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod retry;
pub mod status;

pub use config::WorkerConfig;
pub use dispatcher::{Dispatcher, JobOutcome};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
