//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Work directory for backend outputs and GIF re-encodes
    pub work_dir: PathBuf,
    /// How often the worker scans for expired deliveries
    pub claim_interval: Duration,
    /// How long one consume call blocks waiting for jobs
    pub consume_block: Duration,
    /// Size cap for animations before delivery
    pub gif_max_mb: f64,
    /// Prometheus listener; metrics are off when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            shutdown_timeout: Duration::from_secs(60),
            work_dir: std::env::temp_dir(),
            claim_interval: Duration::from_secs(30),
            consume_block: Duration::from_secs(1),
            gif_max_mb: 5.0,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            claim_interval: std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            consume_block: defaults.consume_block,
            gif_max_mb: std::env::var("GIF_MAX_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|mb: &f64| *mb > 0.0)
                .unwrap_or(defaults.gif_max_mb),
            metrics_addr: std::env::var("METRICS_ADDR")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}
