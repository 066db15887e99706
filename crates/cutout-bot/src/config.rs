//! Bot configuration.

use std::path::PathBuf;
use std::time::Duration;

use cutout_models::DEFAULT_JOB_TIMEOUT_SECS;

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Largest accepted upload, in MB
    pub max_file_mb: f64,
    /// Where inputs are downloaded before enqueue
    pub staging_dir: PathBuf,
    /// Hard cap stamped on every job
    pub job_timeout: Duration,
    /// Long-poll wait per update request
    pub poll_timeout: Duration,
    /// How long shutdown waits for intakes still running
    pub shutdown_timeout: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            max_file_mb: 50.0,
            staging_dir: std::env::temp_dir(),
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            poll_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl BotConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_file_mb: std::env::var("MAX_FILE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|mb: &f64| *mb > 0.0)
                .unwrap_or(defaults.max_file_mb),
            staging_dir: std::env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_dir),
            job_timeout: std::env::var("JOB_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            poll_timeout: std::env::var("BOT_POLL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_timeout),
            shutdown_timeout: std::env::var("BOT_SHUTDOWN_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
        }
    }
}
