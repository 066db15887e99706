//! Queue configuration.

use std::time::Duration;

/// Extra time past a job's timeout before its delivery may be reclaimed,
/// so the owning executor's own timeout fires first.
pub const DEFAULT_VISIBILITY_GRACE: Duration = Duration::from_secs(30);

/// How long a job id stays reserved after enqueue.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(24 * 3600);

/// Queue configuration. Every Redis key derives from `queue_name`.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Base name for the stream, group, DLQ and dedup keys
    pub queue_name: String,
    /// Deliveries allowed per job before it is dead-lettered
    pub max_deliveries: u32,
    /// How long a job id stays reserved after enqueue
    pub dedup_ttl: Duration,
    /// Added to the job timeout to get the visibility timeout
    pub visibility_grace: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://redis:6379/0".to_string(),
            queue_name: "bgremove".to_string(),
            max_deliveries: 2,
            dedup_ttl: DEFAULT_DEDUP_TTL,
            visibility_grace: DEFAULT_VISIBILITY_GRACE,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            queue_name: std::env::var("QUEUE_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.queue_name),
            max_deliveries: std::env::var("QUEUE_MAX_DELIVERIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n >= 1)
                .unwrap_or(defaults.max_deliveries),
            dedup_ttl: defaults.dedup_ttl,
            visibility_grace: std::env::var("QUEUE_VISIBILITY_GRACE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_grace),
        }
    }

    pub fn stream_name(&self) -> String {
        format!("{}:jobs", self.queue_name)
    }

    pub fn consumer_group(&self) -> String {
        format!("{}:workers", self.queue_name)
    }

    pub fn dlq_stream_name(&self) -> String {
        format!("{}:dlq", self.queue_name)
    }

    pub fn dedup_key(&self, job_id: &str) -> String {
        format!("{}:dedup:{}", self.queue_name, job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name(), "bgremove:jobs");
        assert_eq!(config.consumer_group(), "bgremove:workers");
        assert_eq!(config.dlq_stream_name(), "bgremove:dlq");
        assert_eq!(config.dedup_key("abc"), "bgremove:dedup:abc");
    }
}
