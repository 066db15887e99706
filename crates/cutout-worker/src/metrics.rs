//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "cutout_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "cutout_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "cutout_jobs_failed_total";
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "cutout_jobs_dead_lettered_total";
    pub const JOB_DURATION_SECONDS: &str = "cutout_job_duration_seconds";
    pub const BACKEND_DURATION_SECONDS: &str = "cutout_backend_duration_seconds";
    pub const GIF_COMPRESSIONS_TOTAL: &str = "cutout_gif_compressions_total";
}

pub fn record_job_started(attempt: u32) {
    let labels = [("redelivered", (attempt > 1).to_string())];
    counter!(names::JOBS_STARTED_TOTAL, &labels).increment(1);
}

pub fn record_job_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS).record(duration_secs);
}

pub fn record_job_failed(stage: &str) {
    let labels = [("stage", stage.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_job_dead_lettered(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::JOBS_DEAD_LETTERED_TOTAL, &labels).increment(1);
}

pub fn record_backend_duration(backend: &str, duration_secs: f64) {
    let labels = [("backend", backend.to_string())];
    histogram!(names::BACKEND_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_gif_compression(met_target: bool) {
    let labels = [("met_target", met_target.to_string())];
    counter!(names::GIF_COMPRESSIONS_TOTAL, &labels).increment(1);
}
