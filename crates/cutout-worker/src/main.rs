//! Background-removal worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cutout_matting::{build_backend, MattingConfig};
use cutout_media::FfmpegGifEncoder;
use cutout_queue::RedisQueue;
use cutout_telegram::TelegramClient;
use cutout_worker::metrics::init_metrics;
use cutout_worker::{Dispatcher, JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Failed to install rustls crypto provider");
        std::process::exit(1);
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cutout=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting cutout-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Err(e) = tokio::fs::create_dir_all(&config.work_dir).await {
        error!("Failed to create work dir {}: {}", config.work_dir.display(), e);
        std::process::exit(1);
    }

    if let Some(addr) = config.metrics_addr {
        match init_metrics(addr) {
            Ok(()) => info!("Serving metrics on {}", addr),
            Err(e) => warn!("Failed to start metrics exporter: {}", e),
        }
    }

    let mut matting = match MattingConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid backend configuration: {}", e);
            std::process::exit(1);
        }
    };
    matting.local.output_dir = config.work_dir.clone();

    let backend = match build_backend(&matting) {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to create matting backend: {}", e);
            std::process::exit(1);
        }
    };
    info!("Using {} backend", backend.name());

    let transport = match TelegramClient::from_env() {
        Ok(t) => Arc::new(t),
        Err(e) => {
            error!("Failed to create Telegram client: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match RedisQueue::from_env().await {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = queue.init().await {
        error!("Failed to initialize job queue: {}", e);
        std::process::exit(1);
    }

    let dispatcher = Dispatcher::new(
        backend,
        transport,
        Arc::new(FfmpegGifEncoder::default()),
        config.gif_max_mb,
    );
    let executor = Arc::new(JobExecutor::new(
        config,
        Arc::new(queue),
        Arc::new(dispatcher),
    ));

    let shutdown_handle = tokio::spawn({
        let executor = Arc::clone(&executor);
        async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
            executor.shutdown();
        }
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    shutdown_handle.abort();
    info!("Worker shutdown complete");
}
