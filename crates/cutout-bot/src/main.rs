//! Chat front end binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cutout_bot::{Bot, BotConfig, IntakeValidator};
use cutout_queue::RedisQueue;
use cutout_telegram::TelegramClient;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Failed to install rustls crypto provider");
        std::process::exit(1);
    }

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

    info!("Starting cutout-bot");

    let config = BotConfig::from_env();
    info!(
        "Bot config: max_file_mb={}, staging_dir={}",
        config.max_file_mb,
        config.staging_dir.display()
    );

    if let Err(e) = tokio::fs::create_dir_all(&config.staging_dir).await {
        error!(
            "Failed to create staging dir {}: {}",
            config.staging_dir.display(),
            e
        );
        std::process::exit(1);
    }

    let client = match TelegramClient::from_env() {
        Ok(c) => Arc::new(c),
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

    let intake = Arc::new(IntakeValidator::new(
        client.clone(),
        Arc::new(queue),
        config,
    ));
    let bot = Arc::new(Bot::new(client.clone(), client, intake));

    let shutdown_handle = tokio::spawn({
        let bot = Arc::clone(&bot);
        async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
            bot.shutdown();
        }
    });

    bot.run().await;

    shutdown_handle.abort();
    info!("Bot shutdown complete");
}
