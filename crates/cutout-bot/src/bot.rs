//! Update loop: long-poll the transport and handle each update on its own
//! task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use cutout_telegram::{ChatTransport, InboundContent, InboundUpdate, UpdateSource};

use crate::intake::IntakeValidator;

pub const GREETING: &str = "Send me a GIF or MP4 and I'll remove the background.";
pub const HINT: &str = "Send a GIF or MP4.";

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Chat front end.
pub struct Bot {
    source: Arc<dyn UpdateSource>,
    transport: Arc<dyn ChatTransport>,
    intake: Arc<IntakeValidator>,
    shutdown: watch::Sender<bool>,
}

impl Bot {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        transport: Arc<dyn ChatTransport>,
        intake: Arc<IntakeValidator>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            source,
            transport,
            intake,
            shutdown,
        }
    }

    /// Poll until [`Bot::shutdown`] is called, then wait for in-flight
    /// intakes up to the shutdown timeout.
    pub async fn run(&self) {
        let poll_timeout = self.intake.config().poll_timeout;
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut offset = None;
        let mut tasks = JoinSet::new();

        info!("Polling for updates");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            // Reap finished intakes so the set stays small.
            while tasks.try_join_next().is_some() {}

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping bot");
                        break;
                    }
                }
                result = self.source.poll_updates(offset, poll_timeout) => {
                    match result {
                        Ok(batch) => {
                            offset = batch.next_offset().or(offset);
                            for update in batch.updates {
                                tasks.spawn(handle_update(
                                    Arc::clone(&self.transport),
                                    Arc::clone(&self.intake),
                                    update,
                                ));
                            }
                        }
                        Err(e) => {
                            error!("Failed to poll updates: {}", e);
                            tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }

        if !tasks.is_empty() {
            info!("Waiting for {} in-flight updates...", tasks.len());
        }
        let shutdown_timeout = self.intake.config().shutdown_timeout;
        let drain = async { while tasks.join_next().await.is_some() {} };
        if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
            warn!(
                "Shutdown timeout of {:?} reached with updates still in flight",
                shutdown_timeout
            );
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Answer one update.
pub async fn handle_update(
    transport: Arc<dyn ChatTransport>,
    intake: Arc<IntakeValidator>,
    update: InboundUpdate,
) {
    let reply = match &update.content {
        InboundContent::Command(command) if command == "start" => Some(GREETING.to_string()),
        InboundContent::Command(_) | InboundContent::Other => Some(HINT.to_string()),
        InboundContent::Media(media) => match intake.admit(media).await {
            Ok(admission) => {
                debug!("Job {} queued", admission.job_id);
                None
            }
            Err(e) if e.is_rejection() => {
                info!("Rejected upload from chat {}: {}", update.chat_id, e);
                e.reply_text()
            }
            Err(e) => {
                error!("Intake failed for chat {}: {}", update.chat_id, e);
                e.reply_text()
            }
        },
    };

    if let Some(text) = reply {
        if let Err(e) = transport.post_message(update.chat_id, &text).await {
            warn!("Failed to reply in chat {}: {}", update.chat_id, e);
        }
    }
}
