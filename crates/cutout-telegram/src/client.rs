//! Telegram Bot API HTTP client.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use cutout_models::{ChatId, MediaKind, MessageId};

use crate::error::{TransportError, TransportResult};
use crate::transport::{ChatTransport, UpdateSource};
use crate::types::{InboundContent, InboundMedia, InboundUpdate, MediaPayload, UpdateBatch};

/// Configuration for the Telegram client.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token from BotFather
    pub token: String,
    /// API base URL
    pub api_url: String,
    /// Timeout for regular calls (long polls add their own wait)
    pub request_timeout: Duration,
}

impl TelegramConfig {
    /// Create config from environment variables.
    pub fn from_env() -> TransportResult<Self> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| TransportError::config_error("TELEGRAM_BOT_TOKEN is not set"))?;

        Ok(Self {
            token,
            api_url: std::env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            request_timeout: Duration::from_secs(
                std::env::var("TELEGRAM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        })
    }
}

/// Thin Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    http: Client,
    config: TelegramConfig,
}

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct RemoteFile {
    file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    text: Option<String>,
    video: Option<FileRef>,
    animation: Option<FileRef>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    file_id: String,
    file_size: Option<u64>,
}

#[derive(Debug, Serialize)]
struct GetUpdates<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

impl TelegramClient {
    /// Create a new client.
    pub fn new(config: TelegramConfig) -> TransportResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(TransportError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> TransportResult<Self> {
        Self::new(TelegramConfig::from_env()?)
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.token,
            method
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.token,
            file_path
        )
    }

    /// Call a method with a JSON body.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> TransportResult<T> {
        let response = self.http.post(self.method_url(method)).json(body).send().await?;
        Self::unwrap_response(method, response).await
    }

    async fn unwrap_response<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> TransportResult<T> {
        let envelope: ApiResponse<T> = response.json().await?;

        if !envelope.ok {
            let code = envelope.error_code.unwrap_or_default();
            let description = envelope.description.unwrap_or_default();
            debug!("Telegram {} failed: {} {}", method, code, description);
            return Err(TransportError::api(code, description));
        }

        envelope
            .result
            .ok_or_else(|| TransportError::InvalidResponse(format!("{method}: missing result")))
    }

    /// Send a video or animation by URL or as an uploaded file.
    async fn send_media(
        &self,
        chat: ChatId,
        kind: MediaKind,
        media: MediaPayload,
    ) -> TransportResult<()> {
        let (method, field) = match kind {
            MediaKind::Video => ("sendVideo", "video"),
            MediaKind::Animation => ("sendAnimation", "animation"),
        };

        match media {
            MediaPayload::Url(url) => {
                let mut body = json!({ "chat_id": chat.0 });
                body[field] = json!(url.as_str());
                if kind == MediaKind::Video {
                    body["supports_streaming"] = json!(true);
                }
                let _: serde_json::Value = self.call(method, &body).await?;
            }
            MediaPayload::File(path) => {
                let file = tokio::fs::File::open(&path).await?;
                let len = file.metadata().await?.len();
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| field.to_string());

                debug!("Uploading {} ({} bytes) via {}", path.display(), len, method);

                let part = Part::stream_with_length(reqwest::Body::from(file), len)
                    .file_name(file_name);
                let mut form = Form::new()
                    .text("chat_id", chat.0.to_string())
                    .part(field, part);
                if kind == MediaKind::Video {
                    form = form.text("supports_streaming", "true");
                }

                let response = self
                    .http
                    .post(self.method_url(method))
                    .multipart(form)
                    .send()
                    .await?;
                let _: serde_json::Value = Self::unwrap_response(method, response).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn post_message(&self, chat: ChatId, text: &str) -> TransportResult<MessageId> {
        let sent: SentMessage = self
            .call("sendMessage", &json!({ "chat_id": chat.0, "text": text }))
            .await?;
        Ok(MessageId(sent.message_id))
    }

    async fn edit_message(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
    ) -> TransportResult<()> {
        // editMessageText answers with the edited message or `true`.
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &json!({ "chat_id": chat.0, "message_id": message.0, "text": text }),
            )
            .await?;
        Ok(())
    }

    async fn send_video(&self, chat: ChatId, media: MediaPayload) -> TransportResult<()> {
        self.send_media(chat, MediaKind::Video, media).await
    }

    async fn send_animation(&self, chat: ChatId, media: MediaPayload) -> TransportResult<()> {
        self.send_media(chat, MediaKind::Animation, media).await
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> TransportResult<()> {
        let remote: RemoteFile = self.call("getFile", &json!({ "file_id": file_id })).await?;
        let file_path = remote
            .file_path
            .ok_or_else(|| TransportError::download_failed(format!("no file_path for {file_id}")))?;

        let mut response = self.http.get(self.file_url(&file_path)).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::download_failed(format!(
                "file endpoint returned {}",
                response.status()
            )));
        }

        let mut out = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;

        debug!("Downloaded {} ({} bytes) to {}", file_id, written, dest.display());
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn poll_updates(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> TransportResult<UpdateBatch> {
        let body = GetUpdates {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: &["message"],
        };

        let response = self
            .http
            .post(self.method_url("getUpdates"))
            .timeout(self.config.request_timeout + timeout)
            .json(&body)
            .send()
            .await?;
        let updates: Vec<Update> = Self::unwrap_response("getUpdates", response).await?;

        let last_update_id = updates.iter().map(|u| u.update_id).max();

        Ok(UpdateBatch {
            updates: updates.into_iter().filter_map(convert_update).collect(),
            last_update_id,
        })
    }
}

/// Map a raw update onto the transport-neutral shape.
fn convert_update(update: Update) -> Option<InboundUpdate> {
    let Some(message) = update.message else {
        debug!("Skipping update {} without a message", update.update_id);
        return None;
    };

    let chat_id = ChatId(message.chat.id);
    let message_id = MessageId(message.message_id);

    let media = message
        .video
        .map(|f| (f, MediaKind::Video))
        .or_else(|| message.animation.map(|f| (f, MediaKind::Animation)));

    let content = match (media, message.text) {
        (Some((file, kind)), _) => InboundContent::Media(InboundMedia {
            chat_id,
            message_id,
            file_id: file.file_id,
            file_size_bytes: file.file_size,
            kind,
        }),
        (None, Some(text)) if text.starts_with('/') => {
            // "/start@my_bot arg" -> "start"
            let command = text[1..]
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string();
            InboundContent::Command(command)
        }
        _ => InboundContent::Other,
    };

    Some(InboundUpdate {
        update_id: update.update_id,
        chat_id,
        message_id,
        content,
    })
}
