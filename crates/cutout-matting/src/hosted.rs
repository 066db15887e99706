//! Hosted matting through a Replicate-style prediction API.
//!
//! Flow: upload the input (`POST /v1/files`), create a prediction for the
//! configured model, poll it until it is terminal, then pull the result URL
//! out of whatever shape the model returned.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use cutout_models::{MediaKind, MediaResult};

use crate::backend::MattingBackend;
use crate::config::HostedConfig;
use crate::error::{BackendError, BackendResult};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Hosted backend client.
#[derive(Clone)]
pub struct HostedBackend {
    http: Client,
    config: HostedConfig,
    token: String,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    urls: FileUrls,
}

#[derive(Debug, Deserialize)]
struct FileUrls {
    get: String,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

impl HostedBackend {
    /// Create a new client. Fails without an API token.
    pub fn new(config: HostedConfig) -> BackendResult<Self> {
        let token = config
            .api_token
            .clone()
            .ok_or_else(|| BackendError::config("REPLICATE_API_TOKEN is required for BACKEND=hosted"))?;

        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            config,
            token,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    /// Model input for robust video matting.
    fn model_input(video_url: &str) -> Value {
        json!({
            "video": video_url,
            "backbone": "resnet50",
            "downsample_ratio": 0.25,
            "output_format": "video",
        })
    }

    /// Send a request, retrying failures `retryable` accepts with
    /// exponential backoff.
    async fn send_json<T, F>(
        &self,
        operation: &str,
        retryable: fn(&BackendError) -> bool,
        build: F,
    ) -> BackendResult<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let build = &build;
        with_retries(operation, self.config.max_retries, retryable, move || async move {
            let response = build().bearer_auth(&self.token).send().await?;
            decode(response).await
        })
        .await
    }

    async fn upload(&self, input: &Path) -> BackendResult<String> {
        let bytes = tokio::fs::read(input).await?;
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input.mp4".to_string());

        debug!("Uploading {} ({} bytes)", file_name, bytes.len());

        let uploaded: UploadedFile = self
            .send_json("file upload", BackendError::is_transient, || {
                let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                self.http
                    .post(self.endpoint("/v1/files"))
                    .multipart(Form::new().part("content", part))
            })
            .await?;

        Ok(uploaded.urls.get)
    }

    async fn create_prediction(&self, video_url: &str) -> BackendResult<Prediction> {
        let input = Self::model_input(video_url);

        // A pinned `owner/name:version` goes through the generic endpoint.
        let (path, body) = match self.config.model.split_once(':') {
            Some((_, version)) => (
                "/v1/predictions".to_string(),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!("/v1/models/{}/predictions", self.config.model),
                json!({ "input": input }),
            ),
        };

        // Not idempotent: a retry after the server saw the request could
        // start a second paid prediction.
        self.send_json("create prediction", BackendError::is_connect_failure, || {
            self.http.post(self.endpoint(&path)).json(&body)
        })
        .await
    }

    async fn wait_for(&self, mut prediction: Prediction) -> BackendResult<Prediction> {
        let path = format!("/v1/predictions/{}", prediction.id);

        while !prediction.is_terminal() {
            tokio::time::sleep(self.config.poll_interval).await;
            prediction = self
                .send_json("poll prediction", BackendError::is_transient, || {
                    self.http.get(self.endpoint(&path))
                })
                .await?;
            debug!("Prediction {} is {}", prediction.id, prediction.status);
        }

        Ok(prediction)
    }
}

#[async_trait]
impl MattingBackend for HostedBackend {
    async fn process(&self, input: &Path, _kind: MediaKind) -> BackendResult<MediaResult> {
        info!("Submitting {} to model {}", input.display(), self.config.model);

        let video_url = self.upload(input).await?;
        let prediction = self.create_prediction(&video_url).await?;
        let prediction = self.wait_for(prediction).await?;

        if prediction.status != "succeeded" {
            let message = match &prediction.error {
                Value::String(s) => s.clone(),
                Value::Null => "no error detail".to_string(),
                other => other.to_string(),
            };
            return Err(BackendError::PredictionFailed {
                status: prediction.status,
                message,
            });
        }

        let url = extract_output_url(&prediction.output)?;
        info!("Prediction {} complete: {}", prediction.id, url);

        let kind = if url.path().to_ascii_lowercase().ends_with(".gif") {
            MediaKind::Animation
        } else {
            MediaKind::Video
        };

        Ok(MediaResult::from_url(url, kind)
            .with_meta("backend", "hosted")
            .with_meta("model", self.config.model.clone())
            .with_meta("prediction_id", prediction.id))
    }

    fn name(&self) -> &'static str {
        "hosted"
    }
}

/// Pull the result URL out of a model output.
///
/// Accepts a URL string, a list whose first element carries one, or an
/// object with an `output` or `url` field carrying one.
pub fn extract_output_url(output: &Value) -> BackendResult<Url> {
    match output {
        Value::String(raw) => {
            Url::parse(raw).map_err(|e| BackendError::malformed(format!("{raw}: {e}")))
        }
        Value::Array(items) => match items.first() {
            Some(first) => extract_output_url(first),
            None => Err(BackendError::malformed("empty output list")),
        },
        Value::Object(map) => match map.get("output").or_else(|| map.get("url")) {
            Some(inner) => extract_output_url(inner),
            None => Err(BackendError::malformed(output.to_string())),
        },
        other => Err(BackendError::malformed(other.to_string())),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Http {
            status: status.as_u16(),
            body,
        });
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| BackendError::malformed(e.to_string()))
}

/// Backoff before retry number `attempt` (1-based).
fn retry_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    RETRY_BASE_DELAY.saturating_mul(factor).min(RETRY_MAX_DELAY)
}

async fn with_retries<T, F, Fut>(
    operation: &str,
    max_retries: u32,
    retryable: fn(&BackendError) -> bool,
    call: F,
) -> BackendResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = BackendResult<T>>,
{
    let mut attempt = 0u32;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) && attempt < max_retries => {
                attempt += 1;
                let delay = retry_delay(attempt);
                warn!(
                    "{} attempt {} failed, retrying in {:?}: {}",
                    operation, attempt, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> HostedBackend {
        HostedBackend::new(HostedConfig {
            api_token: Some("r8_test".into()),
            api_url: server.uri(),
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        })
        .unwrap()
    }

    fn input_file() -> NamedTempFile {
        let file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        std::fs::write(file.path(), b"fake video").unwrap();
        file
    }

    async fn mount_upload(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/files"))
            .and(header("authorization", "Bearer r8_test"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "f1",
                "urls": { "get": format!("{}/v1/files/f1", server.uri()) }
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_extract_output_shapes() {
        let expected = "https://x/out.mp4";
        for output in [
            json!(expected),
            json!([expected, "https://x/other.mp4"]),
            json!({ "output": expected }),
            json!({ "url": expected }),
            json!([{ "url": expected }]),
        ] {
            assert_eq!(extract_output_url(&output).unwrap().as_str(), expected);
        }
    }

    #[test]
    fn test_extract_output_rejects_unknown_shapes() {
        for output in [json!(42), json!([]), json!({ "foo": "bar" }), json!("not a url"), Value::Null] {
            assert!(matches!(
                extract_output_url(&output),
                Err(BackendError::MalformedResponse(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_process_returns_output_url() {
        let server = MockServer::start().await;
        mount_upload(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/models/pfnet/robust-video-matting/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p1", "status": "starting"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/predictions/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "p1",
                "status": "succeeded",
                "output": { "output": "https://x/out.mp4" }
            })))
            .mount(&server)
            .await;

        let input = input_file();
        let result = backend(&server)
            .process(input.path(), MediaKind::Video)
            .await
            .unwrap();

        assert_eq!(result.output.url().unwrap().as_str(), "https://x/out.mp4");
        assert_eq!(result.kind, MediaKind::Video);
        assert_eq!(result.meta.get("backend").map(String::as_str), Some("hosted"));
        assert_eq!(result.meta.get("prediction_id").map(String::as_str), Some("p1"));
    }

    #[tokio::test]
    async fn test_gif_output_is_tagged_animation() {
        let server = MockServer::start().await;
        mount_upload(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/models/pfnet/robust-video-matting/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p2", "status": "succeeded", "output": ["https://x/out.GIF"]
            })))
            .mount(&server)
            .await;

        let input = input_file();
        let result = backend(&server)
            .process(input.path(), MediaKind::Animation)
            .await
            .unwrap();

        assert_eq!(result.kind, MediaKind::Animation);
    }

    #[tokio::test]
    async fn test_failed_prediction() {
        let server = MockServer::start().await;
        mount_upload(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/models/pfnet/robust-video-matting/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p3", "status": "processing"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/predictions/p3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "p3", "status": "failed", "error": "CUDA out of memory"
            })))
            .mount(&server)
            .await;

        let input = input_file();
        let err = backend(&server)
            .process(input.path(), MediaKind::Video)
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::PredictionFailed { .. }));
        assert!(err.to_string().contains("CUDA out of memory"));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        assert_eq!(retry_delay(1), RETRY_BASE_DELAY);
        assert_eq!(retry_delay(2), RETRY_BASE_DELAY * 2);
        assert_eq!(retry_delay(40), RETRY_MAX_DELAY);
        assert_eq!(retry_delay(u32::MAX), RETRY_MAX_DELAY);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let server = MockServer::start().await;

        // First upload hits a 503, the retry succeeds.
        Mock::given(method("POST"))
            .and(path("/v1/files"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_upload(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/models/pfnet/robust-video-matting/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p4", "status": "succeeded", "output": "https://x/out.mp4"
            })))
            .mount(&server)
            .await;

        let input = input_file();
        let result = backend(&server)
            .process(input.path(), MediaKind::Video)
            .await
            .unwrap();

        assert_eq!(result.output.url().unwrap().as_str(), "https://x/out.mp4");
    }

    #[tokio::test]
    async fn test_create_prediction_is_sent_once_on_server_error() {
        let server = MockServer::start().await;
        mount_upload(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/models/pfnet/robust-video-matting/predictions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(1)
            .mount(&server)
            .await;

        let input = input_file();
        let err = backend(&server)
            .process(input.path(), MediaKind::Video)
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/files"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthenticated"))
            .expect(1)
            .mount(&server)
            .await;

        let input = input_file();
        let err = backend(&server)
            .process(input.path(), MediaKind::Video)
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Http { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_pinned_version_uses_generic_endpoint() {
        let server = MockServer::start().await;
        mount_upload(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p5", "status": "succeeded", "output": "https://x/out.mp4"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HostedBackend::new(HostedConfig {
            api_token: Some("r8_test".into()),
            api_url: server.uri(),
            model: "pfnet/robust-video-matting:abc123".into(),
            ..Default::default()
        })
        .unwrap();

        let input = input_file();
        assert!(backend.process(input.path(), MediaKind::Video).await.is_ok());
    }
}
