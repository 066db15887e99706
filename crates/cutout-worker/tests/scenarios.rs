//! End-to-end job runs against the real backends with faked edges.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cutout_matting::{HostedBackend, HostedConfig, LocalBackend, LocalConfig};
use cutout_media::FfmpegGifEncoder;
use cutout_models::{ChatId, CutoutJob, MediaKind, MessageId};
use cutout_telegram::fake::{RecordingTransport, TransportCall};
use cutout_telegram::MediaPayload;
use cutout_worker::{Dispatcher, JobOutcome};

fn staged_input(dir: &TempDir, name: &str) -> std::path::PathBuf {
    let input = dir.path().join(name);
    std::fs::write(&input, b"fake video").unwrap();
    input
}

#[tokio::test]
async fn test_hosted_url_result_is_sent_by_reference() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/files"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "f1",
            "urls": { "get": format!("{}/v1/files/f1", server.uri()) }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/models/pfnet/robust-video-matting/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p1", "status": "processing"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/predictions/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "p1", "status": "succeeded", "output": "https://x/out.mp4"
        })))
        .mount(&server)
        .await;

    let backend = HostedBackend::new(HostedConfig {
        api_token: Some("r8_test".into()),
        api_url: server.uri(),
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    })
    .unwrap();

    let dir = TempDir::new().unwrap();
    let input = staged_input(&dir, "clip.mp4");
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = Dispatcher::new(
        Arc::new(backend),
        transport.clone(),
        Arc::new(FfmpegGifEncoder::default()),
        5.0,
    );
    let job = CutoutJob::new(ChatId(7), MessageId(70), &input, MediaKind::Video);

    let outcome = dispatcher.run(&job, 1).await;

    assert_eq!(outcome, JobOutcome::Done);
    assert!(transport.calls().contains(&TransportCall::SendVideo {
        chat: ChatId(7),
        media: MediaPayload::Url(Url::parse("https://x/out.mp4").unwrap()),
    }));
    assert_eq!(transport.edits(), vec!["Uploading your cutout… 🚀", "Done ✅"]);
    assert!(!input.exists());
}

#[tokio::test]
async fn test_missing_local_tool_reports_failure() {
    let dir = TempDir::new().unwrap();
    let input = staged_input(&dir, "clip.mp4");
    let backend = LocalBackend::new(LocalConfig {
        binary: "backgroundremover-not-installed".to_string(),
        output_dir: dir.path().to_path_buf(),
        ..Default::default()
    });
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = Dispatcher::new(
        Arc::new(backend),
        transport.clone(),
        Arc::new(FfmpegGifEncoder::default()),
        5.0,
    );
    let job = CutoutJob::new(ChatId(8), MessageId(80), &input, MediaKind::Video);

    let outcome = dispatcher.run(&job, 1).await;

    assert!(matches!(outcome, JobOutcome::Failed { stage: "backend", .. }));
    assert_eq!(
        transport.edits(),
        vec!["Failed: backgroundremover CLI not found. Ensure the package is installed and on PATH."]
    );
    assert!(!transport
        .calls()
        .iter()
        .any(|c| matches!(c, TransportCall::SendVideo { .. })));
    assert!(!input.exists());
}
