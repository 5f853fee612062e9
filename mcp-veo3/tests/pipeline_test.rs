//! End-to-end pipeline tests with a scripted provider.
//!
//! Each test drives `VideoHandler` through submit, poll, materialize and
//! upload without touching the network, except for a local mock server that
//! serves source images.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use mcp_veo3::generation::GenerationRequest;
use mcp_veo3::handler::{GenerateVideoFromImageParams, GenerateVideoParams, GenerationResult, VideoHandler};
use mcp_veo3::media::MediaFetcher;
use mcp_veo3::poller::HEARTBEAT_MESSAGE;
use mcp_veo3::provider::{OperationHandle, OperationStatus, VideoByteStream, VideoProvider, VideoReference};
use mcp_veo3::reporter::{ProgressEvent, RecordingReporter};
use mcp_veo3::uploader::{BlobUploader, UploadStatus};
use mcp_veo3_common::blob::{AzureBlobStore, BlobDescriptor, BlobStore, StoredBlob};
use mcp_veo3_common::config::Config;
use mcp_veo3_common::error::{Error, ErrorKind, StorageError};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VIDEO_BYTES: &[u8] = &[0x42; 20_000];

/// Replays statuses in order and serves `VIDEO_BYTES` for any download.
struct ScriptedProvider {
    statuses: Mutex<VecDeque<OperationStatus>>,
    queries: AtomicU32,
    submitted_image: Mutex<Option<(String, usize)>>,
}

impl ScriptedProvider {
    fn new(statuses: Vec<OperationStatus>) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.into()),
            queries: AtomicU32::new(0),
            submitted_image: Mutex::new(None),
        })
    }

    fn pending() -> OperationStatus {
        OperationStatus::pending(OperationHandle::new("operations/scripted"))
    }

    fn done(videos: &[&str]) -> OperationStatus {
        OperationStatus {
            done: true,
            videos: videos
                .iter()
                .map(|uri| VideoReference { uri: uri.to_string() })
                .collect(),
            ..Self::pending()
        }
    }
}

#[async_trait]
impl VideoProvider for ScriptedProvider {
    async fn submit(&self, request: &GenerationRequest) -> Result<OperationHandle, Error> {
        *self.submitted_image.lock().unwrap() = request
            .image
            .as_ref()
            .map(|img| (img.mime_type.clone(), img.bytes.len()));
        Ok(OperationHandle::new("operations/scripted"))
    }

    async fn get_status(&self, handle: OperationHandle) -> Result<OperationStatus, Error> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let next = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Self::pending);
        Ok(OperationStatus { handle, ..next })
    }

    async fn download(&self, _video: &VideoReference) -> Result<VideoByteStream, Error> {
        let chunks: Vec<Result<Bytes, Error>> = VIDEO_BYTES
            .chunks(4096)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

/// Blob store whose uploads always fail.
struct BrokenStore;

#[async_trait]
impl BlobStore for BrokenStore {
    fn container(&self) -> &str {
        "videos"
    }

    fn blob_url(&self, blob_name: &str) -> String {
        format!("https://acct.blob.core.windows.net/videos/{}", blob_name)
    }

    async fn upload_file(&self, _path: &Path, blob_name: &str, _content_type: &str) -> Result<StoredBlob, Error> {
        Err(Error::upload(blob_name, "403 AuthorizationFailure"))
    }

    async fn list_videos(&self, _limit: usize) -> Result<Vec<BlobDescriptor>, StorageError> {
        Err(StorageError::Client("403 AuthorizationFailure".to_string()))
    }
}

fn config(output_dir: &Path) -> Config {
    Config::from_lookup(|name| match name {
        "GEMINI_API_KEY" => Some("test-key".to_string()),
        "VEO3_POLL_INTERVAL_SECS" => Some("10".to_string()),
        _ => None,
    })
    .unwrap()
    .with_output_dir(output_dir)
}

fn handler_with(config: Config, provider: Arc<dyn VideoProvider>, uploader: BlobUploader) -> VideoHandler {
    VideoHandler::with_components(config, provider, uploader, MediaFetcher::new(reqwest::Client::new()))
}

fn mp4_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|n| n.ends_with(".mp4"))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn text_to_video_polls_until_done_without_upload() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        ScriptedProvider::pending(),
        ScriptedProvider::pending(),
        ScriptedProvider::done(&["https://example.com/video.mp4"]),
    ]);
    let handler = handler_with(config(dir.path()), provider.clone(), BlobUploader::disabled());
    let reporter = RecordingReporter::new();

    let result = handler
        .generate_video(
            GenerateVideoParams {
                prompt: "A paper boat drifting down a rainy street".to_string(),
                model: Some("veo-3".to_string()),
                ..Default::default()
            },
            &reporter,
            &CancellationToken::new(),
        )
        .await;

    let GenerationResult::Success(success) = result else {
        panic!("expected success");
    };
    assert_eq!(provider.queries.load(Ordering::SeqCst), 3);
    assert_eq!(success.model, "veo-3.0-generate-preview");
    assert_eq!(success.file_size, VIDEO_BYTES.len() as u64);
    assert!(success.azure_video_url.is_none());
    assert_eq!(success.upload.as_ref().map(|u| u.status), Some(UploadStatus::Disabled));

    let on_disk = std::fs::read(&success.video_path).unwrap();
    assert_eq!(on_disk, VIDEO_BYTES);
    assert!(success.filename.starts_with("veo3_video_"));

    let heartbeats = reporter
        .infos()
        .into_iter()
        .filter(|m| m == HEARTBEAT_MESSAGE)
        .count();
    assert_eq!(heartbeats, 2);
    assert!(reporter
        .events()
        .contains(&ProgressEvent::Progress { progress: 2, total: Some(60) }));

    let json = serde_json::to_value(GenerationResult::Success(success)).unwrap();
    assert_eq!(json["success"], true);
    assert!(json["azure_video_url"].is_null());
    for field in ["filename", "video_path", "model", "prompt", "generation_time", "file_size"] {
        assert!(json.get(field).is_some(), "missing {}", field);
    }
}

#[tokio::test]
async fn image_url_is_fetched_and_temp_file_removed() {
    let server = MockServer::start().await;
    let png = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3, 4];
    Mock::given(method("GET"))
        .and(path("/images/cat"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(png.clone()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let out = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![ScriptedProvider::done(&["https://example.com/v.mp4"])]);
    let handler = VideoHandler::with_components(
        config(out.path()),
        provider.clone(),
        BlobUploader::disabled(),
        MediaFetcher::new(reqwest::Client::new()).with_temp_dir(scratch.path()),
    );

    let result = handler
        .generate_video_from_image(
            GenerateVideoFromImageParams {
                prompt: "The cat turns its head".to_string(),
                image_path: format!("{}/images/cat", server.uri()),
                ..Default::default()
            },
            &RecordingReporter::new(),
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_success(), "{:?}", serde_json::to_string(&result));
    let submitted = provider.submitted_image.lock().unwrap().clone();
    assert_eq!(submitted, Some(("image/png".to_string(), png.len())));
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn empty_result_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let filtered = OperationStatus {
        filtered_count: Some(1),
        ..ScriptedProvider::done(&[])
    };
    let provider = ScriptedProvider::new(vec![filtered]);
    let handler = handler_with(config(dir.path()), provider, BlobUploader::disabled());
    let reporter = RecordingReporter::new();

    let result = handler
        .generate_video(
            GenerateVideoParams {
                prompt: "Something the filter will catch".to_string(),
                ..Default::default()
            },
            &reporter,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.error_kind(), Some(ErrorKind::EmptyResult));
    assert!(mp4_files(dir.path()).is_empty());
    assert_eq!(reporter.errors().len(), 1);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error_kind"], "EmptyResult");
}

#[tokio::test]
async fn upload_failure_keeps_local_success() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![ScriptedProvider::done(&["https://example.com/v.mp4"])]);
    let uploader = BlobUploader::with_store(Arc::new(BrokenStore), 50);
    let handler = handler_with(config(dir.path()), provider, uploader);
    let reporter = RecordingReporter::new();

    let result = handler
        .generate_video(
            GenerateVideoParams {
                prompt: "A lighthouse in a storm".to_string(),
                ..Default::default()
            },
            &reporter,
            &CancellationToken::new(),
        )
        .await;

    let GenerationResult::Success(success) = result else {
        panic!("upload failure must not fail the request");
    };
    assert!(success.azure_video_url.is_none());
    assert!(success.upload.is_none());
    assert!(success.upload_error.as_deref().unwrap().contains("AuthorizationFailure"));
    assert_eq!(mp4_files(dir.path()).len(), 1);
    assert!(reporter.errors().iter().any(|e| e.contains("Azure upload failed")));
}

#[tokio::test]
async fn concurrent_requests_in_different_dirs_get_distinct_blobs() {
    let first_dir = tempfile::tempdir().unwrap();
    let second_dir = tempfile::tempdir().unwrap();
    let store = AzureBlobStore::with_store(
        Arc::new(object_store::memory::InMemory::new()),
        "videos",
        "https://acct.blob.core.windows.net",
    );
    let uploader = BlobUploader::with_store(Arc::new(store), 50);
    let provider = ScriptedProvider::new(vec![
        ScriptedProvider::done(&["https://example.com/a.mp4"]),
        ScriptedProvider::done(&["https://example.com/b.mp4"]),
    ]);
    let handler = handler_with(config(first_dir.path()), provider, uploader.clone());

    let request = |dir: &Path| GenerateVideoParams {
        prompt: "Two requests, one second".to_string(),
        output_dir: Some(dir.display().to_string()),
        ..Default::default()
    };
    let first_reporter = RecordingReporter::new();
    let second_reporter = RecordingReporter::new();
    let cancel = CancellationToken::new();
    let (first, second) = tokio::join!(
        handler.generate_video(request(first_dir.path()), &first_reporter, &cancel),
        handler.generate_video(request(second_dir.path()), &second_reporter, &cancel),
    );

    let (GenerationResult::Success(first), GenerationResult::Success(second)) = (first, second) else {
        panic!("both generations should succeed");
    };
    assert!(first.azure_video_url.is_some());
    assert!(second.azure_video_url.is_some());
    assert_ne!(first.azure_video_url, second.azure_video_url);
    assert_eq!(uploader.list(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn cancel_while_fetching_image_skips_submit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/images/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![0u8; 64])
                .set_delay(std::time::Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let out = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![ScriptedProvider::done(&["https://example.com/v.mp4"])]);
    let handler = VideoHandler::with_components(
        config(out.path()),
        provider.clone(),
        BlobUploader::disabled(),
        MediaFetcher::new(reqwest::Client::new()).with_temp_dir(scratch.path()),
    );
    let cancel = CancellationToken::new();
    let trigger = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            cancel.cancel();
        })
    };

    let result = handler
        .generate_video_from_image(
            GenerateVideoFromImageParams {
                prompt: "Never submitted".to_string(),
                image_path: format!("{}/images/slow", server.uri()),
                ..Default::default()
            },
            &RecordingReporter::new(),
            &cancel,
        )
        .await;
    trigger.await.unwrap();

    assert_eq!(result.error_kind(), Some(ErrorKind::Cancelled));
    assert!(provider.submitted_image.lock().unwrap().is_none());
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}
