//! Optional re-upload of generated videos to Azure Blob Storage.

use std::sync::Arc;
use std::time::Instant;

use mcp_veo3_common::blob::{AzureBlobStore, BlobDescriptor, BlobStore, VIDEO_CONTENT_TYPE};
use mcp_veo3_common::config::Config;
use mcp_veo3_common::error::{Error, StorageError};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::materializer::VideoFile;

/// Whether an upload happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
    Disabled,
}

/// Outcome of [`BlobUploader::upload`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    pub status: UploadStatus,
    pub url: Option<String>,
    pub blob_name: Option<String>,
    pub duration_secs: f64,
    pub size_bytes: u64,
}

impl UploadResult {
    /// Result for a server without blob storage.
    pub fn disabled() -> Self {
        Self {
            status: UploadStatus::Disabled,
            url: None,
            blob_name: None,
            duration_secs: 0.0,
            size_bytes: 0,
        }
    }
}

/// Uploads materialized videos when a blob store is configured.
#[derive(Clone)]
pub struct BlobUploader {
    store: Option<Arc<dyn BlobStore>>,
    list_limit: usize,
}

impl std::fmt::Debug for BlobUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobUploader")
            .field("container", &self.container())
            .field("list_limit", &self.list_limit)
            .finish()
    }
}

impl BlobUploader {
    /// Build from configuration. A missing connection string disables
    /// uploads; a malformed one is an error.
    pub fn from_config(config: &Config) -> Result<Self, StorageError> {
        let store = match &config.azure {
            Some(azure) => Some(Arc::new(AzureBlobStore::from_config(azure)?) as Arc<dyn BlobStore>),
            None => {
                warn!("AZURE_STORAGE_CONNECTION_STRING not set; blob upload disabled");
                None
            }
        };
        Ok(Self {
            store,
            list_limit: config.blob_list_limit,
        })
    }

    pub fn disabled() -> Self {
        Self {
            store: None,
            list_limit: mcp_veo3_common::config::DEFAULT_LIST_LIMIT,
        }
    }

    pub fn with_store(store: Arc<dyn BlobStore>, list_limit: usize) -> Self {
        Self {
            store: Some(store),
            list_limit,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn container(&self) -> Option<&str> {
        self.store.as_deref().map(|s| s.container())
    }

    pub fn list_limit(&self) -> usize {
        self.list_limit
    }

    /// Upload `file` to a blob named after it. When another request already
    /// took that name, a `_N` suffix is added; no blob is ever overwritten.
    ///
    /// # Errors
    /// Returns `Error::UploadError`; callers treat it as non-fatal.
    #[instrument(level = "info", skip(self, file), fields(filename = %file.filename))]
    pub async fn upload(&self, file: &VideoFile) -> Result<UploadResult, Error> {
        let Some(store) = &self.store else {
            return Ok(UploadResult::disabled());
        };

        let started = Instant::now();
        let stored = store
            .upload_file(&file.path, &file.filename, VIDEO_CONTENT_TYPE)
            .await?;
        let duration_secs = started.elapsed().as_secs_f64();

        info!(
            container = store.container(),
            blob = %stored.name,
            size_bytes = file.size_bytes,
            duration_secs,
            "Uploaded video to blob storage"
        );

        Ok(UploadResult {
            status: UploadStatus::Uploaded,
            url: Some(stored.url),
            blob_name: Some(stored.name),
            duration_secs,
            size_bytes: file.size_bytes,
        })
    }

    /// Uploaded videos, newest first. `None` uses the configured limit.
    ///
    /// # Errors
    /// `StorageError::Disabled` when no store is configured.
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<BlobDescriptor>, StorageError> {
        let store = self.store.as_ref().ok_or(StorageError::Disabled)?;
        store.list_videos(limit.unwrap_or(self.list_limit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mcp_veo3_common::error::ErrorKind;
    use object_store::memory::InMemory;
    use std::path::Path;
    use std::time::Duration;

    fn video_file(dir: &Path, name: &str, bytes: &[u8]) -> VideoFile {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        VideoFile {
            path,
            filename: name.to_string(),
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
            write_duration: Duration::from_millis(5),
        }
    }

    fn memory_uploader() -> BlobUploader {
        let store = AzureBlobStore::with_store(
            Arc::new(InMemory::new()),
            "videos",
            "https://acct.blob.core.windows.net",
        );
        BlobUploader::with_store(Arc::new(store), 10)
    }

    #[tokio::test]
    async fn test_disabled_upload_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = video_file(dir.path(), "a.mp4", b"data");
        let result = BlobUploader::disabled().upload(&file).await.unwrap();
        assert_eq!(result, UploadResult::disabled());
    }

    #[tokio::test]
    async fn test_disabled_list_errors() {
        let err = BlobUploader::disabled().list(None).await.unwrap_err();
        assert!(matches!(err, StorageError::Disabled));
    }

    #[tokio::test]
    async fn test_upload_uses_filename_as_blob_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = video_file(dir.path(), "veo3_video_20250101_000000.mp4", &[9u8; 300]);
        let uploader = memory_uploader();

        let result = uploader.upload(&file).await.unwrap();
        assert_eq!(result.status, UploadStatus::Uploaded);
        assert_eq!(result.size_bytes, 300);
        assert_eq!(
            result.url.as_deref(),
            Some("https://acct.blob.core.windows.net/videos/veo3_video_20250101_000000.mp4")
        );

        let listed = uploader.list(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "veo3_video_20250101_000000.mp4");
        assert_eq!(listed[0].size_bytes, 300);
    }

    #[tokio::test]
    async fn test_same_filename_from_two_directories_keeps_both_blobs() {
        let first_dir = tempfile::tempdir().unwrap();
        let second_dir = tempfile::tempdir().unwrap();
        let name = "veo3_video_20250101_000000.mp4";
        let first = video_file(first_dir.path(), name, &[1u8; 10]);
        let second = video_file(second_dir.path(), name, &[2u8; 20]);
        let uploader = memory_uploader();

        let (a, b) = tokio::join!(uploader.upload(&first), uploader.upload(&second));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.url, b.url);
        assert_ne!(a.blob_name, b.blob_name);
        let mut names = vec![a.blob_name.unwrap(), b.blob_name.unwrap()];
        names.sort();
        assert_eq!(names, vec![name.to_string(), "veo3_video_20250101_000000_1.mp4".to_string()]);
        assert_eq!(uploader.list(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upload_of_missing_file_is_upload_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = VideoFile {
            path: dir.path().join("gone.mp4"),
            filename: "gone.mp4".to_string(),
            size_bytes: 10,
            created_at: Utc::now(),
            write_duration: Duration::ZERO,
        };
        let uploader = memory_uploader();
        let err = uploader.upload(&file).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UploadError);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_from_config_without_azure_is_disabled() {
        let config = Config::from_lookup(|name| match name {
            "GEMINI_API_KEY" => Some("k".to_string()),
            _ => None,
        })
        .unwrap();
        let uploader = BlobUploader::from_config(&config).unwrap();
        assert!(!uploader.is_enabled());
        assert_eq!(uploader.container(), None);
    }

    #[test]
    fn test_from_config_with_bad_connection_string_fails() {
        let config = Config::from_lookup(|name| match name {
            "GEMINI_API_KEY" => Some("k".to_string()),
            "AZURE_STORAGE_CONNECTION_STRING" => Some("garbage".to_string()),
            _ => None,
        })
        .unwrap();
        assert!(BlobUploader::from_config(&config).is_err());
    }
}
