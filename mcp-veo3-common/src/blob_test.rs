//! Tests for connection-string parsing and the blob store.

use std::sync::Arc;

use object_store::memory::InMemory;
use proptest::prelude::*;

use crate::blob::*;
use crate::config::AzureStorageConfig;
use crate::error::{ErrorKind, StorageError};

fn account_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{3,24}"
}

fn base64_key_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9+/]{20,40}={0,2}"
}

proptest! {
    /// Keys with base64 padding survive parsing intact.
    #[test]
    fn account_key_with_padding_is_preserved(account in account_strategy(), key in base64_key_strategy()) {
        let raw = format!(
            "DefaultEndpointsProtocol=https;AccountName={};AccountKey={};EndpointSuffix=core.windows.net",
            account, key
        );
        let parsed = AzureConnectionString::parse(&raw).unwrap();
        prop_assert_eq!(&parsed.account_name, &account);
        prop_assert_eq!(parsed.account_key.as_deref(), Some(key.as_str()));
        prop_assert_eq!(
            parsed.blob_service_url(),
            format!("https://{}.blob.core.windows.net", account)
        );
    }

    /// Segment order does not matter.
    #[test]
    fn segment_order_is_irrelevant(account in account_strategy(), key in base64_key_strategy()) {
        let forward = format!("AccountName={};AccountKey={}", account, key);
        let reverse = format!("AccountKey={};AccountName={}", key, account);
        prop_assert_eq!(
            AzureConnectionString::parse(&forward).unwrap(),
            AzureConnectionString::parse(&reverse).unwrap()
        );
    }

    /// Megabyte conversion is monotonic.
    #[test]
    fn bytes_to_mb_is_monotonic(a in 0u64..10_000_000_000, b in 0u64..10_000_000_000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(bytes_to_mb(lo) <= bytes_to_mb(hi));
    }
}

#[cfg(test)]
mod connection_string_tests {
    use super::*;

    #[test]
    fn sas_connection_string() {
        let parsed = AzureConnectionString::parse(
            "BlobEndpoint=https://acct.blob.core.windows.net/;SharedAccessSignature=?sv=2022-11-02&sig=abc%3D",
        )
        .unwrap_err();
        // AccountName is still required outside the emulator
        assert!(matches!(parsed, StorageError::InvalidConnectionString(_)));

        let parsed = AzureConnectionString::parse(
            "AccountName=acct;BlobEndpoint=https://acct.blob.core.windows.net/;SharedAccessSignature=?sv=2022-11-02&sig=abc%3D",
        )
        .unwrap();
        assert_eq!(parsed.sas_token.as_deref(), Some("sv=2022-11-02&sig=abc%3D"));
        assert_eq!(parsed.blob_service_url(), "https://acct.blob.core.windows.net");
    }

    #[test]
    fn development_storage() {
        let parsed = AzureConnectionString::parse("UseDevelopmentStorage=true").unwrap();
        assert!(parsed.use_emulator);
        assert_eq!(parsed.account_name, "devstoreaccount1");
        assert_eq!(parsed.blob_service_url(), "http://127.0.0.1:10000/devstoreaccount1");
    }

    #[test]
    fn custom_protocol_and_suffix() {
        let parsed = AzureConnectionString::parse(
            "DefaultEndpointsProtocol=http;AccountName=acct;AccountKey=a2V5;EndpointSuffix=core.chinacloudapi.cn",
        )
        .unwrap();
        assert_eq!(parsed.blob_service_url(), "http://acct.blob.core.chinacloudapi.cn");
    }

    #[test]
    fn missing_credentials_rejected() {
        let err = AzureConnectionString::parse("AccountName=acct").unwrap_err();
        assert!(err.to_string().contains("AccountKey"));
    }

    #[test]
    fn malformed_segment_rejected() {
        assert!(AzureConnectionString::parse("AccountName=acct;garbage").is_err());
    }

    #[test]
    fn debug_redacts_credentials() {
        let parsed = AzureConnectionString::parse("AccountName=acct;AccountKey=c2VjcmV0").unwrap();
        let text = format!("{:?}", parsed);
        assert!(!text.contains("c2VjcmV0"));
        assert!(text.contains("acct"));
    }

    #[test]
    fn from_config_rejects_bad_connection_string() {
        let config = AzureStorageConfig {
            connection_string: "nonsense".to_string(),
            container: "videos".to_string(),
        };
        assert!(AzureBlobStore::from_config(&config).is_err());
    }

    #[test]
    fn from_config_builds_client() {
        let config = AzureStorageConfig {
            connection_string: "AccountName=acct;AccountKey=a2V5a2V5a2V5".to_string(),
            container: "videos".to_string(),
        };
        let store = AzureBlobStore::from_config(&config).unwrap();
        assert_eq!(store.container(), "videos");
        assert_eq!(
            store.blob_url("veo3_video_20250101_120000.mp4"),
            "https://acct.blob.core.windows.net/videos/veo3_video_20250101_120000.mp4"
        );
    }
}

#[cfg(test)]
mod store_tests {
    use super::*;

    fn memory_store() -> AzureBlobStore {
        AzureBlobStore::with_store(
            Arc::new(InMemory::new()),
            "generated-videos",
            "https://acct.blob.core.windows.net/",
        )
    }

    async fn write_temp(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        tokio::fs::write(&path, bytes).await.unwrap();
        path
    }

    #[tokio::test]
    async fn upload_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = memory_store();

        let path = write_temp(&dir, "veo3_video_20250101_120000.mp4", &[7u8; 20_000]).await;
        let stored = store
            .upload_file(&path, "veo3_video_20250101_120000.mp4", VIDEO_CONTENT_TYPE)
            .await
            .unwrap();
        assert_eq!(stored.name, "veo3_video_20250101_120000.mp4");
        assert_eq!(
            stored.url,
            "https://acct.blob.core.windows.net/generated-videos/veo3_video_20250101_120000.mp4"
        );

        let listed = store.list_videos(50).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "veo3_video_20250101_120000.mp4");
        assert_eq!(listed[0].size_bytes, 20_000);
        assert_eq!(listed[0].url, stored.url);
    }

    #[tokio::test]
    async fn taken_blob_name_gets_suffix_instead_of_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = memory_store();
        let first = write_temp(&dir, "first.mp4", &[1u8; 100]).await;
        let second = write_temp(&dir, "second.mp4", &[2u8; 200]).await;

        let a = store
            .upload_file(&first, "veo3_video_20250101_120000.mp4", VIDEO_CONTENT_TYPE)
            .await
            .unwrap();
        let b = store
            .upload_file(&second, "veo3_video_20250101_120000.mp4", VIDEO_CONTENT_TYPE)
            .await
            .unwrap();

        assert_eq!(a.name, "veo3_video_20250101_120000.mp4");
        assert_eq!(b.name, "veo3_video_20250101_120000_1.mp4");
        assert_ne!(a.url, b.url);

        let mut sizes: Vec<(String, u64)> = store
            .list_videos(50)
            .await
            .unwrap()
            .into_iter()
            .map(|blob| (blob.name, blob.size_bytes))
            .collect();
        sizes.sort();
        assert_eq!(
            sizes,
            vec![
                ("veo3_video_20250101_120000.mp4".to_string(), 100),
                ("veo3_video_20250101_120000_1.mp4".to_string(), 200),
            ]
        );
    }

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(suffixed_blob_name("a.mp4", 0), "a.mp4");
        assert_eq!(suffixed_blob_name("a.mp4", 3), "a_3.mp4");
        assert_eq!(suffixed_blob_name("noext", 1), "noext_1");
        assert_eq!(suffixed_blob_name(".hidden", 1), ".hidden_1");
    }

    #[tokio::test]
    async fn list_filters_non_video_blobs_and_caps_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = memory_store();

        for i in 0..4 {
            let name = format!("veo3_video_2025010{}_120000.mp4", i);
            let path = write_temp(&dir, &name, b"video").await;
            store.upload_file(&path, &name, VIDEO_CONTENT_TYPE).await.unwrap();
        }
        let notes = write_temp(&dir, "notes.txt", b"text").await;
        store.upload_file(&notes, "notes.txt", "text/plain").await.unwrap();

        let all = store.list_videos(50).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|b| b.name.ends_with(".mp4")));
        assert!(all.windows(2).all(|w| w[0].last_modified >= w[1].last_modified));

        let capped = store.list_videos(2).await.unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[tokio::test]
    async fn upload_of_missing_file_is_upload_error() {
        let store = memory_store();
        let err = store
            .upload_file(std::path::Path::new("/nonexistent/video.mp4"), "video.mp4", VIDEO_CONTENT_TYPE)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UploadError);
        assert!(!err.is_fatal());
    }

    #[test]
    fn video_blob_detection() {
        assert!(is_video_blob("a.mp4"));
        assert!(is_video_blob("A.MP4"));
        assert!(!is_video_blob("a.mov"));
        assert!(!is_video_blob("mp4"));
    }

    #[test]
    fn megabytes_rounded() {
        assert_eq!(bytes_to_mb(0), 0.0);
        assert_eq!(bytes_to_mb(1024 * 1024), 1.0);
        assert_eq!(bytes_to_mb(1_572_864), 1.5);
    }
}
