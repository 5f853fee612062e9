//! Azure Blob Storage client.
//!
//! Uploads materialized videos to a single container and lists what has been
//! uploaded. The storage backend is reached through `object_store`, so the
//! [`AzureBlobStore`] can be pointed at an in-memory store in tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::azure::{AzureConfigKey, MicrosoftAzureBuilder};
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectMeta, ObjectStore, PutMode, PutOptions, PutPayload};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::AzureStorageConfig;
use crate::error::{Error, StorageError};

/// Content type attached to every uploaded video.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Names tried per upload before giving up on finding a free one.
pub const MAX_BLOB_NAME_ATTEMPTS: u32 = 100;

const DEFAULT_PROTOCOL: &str = "https";
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
const EMULATOR_ACCOUNT: &str = "devstoreaccount1";
const EMULATOR_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Parsed Azure Storage connection string.
///
/// Only the keys relevant to Blob Storage are retained; unknown keys such as
/// `QueueEndpoint` are ignored.
#[derive(Clone, PartialEq, Eq)]
pub struct AzureConnectionString {
    pub account_name: String,
    pub account_key: Option<String>,
    pub sas_token: Option<String>,
    pub protocol: String,
    pub endpoint_suffix: String,
    pub blob_endpoint: Option<String>,
    pub use_emulator: bool,
}

impl std::fmt::Debug for AzureConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureConnectionString")
            .field("account_name", &self.account_name)
            .field("account_key", &self.account_key.as_ref().map(|_| "<redacted>"))
            .field("sas_token", &self.sas_token.as_ref().map(|_| "<redacted>"))
            .field("protocol", &self.protocol)
            .field("endpoint_suffix", &self.endpoint_suffix)
            .field("blob_endpoint", &self.blob_endpoint)
            .field("use_emulator", &self.use_emulator)
            .finish()
    }
}

impl AzureConnectionString {
    /// Parse a `Key=Value;Key=Value` connection string.
    ///
    /// # Errors
    /// Returns `StorageError::InvalidConnectionString` when a segment has no
    /// `=`, when `AccountName` is missing, or when neither `AccountKey` nor
    /// `SharedAccessSignature` is present (emulator strings excepted).
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let mut account_name = None;
        let mut account_key = None;
        let mut sas_token = None;
        let mut protocol = None;
        let mut endpoint_suffix = None;
        let mut blob_endpoint = None;
        let mut use_emulator = false;

        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            // Values may contain '=' (base64 padding, SAS query strings).
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                StorageError::InvalidConnectionString(format!("segment '{}' has no '='", key_of(segment)))
            })?;
            let value = value.trim().to_string();
            match key.trim() {
                "AccountName" => account_name = Some(value),
                "AccountKey" => account_key = Some(value),
                "SharedAccessSignature" => sas_token = Some(value.trim_start_matches('?').to_string()),
                "DefaultEndpointsProtocol" => protocol = Some(value),
                "EndpointSuffix" => endpoint_suffix = Some(value),
                "BlobEndpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                "UseDevelopmentStorage" => use_emulator = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        if use_emulator {
            return Ok(Self {
                account_name: account_name.unwrap_or_else(|| EMULATOR_ACCOUNT.to_string()),
                account_key,
                sas_token,
                protocol: "http".to_string(),
                endpoint_suffix: DEFAULT_ENDPOINT_SUFFIX.to_string(),
                blob_endpoint: blob_endpoint.or_else(|| Some(EMULATOR_BLOB_ENDPOINT.to_string())),
                use_emulator,
            });
        }

        let account_name = account_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| StorageError::InvalidConnectionString("AccountName is missing".to_string()))?;

        if account_key.is_none() && sas_token.is_none() {
            return Err(StorageError::InvalidConnectionString(
                "either AccountKey or SharedAccessSignature is required".to_string(),
            ));
        }

        Ok(Self {
            account_name,
            account_key,
            sas_token,
            protocol: protocol.unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
            endpoint_suffix: endpoint_suffix.unwrap_or_else(|| DEFAULT_ENDPOINT_SUFFIX.to_string()),
            blob_endpoint,
            use_emulator,
        })
    }

    /// Base URL of the blob service, without a trailing slash.
    pub fn blob_service_url(&self) -> String {
        match &self.blob_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "{}://{}.blob.{}",
                self.protocol, self.account_name, self.endpoint_suffix
            ),
        }
    }
}

// Never echo a whole segment back: it may be a secret.
fn key_of(segment: &str) -> &str {
    let end = segment
        .char_indices()
        .nth(24)
        .map(|(i, _)| i)
        .unwrap_or(segment.len());
    &segment[..end]
}

/// An uploaded blob.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BlobDescriptor {
    pub name: String,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub last_modified: DateTime<Utc>,
    pub url: String,
}

/// A blob written by [`BlobStore::upload_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub name: String,
    pub url: String,
}

/// `name` with `_{attempt}` inserted before its extension.
///
/// ```
/// use mcp_veo3_common::blob::suffixed_blob_name;
///
/// assert_eq!(suffixed_blob_name("veo3_video_20250101_120000.mp4", 0), "veo3_video_20250101_120000.mp4");
/// assert_eq!(suffixed_blob_name("veo3_video_20250101_120000.mp4", 2), "veo3_video_20250101_120000_2.mp4");
/// ```
pub fn suffixed_blob_name(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, attempt, ext),
        _ => format!("{}_{}", name, attempt),
    }
}

/// Storage operations needed by the uploader and the catalog.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Container all blobs are written to.
    fn container(&self) -> &str;

    /// Public URL of `blob_name`.
    fn blob_url(&self, blob_name: &str) -> String;

    /// Write the file at `path` under `blob_name`, or under the first free
    /// [`suffixed_blob_name`] when that name is taken. Existing blobs are
    /// never overwritten.
    ///
    /// # Errors
    /// Returns `Error::UploadError` for any read or storage failure.
    async fn upload_file(&self, path: &Path, blob_name: &str, content_type: &str) -> Result<StoredBlob, Error>;

    /// List `.mp4` blobs, newest first, at most `limit` of them.
    async fn list_videos(&self, limit: usize) -> Result<Vec<BlobDescriptor>, StorageError>;
}

/// `object_store`-backed Azure Blob container.
pub struct AzureBlobStore {
    store: Arc<dyn ObjectStore>,
    container: String,
    service_url: String,
}

impl std::fmt::Debug for AzureBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureBlobStore")
            .field("container", &self.container)
            .field("service_url", &self.service_url)
            .finish()
    }
}

impl AzureBlobStore {
    /// Build a client from the configured connection string and container.
    ///
    /// # Errors
    /// Returns a `StorageError` if the connection string is malformed or the
    /// client cannot be built.
    pub fn from_config(config: &AzureStorageConfig) -> Result<Self, StorageError> {
        let conn = AzureConnectionString::parse(&config.connection_string)?;
        let service_url = conn.blob_service_url();

        let mut builder = MicrosoftAzureBuilder::new()
            .with_account(conn.account_name.clone())
            .with_container_name(config.container.clone());

        if conn.use_emulator {
            builder = builder.with_use_emulator(true);
        }
        if let Some(key) = &conn.account_key {
            builder = builder.with_access_key(key.clone());
        }
        if let Some(sas) = &conn.sas_token {
            builder = builder.with_config(AzureConfigKey::SasKey, sas.clone());
        }
        if !conn.use_emulator {
            builder = builder
                .with_endpoint(service_url.clone())
                .with_allow_http(service_url.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Client(e.to_string()))?;

        info!(
            account = %conn.account_name,
            container = %config.container,
            "Azure Blob Storage client initialized"
        );

        Ok(Self {
            store: Arc::new(store),
            container: config.container.clone(),
            service_url,
        })
    }

    /// Wrap an arbitrary object store, e.g. `object_store::memory::InMemory`.
    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        container: impl Into<String>,
        service_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            container: container.into(),
            service_url: service_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn descriptor(&self, meta: ObjectMeta) -> BlobDescriptor {
        let name = meta.location.to_string();
        let size_bytes = meta.size as u64;
        BlobDescriptor {
            url: self.blob_url(&name),
            size_mb: bytes_to_mb(size_bytes),
            name,
            size_bytes,
            last_modified: meta.last_modified,
        }
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    fn container(&self) -> &str {
        &self.container
    }

    fn blob_url(&self, blob_name: &str) -> String {
        format!("{}/{}/{}", self.service_url, self.container, blob_name)
    }

    #[instrument(level = "info", skip(self), fields(container = %self.container))]
    async fn upload_file(&self, path: &Path, blob_name: &str, content_type: &str) -> Result<StoredBlob, Error> {
        let start = Instant::now();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::upload(blob_name, format!("cannot open {}: {}", path.display(), e)))?;
        let size_bytes = bytes.len();
        let payload = PutPayload::from(bytes);

        for attempt in 0..MAX_BLOB_NAME_ATTEMPTS {
            let name = suffixed_blob_name(blob_name, attempt);
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            let options = PutOptions {
                mode: PutMode::Create,
                attributes,
                ..Default::default()
            };

            match self
                .store
                .put_opts(&ObjectPath::from(name.as_str()), payload.clone(), options)
                .await
            {
                Ok(_) => {
                    let url = self.blob_url(&name);
                    info!(
                        blob = %name,
                        size_bytes,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "Blob upload successful"
                    );
                    return Ok(StoredBlob { name, url });
                }
                Err(object_store::Error::AlreadyExists { .. }) => {
                    debug!(blob = %name, "Blob name taken");
                }
                Err(e) => return Err(Error::upload(name, e.to_string())),
            }
        }

        Err(Error::upload(
            blob_name,
            format!("no free blob name after {} attempts", MAX_BLOB_NAME_ATTEMPTS),
        ))
    }

    #[instrument(level = "debug", skip(self), fields(container = %self.container))]
    async fn list_videos(&self, limit: usize) -> Result<Vec<BlobDescriptor>, StorageError> {
        let metas: Vec<ObjectMeta> = self
            .store
            .list(None)
            .try_collect()
            .await
            .map_err(|e| StorageError::ListFailed {
                container: self.container.clone(),
                message: e.to_string(),
            })?;

        let mut videos: Vec<ObjectMeta> = metas
            .into_iter()
            .filter(|meta| is_video_blob(meta.location.as_ref()))
            .collect();
        videos.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        videos.truncate(limit);

        debug!(count = videos.len(), "Listed video blobs");
        Ok(videos.into_iter().map(|meta| self.descriptor(meta)).collect())
    }
}

/// Whether a blob name looks like an uploaded video.
pub fn is_video_blob(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".mp4")
}

/// Convert a byte count to megabytes rounded to two decimals.
pub fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}
