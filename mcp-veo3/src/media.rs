//! Source image resolution.
//!
//! An image reference is either a local path or an `http(s)` URL. Remote
//! images are streamed into a uniquely named temporary file that is removed
//! when resolution finishes, fails, or is cancelled.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use mcp_veo3_common::error::Error;
use reqwest::Url;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::reporter::ProgressReporter;

/// MIME type assumed when none can be inferred.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Extension used when neither the response nor the URL names one.
pub const DEFAULT_IMAGE_EXTENSION: &str = ".jpg";

const URL_PATH_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];

/// Image bytes ready to be attached to a generation request.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl std::fmt::Debug for ResolvedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedImage")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Whether `source` is an absolute `http`/`https` URL with a host.
///
/// ```
/// use mcp_veo3::media::is_url;
///
/// assert!(is_url("https://example.com/cat.png"));
/// assert!(!is_url("/tmp/cat.png"));
/// assert!(!is_url("ftp://example.com/cat.png"));
/// ```
pub fn is_url(source: &str) -> bool {
    match Url::parse(source.trim()) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Temp-file extension for a downloaded image.
///
/// The response content type wins; otherwise the URL path's extension is used
/// if it is a known image extension; otherwise `.jpg`.
pub fn extension_for(content_type: Option<&str>, url: &Url) -> &'static str {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if ct.contains("jpeg") || ct.contains("jpg") {
            return ".jpg";
        }
        if ct.contains("png") {
            return ".png";
        }
        if ct.contains("gif") {
            return ".gif";
        }
        if ct.contains("webp") {
            return ".webp";
        }
    }

    let path = url.path().to_ascii_lowercase();
    URL_PATH_EXTENSIONS
        .iter()
        .find(|ext| path.ends_with(*ext))
        .copied()
        .unwrap_or(DEFAULT_IMAGE_EXTENSION)
}

/// MIME type inferred from a file extension, `image/jpeg` if unknown.
pub fn mime_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => DEFAULT_IMAGE_MIME,
    }
}

/// Resolves image references to bytes.
#[derive(Debug, Clone)]
pub struct MediaFetcher {
    http: reqwest::Client,
    temp_dir: PathBuf,
}

impl MediaFetcher {
    /// Fetcher that downloads into the system temp directory.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Download into `temp_dir` instead.
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    /// Resolve a local path or URL to image bytes and a MIME type.
    ///
    /// # Errors
    /// Returns `Error::InvalidSource` when the reference is empty, the file
    /// does not exist, or the URL cannot be fetched.
    #[instrument(level = "info", skip(self, reporter))]
    pub async fn resolve(
        &self,
        source: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<ResolvedImage, Error> {
        let source = source.trim();
        if source.is_empty() {
            return Err(Error::invalid_source(source, "image path or URL is empty"));
        }

        if is_url(source) {
            reporter
                .notify_info(&format!("Downloading image from URL: {}", source))
                .await;
            self.download(source, reporter).await
        } else {
            read_local(Path::new(source)).await
        }
    }

    async fn download(
        &self,
        source: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<ResolvedImage, Error> {
        let url = Url::parse(source).map_err(|e| Error::invalid_source(source, e.to_string()))?;

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::invalid_source(source, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::invalid_source(source, format!("HTTP {}", status)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(ct) = content_type.as_deref() {
            if !ct.to_ascii_lowercase().starts_with("image/") {
                warn!(url = %source, content_type = %ct, "URL does not look like an image");
                reporter
                    .notify_info(&format!("Warning: URL content type is '{}', not an image", ct))
                    .await;
            }
        }

        let extension = extension_for(content_type.as_deref(), &url);

        // Dropped on every exit path, which deletes the file.
        let temp = tempfile::Builder::new()
            .prefix("veo3_image_")
            .suffix(extension)
            .tempfile_in(&self.temp_dir)
            .map_err(|e| Error::invalid_source(source, format!("cannot create temp file: {}", e)))?;

        let std_file = temp
            .reopen()
            .map_err(|e| Error::invalid_source(source, format!("cannot open temp file: {}", e)))?;
        let mut file = tokio::fs::File::from_std(std_file);

        let mut stream = response.bytes_stream();
        let mut written = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| Error::invalid_source(source, format!("download interrupted: {}", e)))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::invalid_source(source, format!("cannot write temp file: {}", e)))?;
            written += chunk.len();
        }
        file.flush()
            .await
            .map_err(|e| Error::invalid_source(source, format!("cannot write temp file: {}", e)))?;
        drop(file);

        debug!(path = %temp.path().display(), bytes = written, "Image downloaded to temp file");

        let bytes = tokio::fs::read(temp.path())
            .await
            .map_err(|e| Error::invalid_source(source, format!("cannot read temp file: {}", e)))?;
        if bytes.is_empty() {
            return Err(Error::invalid_source(source, "downloaded image is empty"));
        }
        let mime_type = mime_type_for_path(temp.path()).to_string();

        info!(url = %source, size_bytes = bytes.len(), mime_type = %mime_type, "Image downloaded");
        Ok(ResolvedImage { bytes, mime_type })
    }
}

async fn read_local(path: &Path) -> Result<ResolvedImage, Error> {
    let source = path.display().to_string();
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::invalid_source(source, "image file not found"));
        }
        Err(e) => return Err(Error::invalid_source(source, e.to_string())),
    };
    if bytes.is_empty() {
        return Err(Error::invalid_source(source, "image file is empty"));
    }

    let mime_type = mime_type_for_path(path).to_string();
    debug!(path = %source, size_bytes = bytes.len(), mime_type = %mime_type, "Loaded local image");
    Ok(ResolvedImage { bytes, mime_type })
}
