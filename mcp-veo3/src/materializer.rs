//! Writes generated videos to the output directory.
//!
//! Files are named `veo3_video_{YYYYmmdd_HHMMSS}.mp4`. Names are claimed with
//! an exclusive create, so concurrent requests finishing in the same second
//! get `_1`, `_2`, ... suffixes instead of overwriting each other. A file that
//! could not be written completely is removed, including when the request is
//! cancelled mid-download.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use futures::StreamExt;
use mcp_veo3_common::error::Error;
use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use crate::provider::{VideoProvider, VideoReference};

/// Write buffer size.
pub const WRITE_BUFFER_SIZE: usize = 8192;

/// Filename prefix for generated videos.
pub const FILENAME_PREFIX: &str = "veo3_video_";

/// Maximum number of suffixes tried for one timestamp.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// A video written to local disk.
#[derive(Debug, Clone, Serialize)]
pub struct VideoFile {
    pub path: PathBuf,
    pub filename: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_secs")]
    pub write_duration: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Filename for a video created at `timestamp`; `attempt > 0` adds a suffix.
///
/// ```
/// use chrono::TimeZone;
/// use mcp_veo3::materializer::video_filename;
///
/// let ts = chrono::Local.with_ymd_and_hms(2025, 7, 4, 9, 30, 5).unwrap();
/// assert_eq!(video_filename(&ts, 0), "veo3_video_20250704_093005.mp4");
/// assert_eq!(video_filename(&ts, 2), "veo3_video_20250704_093005_2.mp4");
/// ```
pub fn video_filename(timestamp: &DateTime<Local>, attempt: u32) -> String {
    let stamp = timestamp.format("%Y%m%d_%H%M%S");
    if attempt == 0 {
        format!("{}{}.mp4", FILENAME_PREFIX, stamp)
    } else {
        format!("{}{}_{}.mp4", FILENAME_PREFIX, stamp, attempt)
    }
}

/// Removes the file on drop unless disarmed.
struct PartialFile {
    path: Option<PathBuf>,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn disarm(mut self) {
        self.path = None;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed partial video file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial video file"),
            }
        }
    }
}

/// Claim a fresh filename in `output_dir`.
async fn create_unique(output_dir: &Path, timestamp: &DateTime<Local>) -> Result<(File, PathBuf, String), Error> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let filename = video_filename(timestamp, attempt);
        let path = output_dir.join(&filename);
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((file, path, filename)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(Error::write_failure(&path, e)),
        }
    }
    Err(Error::write_failure(
        output_dir,
        std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("no free filename after {} attempts", MAX_NAME_ATTEMPTS),
        ),
    ))
}

/// Streams provider videos to disk.
#[derive(Clone)]
pub struct VideoMaterializer {
    provider: Arc<dyn VideoProvider>,
}

impl VideoMaterializer {
    pub fn new(provider: Arc<dyn VideoProvider>) -> Self {
        Self { provider }
    }

    /// Download `video` into `output_dir`.
    ///
    /// # Errors
    /// - `Error::WriteFailure` if the directory or file cannot be written
    /// - `Error::DownloadIncomplete` if the stream breaks or is empty
    /// - provider errors from opening the download
    #[instrument(level = "info", skip(self, video), fields(output_dir = %output_dir.display()))]
    pub async fn save(&self, video: &VideoReference, output_dir: &Path) -> Result<VideoFile, Error> {
        let started = Instant::now();

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| Error::write_failure(output_dir, e))?;

        let mut stream = self.provider.download(video).await?;

        let created_at = Utc::now();
        let (file, path, filename) = create_unique(output_dir, &created_at.with_timezone(&Local)).await?;
        let guard = PartialFile::new(path.clone());

        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        let mut size_bytes = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| Error::write_failure(&path, e))?;
            size_bytes += chunk.len() as u64;
        }
        writer.flush().await.map_err(|e| Error::write_failure(&path, e))?;
        writer
            .get_mut()
            .sync_all()
            .await
            .map_err(|e| Error::write_failure(&path, e))?;
        drop(writer);

        if size_bytes == 0 {
            return Err(Error::DownloadIncomplete(format!(
                "no bytes received for {}",
                filename
            )));
        }

        guard.disarm();
        let write_duration = started.elapsed();
        info!(
            path = %path.display(),
            size_bytes,
            duration_ms = write_duration.as_secs_f64() * 1000.0,
            "Video saved"
        );

        Ok(VideoFile {
            path,
            filename,
            size_bytes,
            created_at,
            write_duration,
        })
    }
}
