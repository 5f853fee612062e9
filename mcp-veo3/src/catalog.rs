//! Local catalog of materialized videos.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use mcp_veo3_common::blob::bytes_to_mb;
use mcp_veo3_common::error::Error;
use serde::Serialize;
use tracing::debug;

/// Metadata of one local video file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoEntry {
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub size_mb: f64,
    /// RFC 3339; falls back to `modified` where the platform has no birth time
    pub created: String,
    pub modified: String,
    #[serde(skip)]
    modified_at: SystemTime,
}

fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}

fn entry_for(path: &Path, metadata: &std::fs::Metadata) -> VideoEntry {
    let modified_at = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let created_at = metadata.created().unwrap_or(modified_at);
    VideoEntry {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        size_bytes: metadata.len(),
        size_mb: bytes_to_mb(metadata.len()),
        created: rfc3339(created_at),
        modified: rfc3339(modified_at),
        modified_at,
    }
}

fn is_mp4(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"))
}

/// `.mp4` files directly under `output_dir`, newest first.
///
/// A directory that does not exist yet lists as empty.
pub async fn list_videos(output_dir: &Path, limit: usize) -> Result<Vec<VideoEntry>, Error> {
    let mut dir = match tokio::fs::read_dir(output_dir).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::invalid_source(output_dir.display().to_string(), e.to_string())),
    };

    let mut entries = Vec::new();
    while let Some(item) = dir
        .next_entry()
        .await
        .map_err(|e| Error::invalid_source(output_dir.display().to_string(), e.to_string()))?
    {
        let path = item.path();
        if !is_mp4(&path) {
            continue;
        }
        match item.metadata().await {
            Ok(metadata) if metadata.is_file() => entries.push(entry_for(&path, &metadata)),
            Ok(_) => {}
            Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable entry"),
        }
    }

    entries.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then_with(|| b.filename.cmp(&a.filename)));
    entries.truncate(limit);
    Ok(entries)
}

/// Metadata for one video. A bare filename resolves against `output_dir`.
///
/// # Errors
/// Returns `Error::InvalidSource` if the file does not exist.
pub async fn video_info(reference: &str, output_dir: &Path) -> Result<VideoEntry, Error> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(Error::invalid_source(reference, "video path is empty"));
    }

    let candidate = PathBuf::from(reference);
    let path = if candidate.components().count() == 1 && !candidate.is_absolute() {
        output_dir.join(candidate)
    } else {
        candidate
    };

    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|e| Error::invalid_source(reference, format!("cannot read {}: {}", path.display(), e)))?;
    if !metadata.is_file() {
        return Err(Error::invalid_source(reference, "not a regular file"));
    }
    Ok(entry_for(&path, &metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_veo3_common::error::ErrorKind;
    use std::time::Duration;

    fn touch(dir: &Path, name: &str, bytes: usize, age_secs: u64) {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; bytes]).unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    #[tokio::test]
    async fn test_lists_only_mp4_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "old.mp4", 10, 300);
        touch(dir.path(), "new.MP4", 20, 10);
        touch(dir.path(), "mid.mp4", 30, 100);
        touch(dir.path(), "notes.txt", 5, 0);
        std::fs::create_dir(dir.path().join("dir.mp4")).unwrap();

        let entries = list_videos(dir.path(), 10).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["new.MP4", "mid.mp4", "old.mp4"]);
        assert_eq!(entries[0].size_bytes, 20);
    }

    #[tokio::test]
    async fn test_limit_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            touch(dir.path(), &format!("v{}.mp4", i), 1, i * 10);
        }
        let entries = list_videos(dir.path(), 2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].filename, "v0.mp4");
    }

    #[tokio::test]
    async fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries = list_videos(&dir.path().join("nope"), 10).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_info_resolves_bare_filename() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "clip.mp4", 2 * 1024 * 1024, 0);

        let entry = video_info("clip.mp4", dir.path()).await.unwrap();
        assert_eq!(entry.path, dir.path().join("clip.mp4"));
        assert_eq!(entry.size_mb, 2.0);
        assert!(DateTime::parse_from_rfc3339(&entry.modified).is_ok());
    }

    #[tokio::test]
    async fn test_info_accepts_full_path() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "clip.mp4", 3, 0);
        let other = tempfile::tempdir().unwrap();

        let full = dir.path().join("clip.mp4");
        let entry = video_info(full.to_str().unwrap(), other.path()).await.unwrap();
        assert_eq!(entry.size_bytes, 3);
    }

    #[tokio::test]
    async fn test_info_missing_is_invalid_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = video_info("ghost.mp4", dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSource);

        let err = video_info("  ", dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSource);
    }
}
