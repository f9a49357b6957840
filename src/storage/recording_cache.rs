//! Local recording cache
//!
//! Keeps the most recent session video on disk for local playback. The
//! cache is not a durable record: entries may be missing at any time.

use crate::recorder::MediaBlob;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fixed key of the full-session recording
pub const SESSION_VIDEO_KEY: &str = "interview-video";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

/// Sidecar stored next to each cached blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryMeta {
    pub mime_type: String,
    pub size: usize,
    pub session_id: Option<String>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecordingCache {
    dir: PathBuf,
}

impl RecordingCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn paths(&self, key: &str) -> Result<(PathBuf, PathBuf), CacheError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok((
            self.dir.join(format!("{}.bin", key)),
            self.dir.join(format!("{}.json", key)),
        ))
    }

    /// Store `blob` under `key`, replacing any previous entry
    pub async fn save(
        &self,
        key: &str,
        blob: &MediaBlob,
        session_id: Option<&str>,
    ) -> Result<CacheEntryMeta, CacheError> {
        let (data_path, meta_path) = self.paths(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let meta = CacheEntryMeta {
            mime_type: blob.mime_type.clone(),
            size: blob.len(),
            session_id: session_id.map(str::to_string),
            saved_at: Utc::now(),
        };

        write_atomically(&data_path, &blob.data).await?;
        write_atomically(&meta_path, &serde_json::to_vec_pretty(&meta)?).await?;

        tracing::info!("Cached {} ({} bytes) at {:?}", key, meta.size, data_path);
        Ok(meta)
    }

    /// Load the entry under `key`; `None` when absent
    pub async fn load(&self, key: &str) -> Result<Option<(MediaBlob, CacheEntryMeta)>, CacheError> {
        let (data_path, meta_path) = self.paths(key)?;

        let meta_raw = match tokio::fs::read(&meta_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let data = match tokio::fs::read(&data_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: CacheEntryMeta = serde_json::from_slice(&meta_raw)?;

        let mut blob = MediaBlob::new(Bytes::from(data), meta.mime_type.clone());
        blob.started_at = meta.saved_at;
        blob.finished_at = meta.saved_at;
        Ok(Some((blob, meta)))
    }

    pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let (data_path, meta_path) = self.paths(key)?;
        for path in [data_path, meta_path] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub async fn save_session_video(
        &self,
        blob: &MediaBlob,
        session_id: &str,
    ) -> Result<CacheEntryMeta, CacheError> {
        self.save(SESSION_VIDEO_KEY, blob, Some(session_id)).await
    }

    pub async fn load_session_video(&self) -> Result<Option<(MediaBlob, CacheEntryMeta)>, CacheError> {
        self.load(SESSION_VIDEO_KEY).await
    }
}

async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_session_video_roundtrip() {
        let dir = tempdir().unwrap();
        let cache = RecordingCache::new(dir.path().join("cache"));
        let blob = MediaBlob::new(vec![7u8; 64], "video/webm;codecs=vp8,opus");

        let meta = cache.save_session_video(&blob, "s1").await.unwrap();
        assert_eq!(meta.size, 64);

        let (loaded, loaded_meta) = cache.load_session_video().await.unwrap().unwrap();
        assert_eq!(loaded.data, blob.data);
        assert_eq!(loaded.mime_type, "video/webm;codecs=vp8,opus");
        assert_eq!(loaded_meta.session_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_missing_entry_is_none() {
        let dir = tempdir().unwrap();
        let cache = RecordingCache::new(dir.path());
        assert!(cache.load_session_video().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_and_remove_clears() {
        let dir = tempdir().unwrap();
        let cache = RecordingCache::new(dir.path());

        cache
            .save("clip", &MediaBlob::new(vec![1u8; 4], "audio/webm"), None)
            .await
            .unwrap();
        cache
            .save("clip", &MediaBlob::new(vec![2u8; 8], "audio/webm"), None)
            .await
            .unwrap();
        let (blob, _) = cache.load("clip").await.unwrap().unwrap();
        assert_eq!(blob.len(), 8);

        cache.remove("clip").await.unwrap();
        cache.remove("clip").await.unwrap();
        assert!(cache.load("clip").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let dir = tempdir().unwrap();
        let cache = RecordingCache::new(dir.path());
        let err = cache.load("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidKey(_)));
    }
}
