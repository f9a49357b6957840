//! Recorder state and recorded output
//!
//! Defines the recorder state machine and the finished binary segment.

use crate::capture::mime_essence;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current state of a segment recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    /// No recording in progress
    Idle,
    /// Currently buffering chunks
    Recording,
}

impl Default for RecorderState {
    fn default() -> Self {
        Self::Idle
    }
}

/// One finished recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    /// Concatenated chunks in arrival order
    pub data: Bytes,

    /// Negotiated encoding
    pub mime_type: String,

    /// Number of non-empty chunks that went into `data`
    pub chunk_count: usize,

    /// When buffering started
    pub started_at: DateTime<Utc>,

    /// When the recorder finalized the blob
    pub finished_at: DateTime<Utc>,
}

impl MediaBlob {
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            chunk_count: 1,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// File extension matching the encoding
    pub fn extension(&self) -> &'static str {
        extension_for(&self.mime_type)
    }

    /// `stem` plus the matching extension, e.g. `answer.webm`
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension())
    }
}

/// Get file extension for a MIME type
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_essence(mime_type).as_str() {
        "audio/webm" | "video/webm" => "webm",
        "video/mp4" | "audio/mp4" => "mp4",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
        "audio/mpeg" => "mp3",
        "audio/l16" => "pcm",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let blob = MediaBlob::new(vec![1u8, 2, 3], "audio/webm;codecs=opus");
        assert_eq!(blob.file_name("answer"), "answer.webm");
        assert_eq!(extension_for("audio/L16;rate=48000;channels=1"), "pcm");
        assert_eq!(extension_for("application/x-unknown"), "bin");
    }
}
