//! Segment recorder
//!
//! Turns a live stream (or a sub-stream of it) into one finished blob per
//! start/stop cycle. `stop` only requests completion; the blob is handed
//! back once the buffering task has flushed every delivered chunk.

use super::state::{MediaBlob, RecorderState};
use crate::capture::MediaStream;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{future, FutureExt, Stream, StreamExt};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

/// Recorder errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("No supported recording format (requested {0})")]
    UnsupportedFormat(String),

    #[error("Recording produced no data")]
    EmptyRecording,

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Stream has no live tracks")]
    StreamEnded,

    #[error("Encoder failed: {0}")]
    Encoder(String),
}

pub type RecorderResult<T> = Result<T, RecorderError>;

/// Pick the recording encoding: the hint when the stream supports it,
/// otherwise the first encoding the stream offers.
pub fn negotiate_mime(stream: &MediaStream, hint: Option<&str>) -> RecorderResult<String> {
    if let Some(hint) = hint {
        if stream.supports(hint) {
            return Ok(hint.to_string());
        }
        tracing::debug!("Stream does not support {}, falling back", hint);
    }
    stream
        .supported_mime_types()
        .first()
        .cloned()
        .ok_or_else(|| RecorderError::UnsupportedFormat(hint.unwrap_or("any").to_string()))
}

#[derive(Debug, Default)]
struct CollectedChunks {
    chunks: Vec<Bytes>,
    lagged: u64,
}

impl CollectedChunks {
    fn push(&mut self, item: Result<Bytes, BroadcastStreamRecvError>) {
        match item {
            Ok(chunk) if chunk.is_empty() => {}
            Ok(chunk) => self.chunks.push(chunk),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                tracing::warn!("Recorder fell behind and lost {} chunks", missed);
                self.lagged += missed;
            }
        }
    }
}

async fn collect_chunks<S>(
    mut chunks: S,
    mut stop_rx: oneshot::Receiver<()>,
    tracks_ended: impl std::future::Future<Output = ()>,
) -> CollectedChunks
where
    S: Stream<Item = Result<Bytes, BroadcastStreamRecvError>> + Unpin,
{
    let mut collected = CollectedChunks::default();
    tokio::pin!(tracks_ended);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            item = chunks.next() => match item {
                Some(item) => collected.push(item),
                None => break,
            },
            _ = &mut tracks_ended => {
                tracing::debug!("All recorded tracks ended before stop");
                break;
            }
        }
    }

    // Flush whatever the tracks already delivered. Unconstrained so the
    // coop budget cannot cut the flush short.
    tokio::task::unconstrained(async move {
        while let Some(Some(item)) = chunks.next().now_or_never() {
            collected.push(item);
        }
        collected
    })
    .await
}

struct ActiveRecording {
    mime_type: String,
    started_at: DateTime<Utc>,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<CollectedChunks>,
}

/// Records one segment at a time from a borrowed stream
pub struct SegmentRecorder {
    label: String,
    active: Option<ActiveRecording>,
}

impl SegmentRecorder {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            active: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        if self.active.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Recording, but every source track has ended so nothing more arrives
    pub fn source_ended(&self) -> bool {
        self.active
            .as_ref()
            .map(|active| active.task.is_finished())
            .unwrap_or(false)
    }

    /// Start buffering every track of `stream`
    pub fn start(&mut self, stream: &MediaStream, mime_hint: Option<&str>) -> RecorderResult<()> {
        if self.active.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        let mime_type = negotiate_mime(stream, mime_hint)?;
        if !stream.is_live() {
            return Err(RecorderError::StreamEnded);
        }

        let merged = futures::stream::select_all(
            stream
                .tracks()
                .iter()
                .map(|track| BroadcastStream::new(track.subscribe())),
        );
        let tracks_ended = future::join_all(stream.tracks().iter().map(|t| t.stopped())).map(|_| ());
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(collect_chunks(merged, stop_rx, tracks_ended));

        tracing::info!(
            "[{}] Recording started ({}, {} tracks)",
            self.label,
            mime_type,
            stream.tracks().len()
        );

        self.active = Some(ActiveRecording {
            mime_type,
            started_at: Utc::now(),
            stop_tx,
            task,
        });
        Ok(())
    }

    /// Finish the current recording.
    ///
    /// Returns `Ok(None)` when nothing was being recorded.
    pub async fn stop(&mut self) -> RecorderResult<Option<MediaBlob>> {
        let Some(active) = self.active.take() else {
            return Ok(None);
        };

        let _ = active.stop_tx.send(());
        let collected = active
            .task
            .await
            .map_err(|e| RecorderError::Encoder(e.to_string()))?;

        let chunk_count = collected.chunks.len();
        let total: usize = collected.chunks.iter().map(|c| c.len()).sum();
        if total == 0 {
            tracing::warn!("[{}] Recording stopped with no data", self.label);
            return Err(RecorderError::EmptyRecording);
        }

        let mut data = BytesMut::with_capacity(total);
        for chunk in &collected.chunks {
            data.extend_from_slice(chunk);
        }

        tracing::info!(
            "[{}] Recording stopped: {} bytes in {} chunks ({} lost)",
            self.label,
            total,
            chunk_count,
            collected.lagged
        );

        Ok(Some(MediaBlob {
            data: data.freeze(),
            mime_type: active.mime_type,
            chunk_count,
            started_at: active.started_at,
            finished_at: Utc::now(),
        }))
    }

    /// Drop the current recording without producing a blob
    pub fn discard(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
            tracing::info!("[{}] Recording discarded", self.label);
        }
    }
}

impl Drop for SegmentRecorder {
    fn drop(&mut self) {
        self.discard();
    }
}
