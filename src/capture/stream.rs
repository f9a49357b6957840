//! Live stream and track handles
//!
//! A `MediaTrack` is fed encoded chunks by its backend and fans them out to
//! every subscribed recorder. Only the owning `MediaSession` stops tracks.

use super::traits::TrackKind;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use uuid::Uuid;

const CHUNK_CHANNEL_CAPACITY: usize = 1024;

/// One live capture track
#[derive(Debug)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    label: String,
    live: AtomicBool,
    chunk_tx: broadcast::Sender<Bytes>,
    stop_token: CancellationToken,
}

impl MediaTrack {
    /// Create a new live track
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Arc<Self> {
        let (chunk_tx, _) = broadcast::channel(CHUNK_CHANNEL_CAPACITY);
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            kind,
            label: label.into(),
            live: AtomicBool::new(true),
            chunk_tx,
            stop_token: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Receive every chunk pushed from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.chunk_tx.subscribe()
    }

    /// Producer side: deliver one encoded chunk.
    ///
    /// Returns the number of recorders that received it. Chunks pushed after
    /// the track stopped are discarded.
    pub fn push_chunk(&self, chunk: Bytes) -> usize {
        if !self.is_live() {
            return 0;
        }
        self.chunk_tx.send(chunk).unwrap_or(0)
    }

    /// Resolves once the track has been stopped
    pub fn stopped(&self) -> WaitForCancellationFutureOwned {
        self.stop_token.clone().cancelled_owned()
    }

    /// Token producers watch to shut their capture loop down
    pub fn stop_token(&self) -> CancellationToken {
        self.stop_token.clone()
    }

    pub(crate) fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            tracing::debug!("Stopping {:?} track {} ({})", self.kind, self.id, self.label);
            self.stop_token.cancel();
        }
    }
}

/// A set of tracks opened together
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<MediaTrack>>,
    supported_mime_types: Vec<String>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<MediaTrack>>, supported_mime_types: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tracks,
            supported_mime_types,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.tracks
    }

    pub fn has_kind(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind() == kind)
    }

    /// Encodings the backend can produce for this stream
    pub fn supported_mime_types(&self) -> &[String] {
        &self.supported_mime_types
    }

    /// Whether `mime_type` can be recorded, ignoring codec parameters
    pub fn supports(&self, mime_type: &str) -> bool {
        let wanted = mime_essence(mime_type);
        self.supported_mime_types
            .iter()
            .any(|m| mime_essence(m) == wanted)
    }

    /// Sub-stream sharing this stream's tracks of one kind.
    ///
    /// The returned stream borrows the same tracks; stopping is still done
    /// through the session that owns the parent.
    pub fn only(&self, kind: TrackKind) -> MediaStream {
        MediaStream {
            id: self.id.clone(),
            tracks: self
                .tracks
                .iter()
                .filter(|t| t.kind() == kind)
                .cloned()
                .collect(),
            supported_mime_types: self
                .supported_mime_types
                .iter()
                .filter(|m| m.to_ascii_lowercase().starts_with(kind.mime_prefix()))
                .cloned()
                .collect(),
        }
    }

    pub fn audio_only(&self) -> MediaStream {
        self.only(TrackKind::Audio)
    }

    /// True while at least one track is live
    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }

    pub fn all_tracks_stopped(&self) -> bool {
        self.tracks.iter().all(|t| !t.is_live())
    }

    pub(crate) fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// `audio/webm;codecs=opus` -> `audio/webm`
pub fn mime_essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_stream() -> MediaStream {
        MediaStream::new(
            vec![
                MediaTrack::new(TrackKind::Audio, "mic"),
                MediaTrack::new(TrackKind::Video, "camera"),
            ],
            vec!["video/webm".to_string(), "audio/webm;codecs=opus".to_string()],
        )
    }

    #[test]
    fn test_supports_ignores_parameters() {
        let stream = test_stream();
        assert!(stream.supports("audio/webm"));
        assert!(stream.supports("VIDEO/WEBM; codecs=vp8"));
        assert!(!stream.supports("video/mp4"));
    }

    #[test]
    fn test_audio_only_shares_tracks() {
        let stream = test_stream();
        let audio = stream.audio_only();

        assert_eq!(audio.tracks().len(), 1);
        assert!(audio.has_kind(TrackKind::Audio));
        assert_eq!(audio.supported_mime_types(), ["audio/webm;codecs=opus"]);

        stream.stop_all();
        assert!(!audio.is_live());
    }

    #[tokio::test]
    async fn test_push_after_stop_is_discarded() {
        let track = MediaTrack::new(TrackKind::Audio, "mic");
        let mut rx = track.subscribe();

        assert_eq!(track.push_chunk(Bytes::from_static(b"abc")), 1);
        track.stop();
        assert_eq!(track.push_chunk(Bytes::from_static(b"def")), 0);

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"abc"));
        assert!(rx.try_recv().is_err());
        track.stopped().await;
    }
}
