//! In-process capture backend
//!
//! Produces deterministic chunks instead of touching real hardware. Used by
//! the terminal driver when no device backend is compiled in, and by tests.

use super::stream::{MediaStream, MediaTrack};
use super::traits::{
    DeviceError, DeviceInfo, MediaConstraints, MediaDevices, PermissionState, TrackKind,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Synthetic camera + microphone
pub struct SyntheticDevices {
    permission: PermissionState,
    has_camera: bool,
    chunk_interval: Option<Duration>,
    chunk_size: usize,
    mime_types: Vec<String>,
    fail_next_open: Mutex<Option<DeviceError>>,
    opened: Mutex<Vec<MediaStream>>,
}

impl SyntheticDevices {
    /// Camera + microphone, permission granted, chunks every 100ms
    pub fn new() -> Self {
        Self {
            permission: PermissionState::Granted,
            has_camera: true,
            chunk_interval: Some(DEFAULT_CHUNK_INTERVAL),
            chunk_size: DEFAULT_CHUNK_SIZE,
            mime_types: vec![
                "video/webm;codecs=vp8,opus".to_string(),
                "audio/webm;codecs=opus".to_string(),
            ],
            fail_next_open: Mutex::new(None),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Tracks produce nothing on their own; chunks are pushed by the caller
    pub fn manual() -> Self {
        Self {
            chunk_interval: None,
            ..Self::new()
        }
    }

    pub fn with_permission(mut self, permission: PermissionState) -> Self {
        self.permission = permission;
        self
    }

    pub fn without_camera(mut self) -> Self {
        self.has_camera = false;
        self
    }

    pub fn with_chunks(mut self, interval: Duration, size: usize) -> Self {
        self.chunk_interval = Some(interval);
        self.chunk_size = size.max(1);
        self
    }

    pub fn with_mime_types(mut self, mime_types: Vec<String>) -> Self {
        self.mime_types = mime_types;
        self
    }

    /// Make the next `open` fail once
    pub fn fail_next_open(&self, error: DeviceError) {
        *self.fail_next_open.lock() = Some(error);
    }

    /// Every stream opened so far, oldest first
    pub fn opened_streams(&self) -> Vec<MediaStream> {
        self.opened.lock().clone()
    }

    fn spawn_producer(&self, track: Arc<MediaTrack>, interval: Duration) {
        let size = self.chunk_size;
        let token = track.stop_token();
        tokio::spawn(async move {
            let mut sequence: u8 = 0;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        track.push_chunk(Bytes::from(vec![sequence; size]));
                        sequence = sequence.wrapping_add(1);
                    }
                }
            }
            tracing::trace!("Synthetic producer for track {} finished", track.id());
        });
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    fn backend_name(&self) -> &str {
        "synthetic"
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        let mut devices = vec![DeviceInfo {
            id: "synthetic-mic".to_string(),
            name: "Synthetic Microphone".to_string(),
            kind: TrackKind::Audio,
            is_default: true,
        }];
        if self.has_camera {
            devices.push(DeviceInfo {
                id: "synthetic-camera".to_string(),
                name: "Synthetic Camera".to_string(),
                kind: TrackKind::Video,
                is_default: true,
            });
        }
        Ok(devices)
    }

    async fn check_permission(&self) -> PermissionState {
        self.permission
    }

    async fn open(&self, constraints: &MediaConstraints) -> Result<MediaStream, DeviceError> {
        if let Some(error) = self.fail_next_open.lock().take() {
            return Err(error);
        }
        if self.permission == PermissionState::Denied {
            return Err(DeviceError::PermissionDenied(
                "synthetic permission is denied".to_string(),
            ));
        }
        if constraints.video.is_some() && !self.has_camera {
            return Err(DeviceError::NotFound("no camera attached".to_string()));
        }

        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack::new(TrackKind::Audio, "Synthetic Microphone"));
        }
        if constraints.video.is_some() {
            tracks.push(MediaTrack::new(TrackKind::Video, "Synthetic Camera"));
        }
        if tracks.is_empty() {
            return Err(DeviceError::NotFound(
                "constraints requested neither audio nor video".to_string(),
            ));
        }

        if let Some(interval) = self.chunk_interval {
            for track in &tracks {
                self.spawn_producer(track.clone(), interval);
            }
        }

        let stream = MediaStream::new(tracks, self.mime_types.clone());
        tracing::debug!(
            "Opened synthetic stream {} with {} tracks",
            stream.id(),
            stream.tracks().len()
        );
        self.opened.lock().push(stream.clone());
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_denied_permission() {
        let devices = SyntheticDevices::manual().with_permission(PermissionState::Denied);
        let result = devices.open(&MediaConstraints::default()).await;
        assert!(matches!(result, Err(DeviceError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_missing_camera() {
        let devices = SyntheticDevices::manual().without_camera();
        let result = devices.open(&MediaConstraints::default()).await;
        assert!(matches!(result, Err(DeviceError::NotFound(_))));

        let audio_only = MediaConstraints {
            video: None,
            ..MediaConstraints::default()
        };
        let stream = devices.open(&audio_only).await.unwrap();
        assert_eq!(stream.tracks().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_next_open_only_once() {
        let devices = SyntheticDevices::manual();
        devices.fail_next_open(DeviceError::Busy("in use".to_string()));

        assert!(devices.open(&MediaConstraints::default()).await.is_err());
        assert!(devices.open(&MediaConstraints::default()).await.is_ok());
        assert_eq!(devices.opened_streams().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_producer_stops_with_track() {
        let devices = SyntheticDevices::new().with_chunks(Duration::from_millis(10), 8);
        let stream = devices.open(&MediaConstraints::default()).await.unwrap();
        let mut rx = stream.tracks()[0].subscribe();

        let chunk = rx.recv().await.unwrap();
        assert_eq!(chunk.len(), 8);

        stream.stop_all();
        for track in stream.tracks() {
            track.stopped().await;
        }
        assert!(stream.all_tracks_stopped());
    }
}
