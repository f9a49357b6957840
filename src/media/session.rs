//! Scoped camera/microphone acquisition
//!
//! A `MediaSession` owns at most one live stream. Recorders only borrow the
//! stream; releasing (stopping tracks) happens here and nowhere else.

use crate::capture::{DeviceError, MediaConstraints, MediaDevices, MediaStream};
use std::sync::Arc;

/// Owner of the interview's single live stream
pub struct MediaSession {
    devices: Arc<dyn MediaDevices>,
    constraints: MediaConstraints,
    stream: Option<MediaStream>,
}

impl MediaSession {
    pub fn new(devices: Arc<dyn MediaDevices>, constraints: MediaConstraints) -> Self {
        Self {
            devices,
            constraints,
            stream: None,
        }
    }

    /// Open a fresh stream, releasing any previous one first
    pub async fn acquire(&mut self, constraints: &MediaConstraints) -> Result<MediaStream, DeviceError> {
        if self.stream.is_some() {
            tracing::debug!("Re-acquiring media; releasing the previous stream first");
            self.release();
        }

        tracing::info!("Acquiring media via {} backend", self.devices.backend_name());
        let stream = self.devices.open(constraints).await.map_err(|e| {
            tracing::warn!("Media acquisition failed: {}", e);
            e
        })?;

        self.constraints = constraints.clone();
        self.stream = Some(stream.clone());
        Ok(stream)
    }

    /// Reuse the live stream, or acquire one with the session's constraints
    pub async fn ensure_live(&mut self) -> Result<MediaStream, DeviceError> {
        if let Some(stream) = &self.stream {
            if stream.is_live() {
                return Ok(stream.clone());
            }
        }
        let constraints = self.constraints.clone();
        self.acquire(&constraints).await
    }

    pub fn stream(&self) -> Option<&MediaStream> {
        self.stream.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.stream.as_ref().map(|s| s.is_live()).unwrap_or(false)
    }

    /// Stop every track. Safe to call any number of times.
    pub fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop_all();
            tracing::info!("Released media stream {}", stream.id());
        }
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.release();
    }
}
