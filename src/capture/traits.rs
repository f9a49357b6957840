//! Capture trait definitions
//!
//! Platform-agnostic traits for camera and microphone sources.

use super::stream::MediaStream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Device acquisition errors
///
/// These are terminal for the current attempt: callers offer a retry action
/// instead of prompting again on their own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Device busy: {0}")]
    Busy(String),

    #[error("Platform error: {0}")]
    Platform(String),
}

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    /// MIME top-level type for this kind
    pub fn mime_prefix(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio/",
            TrackKind::Video => "video/",
        }
    }
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// What to acquire when opening a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaConstraints {
    /// Capture a microphone track
    pub audio: bool,

    /// Capture a camera track at this resolution
    pub video: Option<Resolution>,

    /// Specific microphone (default device if `None`)
    pub audio_device_id: Option<String>,

    /// Specific camera (default device if `None`)
    pub video_device_id: Option<String>,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: Some(Resolution {
                width: 1280,
                height: 720,
            }),
            audio_device_id: None,
            video_device_id: None,
        }
    }
}

/// Information about a capture device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// What the device captures
    pub kind: TrackKind,

    /// Whether this is the default device
    pub is_default: bool,
}

/// Capture permission as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not decided yet; opening a stream will prompt
    Prompt,
}

/// A source of live camera/microphone streams
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Short backend name for logs
    fn backend_name(&self) -> &str;

    /// Enumerate available capture devices
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError>;

    /// Current permission state (never prompts)
    async fn check_permission(&self) -> PermissionState;

    /// Open a live stream matching the constraints.
    ///
    /// This is where the platform permission prompt happens.
    async fn open(&self, constraints: &MediaConstraints) -> Result<MediaStream, DeviceError>;
}
