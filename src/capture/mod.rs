//! Camera and microphone capture
//!
//! This module provides the device abstraction and its backends.

pub mod stream;
pub mod synthetic;
pub mod traits;

#[cfg(feature = "microphone")]
pub mod microphone;

// Re-export traits
pub use stream::{mime_essence, MediaStream, MediaTrack};
pub use synthetic::SyntheticDevices;
pub use traits::{
    DeviceError, DeviceInfo, MediaConstraints, MediaDevices, PermissionState, Resolution,
    TrackKind,
};

#[cfg(feature = "microphone")]
pub use microphone::MicrophoneDevices;
