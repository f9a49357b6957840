//! Microphone capture using cpal
//!
//! Captures the default (or a named) input device and delivers 16-bit
//! little-endian PCM chunks. There is no camera on this backend; requests
//! for video are answered with an audio-only stream.

use super::stream::{MediaStream, MediaTrack};
use super::traits::{
    DeviceError, DeviceInfo, MediaConstraints, MediaDevices, PermissionState, TrackKind,
};
use async_trait::async_trait;
use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// cpal-backed microphone
#[derive(Debug, Default)]
pub struct MicrophoneDevices;

impl MicrophoneDevices {
    pub fn new() -> Self {
        Self
    }
}

fn find_input_device(device_id: Option<&str>) -> Result<Device, DeviceError> {
    let host = cpal::default_host();
    match device_id {
        None => host
            .default_input_device()
            .ok_or_else(|| DeviceError::NotFound("No default input device".to_string())),
        Some(wanted) => host
            .input_devices()
            .map_err(|e| DeviceError::Platform(format!("Failed to enumerate devices: {}", e)))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| DeviceError::NotFound(format!("Input device '{}' not found", wanted))),
    }
}

fn samples_to_bytes<I: Iterator<Item = i16>>(samples: I) -> Bytes {
    let mut buf = Vec::new();
    for sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }
    Bytes::from(buf)
}

fn map_build_error(err: cpal::BuildStreamError) -> DeviceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            DeviceError::Busy("Input device is not available".to_string())
        }
        other => DeviceError::Platform(format!("Failed to build input stream: {}", other)),
    }
}

/// Runs the cpal stream on its own thread (cpal streams are not `Send`)
/// until the track is stopped.
fn run_capture_thread(
    device_id: Option<String>,
    track: Arc<MediaTrack>,
    ready: oneshot::Sender<Result<(u32, u16), DeviceError>>,
) {
    let setup = (|| {
        let device = find_input_device(device_id.as_deref())?;
        let supported = device.default_input_config().map_err(|e| {
            DeviceError::Platform(format!("Failed to get input config: {}", e))
        })?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let err_fn = |err: cpal::StreamError| tracing::error!("Microphone stream error: {}", err);

        let stream = match sample_format {
            SampleFormat::F32 => {
                let track = track.clone();
                device
                    .build_input_stream(
                        &config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            let pcm = data
                                .iter()
                                .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
                            track.push_chunk(samples_to_bytes(pcm));
                        },
                        err_fn,
                        None,
                    )
                    .map_err(map_build_error)?
            }
            SampleFormat::I16 => {
                let track = track.clone();
                device
                    .build_input_stream(
                        &config,
                        move |data: &[i16], _: &cpal::InputCallbackInfo| {
                            track.push_chunk(samples_to_bytes(data.iter().copied()));
                        },
                        err_fn,
                        None,
                    )
                    .map_err(map_build_error)?
            }
            other => {
                return Err(DeviceError::Platform(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| DeviceError::Platform(format!("Failed to start input stream: {}", e)))?;
        Ok((stream, config.sample_rate.0, config.channels))
    })();

    match setup {
        Ok((stream, sample_rate, channels)) => {
            let _ = ready.send(Ok((sample_rate, channels)));
            let token = track.stop_token();
            while !token.is_cancelled() {
                std::thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
            tracing::info!("Microphone capture thread finished");
        }
        Err(e) => {
            let _ = ready.send(Err(e));
        }
    }
}

#[async_trait]
impl MediaDevices for MicrophoneDevices {
    fn backend_name(&self) -> &str {
        "microphone"
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());
        let devices = host
            .input_devices()
            .map_err(|e| DeviceError::Platform(format!("Failed to enumerate devices: {}", e)))?;

        Ok(devices
            .filter_map(|d| d.name().ok())
            .map(|name| DeviceInfo {
                id: name.clone(),
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                kind: TrackKind::Audio,
            })
            .collect())
    }

    async fn check_permission(&self) -> PermissionState {
        // Desktop platforms prompt on first capture; a visible device is the
        // best signal available without opening it.
        if cpal::default_host().default_input_device().is_some() {
            PermissionState::Prompt
        } else {
            PermissionState::Denied
        }
    }

    async fn open(&self, constraints: &MediaConstraints) -> Result<MediaStream, DeviceError> {
        if !constraints.audio {
            return Err(DeviceError::NotFound(
                "The microphone backend has no camera".to_string(),
            ));
        }
        if constraints.video.is_some() {
            tracing::warn!("Camera requested but the microphone backend is audio-only");
        }

        let track = MediaTrack::new(TrackKind::Audio, "Microphone");
        let (ready_tx, ready_rx) = oneshot::channel();
        let device_id = constraints.audio_device_id.clone();
        let thread_track = track.clone();
        std::thread::Builder::new()
            .name("microphone-capture".to_string())
            .spawn(move || run_capture_thread(device_id, thread_track, ready_tx))
            .map_err(|e| DeviceError::Platform(format!("Failed to spawn capture thread: {}", e)))?;

        let (sample_rate, channels) = ready_rx
            .await
            .map_err(|_| DeviceError::Platform("Capture thread exited early".to_string()))??;

        tracing::info!(
            "Microphone stream opened ({}Hz, {}ch)",
            sample_rate,
            channels
        );

        Ok(MediaStream::new(
            vec![track],
            vec![format!(
                "audio/L16;rate={};channels={}",
                sample_rate, channels
            )],
        ))
    }
}
