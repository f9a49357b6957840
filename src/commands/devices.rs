//! Device commands

use super::InterviewState;
use crate::capture::{DeviceInfo, PermissionState};
use crate::utils::{AppError, ErrorResponse};

/// List available cameras and microphones
pub async fn list_devices(state: &InterviewState) -> Result<Vec<DeviceInfo>, ErrorResponse> {
    let devices = state.devices.list_devices().await.map_err(AppError::from)?;
    tracing::debug!(
        "Found {} capture devices via {}",
        devices.len(),
        state.devices.backend_name()
    );
    Ok(devices)
}

/// Current capture permission; never prompts
pub async fn check_permission(state: &InterviewState) -> PermissionState {
    state.devices.check_permission().await
}

/// Whether the interview's camera/microphone stream is currently open
pub async fn is_media_live(state: &InterviewState) -> bool {
    state.controller.media_is_live().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::ScriptedBackend;
    use crate::capture::{SyntheticDevices, TrackKind};
    use crate::config::InterviewConfig;
    use std::sync::Arc;

    fn state(devices: SyntheticDevices) -> InterviewState {
        InterviewState::new(
            InterviewConfig::default(),
            Arc::new(ScriptedBackend::new()),
            Arc::new(devices),
        )
    }

    #[tokio::test]
    async fn test_lists_synthetic_devices() {
        let devices = list_devices(&state(SyntheticDevices::new())).await.unwrap();
        assert!(devices.iter().any(|d| d.kind == TrackKind::Audio));
        assert!(devices.iter().any(|d| d.kind == TrackKind::Video));

        let devices = list_devices(&state(SyntheticDevices::new().without_camera()))
            .await
            .unwrap();
        assert!(devices.iter().all(|d| d.kind == TrackKind::Audio));
    }

    #[tokio::test]
    async fn test_permission_is_reported_without_opening() {
        let state = state(SyntheticDevices::new().with_permission(PermissionState::Denied));
        assert_eq!(check_permission(&state).await, PermissionState::Denied);
        assert!(!is_media_live(&state).await);
    }
}
