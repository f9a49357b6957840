//! Error types and handling
//!
//! Common error types used across the application.

use crate::api::ApiError;
use crate::capture::DeviceError;
use crate::interview::state::Stage;
use crate::recorder::RecorderError;
use crate::storage::CacheError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Recording error: {0}")]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Cannot {action} while {stage:?}")]
    InvalidTransition { stage: Stage, action: String },

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Analysis timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Whether the smallest restart unit (the same call or the same recording)
    /// can succeed on a second attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Api(err) => err.is_retryable(),
            AppError::Recorder(RecorderError::EmptyRecording) => true,
            AppError::Timeout { .. } | AppError::AnalysisFailed(_) => true,
            AppError::Busy(_) => true,
            _ => false,
        }
    }

    /// Human-readable message shown next to the recovery action.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Device(DeviceError::PermissionDenied(_)) => {
                "Camera or microphone access was denied. Allow access and try again.".to_string()
            }
            AppError::Device(DeviceError::NotFound(_)) => {
                "No camera or microphone was found. Connect a device and try again.".to_string()
            }
            AppError::Device(DeviceError::Busy(_)) => {
                "The camera or microphone is in use by another application.".to_string()
            }
            AppError::Recorder(RecorderError::EmptyRecording) => {
                "Nothing was recorded. Please record your answer again.".to_string()
            }
            AppError::Recorder(RecorderError::UnsupportedFormat(_)) => {
                "This device cannot record in a supported format. Try another device.".to_string()
            }
            AppError::Api(ApiError::Server { reason, .. }) => reason.clone(),
            AppError::Api(ApiError::Network(_)) => {
                "Could not reach the interview server. Check your connection and retry.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Error response for frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Device(_) => "DEVICE_ERROR",
            AppError::Recorder(RecorderError::UnsupportedFormat(_)) => "UNSUPPORTED_FORMAT",
            AppError::Recorder(RecorderError::EmptyRecording) => "EMPTY_RECORDING",
            AppError::Recorder(RecorderError::AlreadyRecording) => "ALREADY_RECORDING",
            AppError::Recorder(_) => "RECORDING_ERROR",
            AppError::Api(ApiError::Network(_)) => "NETWORK_ERROR",
            AppError::Api(ApiError::Server { .. }) => "SERVER_ERROR",
            AppError::Api(ApiError::MalformedResponse(_)) => "MALFORMED_RESPONSE",
            AppError::Api(ApiError::InvalidRequest(_)) => "INVALID_REQUEST",
            AppError::Cache(_) => "CACHE_ERROR",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::Busy(_) => "BUSY",
            AppError::Timeout { .. } => "TIMEOUT",
            AppError::AnalysisFailed(_) => "ANALYSIS_FAILED",
            AppError::Cancelled => "CANCELLED",
            AppError::Config(_) => "CONFIG_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            retryable: error.is_retryable(),
            message: error.user_message(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
