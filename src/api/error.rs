//! Backend call errors

use thiserror::Error;

/// Typed failure of one backend call.
///
/// Expected HTTP error statuses come back as `Server`, never as a panic or
/// an untyped error, so callers can branch on them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status}: {reason}")]
    Server { status: u16, reason: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Network failures and 5xx responses may succeed on a second attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
