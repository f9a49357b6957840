//! Interview server API
//!
//! Wire types, the backend trait, its HTTP client and the upload retry policy.

pub mod backend;
pub mod client;
pub mod error;
pub mod retry;
pub mod types;

#[cfg(test)]
pub mod mock;

pub use backend::{AnalysisStatus, AnswerOutcome, InterviewBackend, NextStep};
pub use client::HttpBackend;
pub use error::{ApiError, ApiResult};
pub use retry::{with_upload_retry, UploadRetry};
