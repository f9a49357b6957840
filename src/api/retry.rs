//! Upload retry policy

use super::error::ApiResult;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// What to do when an upload fails on the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadRetry {
    /// Retry once before surfacing the failure
    #[default]
    AutomaticOnce,
    /// Surface the first failure; the user decides
    Manual,
}

/// Run `op`, repeating it once after a network failure when the policy allows.
///
/// Only `Network` errors are retried; a server that answered has made up
/// its mind.
pub async fn with_upload_retry<T, F, Fut>(policy: UploadRetry, label: &str, mut op: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    match op().await {
        Err(err) if err.is_network() && policy == UploadRetry::AutomaticOnce => {
            tracing::warn!("{} failed ({}), retrying once", label, err);
            op().await
        }
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn flaky(calls: &AtomicU32, failures: u32, error: ApiError) -> ApiResult<u32> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= failures {
            Err(error)
        } else {
            Ok(n)
        }
    }

    #[tokio::test]
    async fn test_automatic_once_recovers_from_blip() {
        let calls = AtomicU32::new(0);
        let result = with_upload_retry(UploadRetry::AutomaticOnce, "upload", || {
            flaky(&calls, 1, ApiError::Network("reset".to_string()))
        })
        .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn test_retries_at_most_once() {
        let calls = AtomicU32::new(0);
        let result = with_upload_retry(UploadRetry::AutomaticOnce, "upload", || {
            flaky(&calls, 5, ApiError::Network("reset".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_manual_and_server_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let _ = with_upload_retry(UploadRetry::Manual, "upload", || {
            flaky(&calls, 1, ApiError::Network("reset".to_string()))
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let calls = AtomicU32::new(0);
        let _ = with_upload_retry(UploadRetry::AutomaticOnce, "upload", || {
            flaky(
                &calls,
                1,
                ApiError::Server {
                    status: 422,
                    reason: "bad audio".to_string(),
                },
            )
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
