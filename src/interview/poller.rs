//! Analysis poller
//!
//! Turns the server's asynchronous analysis job into one terminal outcome.

use super::types::AnalysisResult;
use crate::api::{AnalysisStatus, InterviewBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How polling ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(AnalysisResult),
    Failed(String),
    /// The attempt budget ran out
    TimedOut { attempts: u32 },
    Cancelled,
}

pub struct AnalysisPoller {
    backend: Arc<dyn InterviewBackend>,
    interval: Duration,
    max_attempts: u32,
}

impl AnalysisPoller {
    pub fn new(backend: Arc<dyn InterviewBackend>) -> Self {
        Self {
            backend,
            interval: Duration::from_secs(2),
            max_attempts: 90,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Query the job status until it completes, fails, or the attempt budget
    /// is spent.
    ///
    /// Exactly one status query is made per attempt. Query errors count as an
    /// attempt and polling continues. Cancelling `cancel` stops the loop
    /// before the next query; no sleep outlives it.
    pub async fn poll_until_done(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
        mut on_attempt: impl FnMut(u32) + Send,
    ) -> PollOutcome {
        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled;
            }
            on_attempt(attempt);

            let status = tokio::select! {
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                status = self.backend.analysis_status(video_id) => status,
            };

            match status {
                Ok(AnalysisStatus::Completed(result)) => {
                    tracing::info!("Analysis of {} completed after {} attempts", video_id, attempt);
                    return PollOutcome::Completed(result);
                }
                Ok(AnalysisStatus::Failed(reason)) => {
                    let reason = reason.unwrap_or_else(|| "Analysis failed".to_string());
                    tracing::warn!("Analysis of {} failed: {}", video_id, reason);
                    return PollOutcome::Failed(reason);
                }
                Ok(status) => {
                    tracing::debug!(
                        "Analysis of {} still {:?} (attempt {}/{})",
                        video_id,
                        status,
                        attempt,
                        self.max_attempts
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        "Status query for {} failed (attempt {}/{}): {}",
                        video_id,
                        attempt,
                        self.max_attempts,
                        err
                    );
                }
            }

            if attempt < self.max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return PollOutcome::Cancelled,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        tracing::warn!(
            "Gave up on analysis of {} after {} attempts",
            video_id,
            self.max_attempts
        );
        PollOutcome::TimedOut {
            attempts: self.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::ScriptedBackend;
    use crate::api::ApiError;
    use crate::interview::types::Capability;
    use tokio::time::Instant;

    fn poller(backend: Arc<ScriptedBackend>, max_attempts: u32) -> AnalysisPoller {
        AnalysisPoller::new(backend)
            .with_interval(Duration::from_millis(500))
            .with_max_attempts(max_attempts)
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_exactly_max_attempts() {
        let backend = Arc::new(ScriptedBackend::new());
        let started = Instant::now();
        let mut seen = Vec::new();

        let outcome = poller(backend.clone(), 5)
            .poll_until_done("v1", &CancellationToken::new(), |n| seen.push(n))
            .await;

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 5 });
        assert_eq!(backend.status_queries(), 5);
        assert_eq!(seen, [1, 2, 3, 4, 5]);
        // Four sleeps between five queries, none after the last
        assert_eq!(started.elapsed(), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_do_not_abort() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Err(ApiError::Network("blip".to_string())));
        backend.push_status(Ok(AnalysisStatus::Pending));
        backend.push_status(Ok(AnalysisStatus::Completed(AnalysisResult {
            capabilities: vec![Capability {
                skill: "Communication".to_string(),
                value: 85.0,
            }],
            ..AnalysisResult::default()
        })));

        let outcome = poller(backend.clone(), 10)
            .poll_until_done("v1", &CancellationToken::new(), |_| {})
            .await;

        match outcome {
            PollOutcome::Completed(result) => assert_eq!(result.capabilities[0].value, 85.0),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(backend.status_queries(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_surfaces_reason() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(AnalysisStatus::Failed(Some("no face detected".to_string()))));

        let outcome = poller(backend, 10)
            .poll_until_done("v1", &CancellationToken::new(), |_| {})
            .await;
        assert_eq!(outcome, PollOutcome::Failed("no face detected".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_further_queries() {
        let backend = Arc::new(ScriptedBackend::new());
        let cancel = CancellationToken::new();
        let poller = poller(backend.clone(), 100);

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { poller.poll_until_done("v1", &cancel, |_| {}).await })
        };

        tokio::time::sleep(Duration::from_millis(1200)).await;
        cancel.cancel();
        let outcome = task.await.unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled);
        let queries = backend.status_queries();
        assert_eq!(queries, 3);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(backend.status_queries(), queries);
    }
}
