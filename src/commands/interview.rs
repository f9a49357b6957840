//! Interview commands
//!
//! Thin wrappers over `InterviewController` plus the stand-alone backend
//! queries (analysis polling, question audio, session status).

use crate::api::{HttpBackend, InterviewBackend};
use crate::capture::MediaDevices;
use crate::config::InterviewConfig;
use crate::interview::{
    AnalysisPoller, AnalysisResult, AnswerProgress, AnswerReceipt, FlowEvent, FlowState,
    InterviewController, PollOutcome, SessionRequest, SessionStatus,
};
use crate::storage::RecordingCache;
use crate::utils::{AppError, ErrorResponse};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Application state for the interview
pub struct InterviewState {
    pub controller: Arc<InterviewController>,
    pub backend: Arc<dyn InterviewBackend>,
    pub devices: Arc<dyn MediaDevices>,
}

impl InterviewState {
    pub fn new(
        config: InterviewConfig,
        backend: Arc<dyn InterviewBackend>,
        devices: Arc<dyn MediaDevices>,
    ) -> Self {
        let cache = RecordingCache::new(config.storage.cache_dir.clone());
        let controller = InterviewController::new(config, backend.clone(), devices.clone()).with_cache(cache);
        Self {
            controller: Arc::new(controller),
            backend,
            devices,
        }
    }

    /// State talking to the HTTP backend named in `config`
    pub fn with_http(config: InterviewConfig, devices: Arc<dyn MediaDevices>) -> Result<Self, ErrorResponse> {
        let backend = HttpBackend::from_config(&config.api).map_err(AppError::from)?;
        Ok(Self::new(config, Arc::new(backend), devices))
    }
}

/// Create the session and load the first questions
pub async fn start_interview(state: &InterviewState, request: SessionRequest) -> Result<FlowState, ErrorResponse> {
    tracing::info!("Starting interview");
    state.controller.start(request).await?;
    Ok(state.controller.state())
}

pub async fn begin_answer(state: &InterviewState) -> Result<FlowState, ErrorResponse> {
    state.controller.begin_answer().await?;
    Ok(state.controller.state())
}

pub async fn end_answer(state: &InterviewState) -> Result<AnswerProgress, ErrorResponse> {
    Ok(state.controller.end_answer().await?)
}

pub async fn resubmit_answer(state: &InterviewState) -> Result<AnswerProgress, ErrorResponse> {
    Ok(state.controller.resubmit_answer().await?)
}

pub async fn end_interview(state: &InterviewState) -> Result<FlowState, ErrorResponse> {
    state.controller.end_interview().await?;
    Ok(state.controller.state())
}

pub async fn retry_analysis(state: &InterviewState) -> Result<FlowState, ErrorResponse> {
    state.controller.retry_analysis().await?;
    Ok(state.controller.state())
}

/// Take the recovery action offered by the current error state
pub async fn recover(state: &InterviewState) -> Result<FlowState, ErrorResponse> {
    Ok(state.controller.recover().await?)
}

pub async fn abandon_interview(state: &InterviewState) -> Result<FlowState, ErrorResponse> {
    state.controller.abandon().await;
    Ok(state.controller.state())
}

pub fn get_flow_state(state: &InterviewState) -> FlowState {
    state.controller.state()
}

pub fn subscribe_events(state: &InterviewState) -> broadcast::Receiver<FlowEvent> {
    state.controller.subscribe()
}

pub fn get_answer_receipts(state: &InterviewState) -> Vec<AnswerReceipt> {
    state.controller.receipts()
}

/// Wait for the running analysis to settle
pub async fn wait_for_results(state: &InterviewState) -> FlowState {
    state.controller.wait_for_analysis().await
}

/// Audio URL for question `index` of the current interview
pub async fn get_question_audio(state: &InterviewState, index: usize) -> Result<String, ErrorResponse> {
    Ok(state.controller.question_audio(index).await?)
}

/// Audio URL for any persisted question
pub async fn get_question_audio_by_id(state: &InterviewState, question_id: &str) -> Result<String, ErrorResponse> {
    let url = state.backend.question_audio(question_id).await.map_err(AppError::from)?;
    Ok(url)
}

pub async fn get_session_status(state: &InterviewState, session_id: &str) -> Result<SessionStatus, ErrorResponse> {
    let status = state.backend.session_status(session_id).await.map_err(AppError::from)?;
    Ok(status)
}

/// Poll an already uploaded video until its analysis settles
pub async fn poll_video_analysis(
    state: &InterviewState,
    video_id: &str,
    cancel: &CancellationToken,
) -> Result<AnalysisResult, ErrorResponse> {
    let analysis = &state.controller.config().analysis;
    let poller = AnalysisPoller::new(state.backend.clone())
        .with_interval(analysis.poll_interval())
        .with_max_attempts(analysis.max_attempts);

    let outcome = poller
        .poll_until_done(video_id, cancel, |attempt| {
            tracing::debug!("Polling analysis of {} (attempt {})", video_id, attempt);
        })
        .await;

    let err = match outcome {
        PollOutcome::Completed(result) => return Ok(result),
        PollOutcome::Failed(reason) => AppError::AnalysisFailed(reason),
        PollOutcome::TimedOut { attempts } => AppError::Timeout { attempts },
        PollOutcome::Cancelled => AppError::Cancelled,
    };
    Err(err.into())
}
