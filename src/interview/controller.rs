//! Interview flow controller
//!
//! Drives WAITING -> INTERVIEWING -> ANALYZING -> COMPLETE. Each operation
//! claims the flow state synchronously (flags on `FlowState`) before its
//! first suspension point, then maps every failure into a state the UI can
//! render with a single recovery action.

use super::poller::{AnalysisPoller, PollOutcome};
use super::state::{FlowCommand, FlowEvent, FlowState, FlowStateHandle, Recovery, Stage};
use super::types::{
    AnswerReceipt, AnswerSegment, InterviewSession, Question, QuestionId, QuestionList,
    SessionRequest,
};
use crate::api::{with_upload_retry, ApiError, InterviewBackend, NextStep};
use crate::capture::{MediaDevices, MediaStream, TrackKind};
use crate::config::InterviewConfig;
use crate::media::MediaSession;
use crate::recorder::{MediaBlob, RecorderError, SegmentRecorder};
use crate::storage::RecordingCache;
use crate::utils::{AppError, AppResult};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Where the interview stands after an accepted answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AnswerProgress {
    NextQuestion { index: usize, question: Question },
    /// The interview ended and analysis has started
    Finished,
}

/// Owns the media session, recorders and analysis task of one interview
pub struct InterviewController {
    config: InterviewConfig,
    backend: Arc<dyn InterviewBackend>,
    state: FlowStateHandle,

    /// Set once `start` succeeds; never mutated afterwards
    session: RwLock<Option<InterviewSession>>,

    media: tokio::sync::Mutex<MediaSession>,
    answer_recorder: tokio::sync::Mutex<SegmentRecorder>,
    session_recorder: tokio::sync::Mutex<SegmentRecorder>,

    /// Last captured answer, kept until the server accepts it
    retained_answer: Mutex<Option<AnswerSegment>>,
    /// Session video whose upload failed
    retained_video: Mutex<Option<MediaBlob>>,
    receipts: RwLock<Vec<AnswerReceipt>>,
    cache: Option<RecordingCache>,

    starting: AtomicBool,
    /// Bumped by `abandon`; work started under an older epoch is discarded
    epoch: AtomicU64,
    poll_cancel: Mutex<CancellationToken>,
    analysis_task: Mutex<Option<JoinHandle<()>>>,
}

impl InterviewController {
    pub fn new(
        config: InterviewConfig,
        backend: Arc<dyn InterviewBackend>,
        devices: Arc<dyn MediaDevices>,
    ) -> Self {
        let constraints = config.recording.constraints();
        Self {
            backend,
            state: FlowStateHandle::new(),
            session: RwLock::new(None),
            media: tokio::sync::Mutex::new(MediaSession::new(devices, constraints)),
            answer_recorder: tokio::sync::Mutex::new(SegmentRecorder::new("answer")),
            session_recorder: tokio::sync::Mutex::new(SegmentRecorder::new("session-video")),
            retained_answer: Mutex::new(None),
            retained_video: Mutex::new(None),
            receipts: RwLock::new(Vec::new()),
            cache: None,
            starting: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            poll_cancel: Mutex::new(CancellationToken::new()),
            analysis_task: Mutex::new(None),
            config,
        }
    }

    /// Keep the session video in a local cache for playback
    pub fn with_cache(mut self, cache: RecordingCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &InterviewConfig {
        &self.config
    }

    pub fn state(&self) -> FlowState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<FlowEvent> {
        self.state.subscribe()
    }

    pub fn session(&self) -> Option<InterviewSession> {
        self.session.read().clone()
    }

    /// Receipts of accepted answers, oldest first
    pub fn receipts(&self) -> Vec<AnswerReceipt> {
        self.receipts.read().clone()
    }

    pub fn has_retained_answer(&self) -> bool {
        self.retained_answer.lock().is_some()
    }

    pub async fn media_is_live(&self) -> bool {
        self.media.lock().await.is_live()
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn still_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    fn report(&self, stage: Stage, err: &AppError) {
        tracing::error!("{} failed: {}", stage, err);
        self.state.emit(FlowEvent::Error {
            stage,
            message: err.user_message(),
        });
    }

    /// Create the session and load its questions.
    ///
    /// On failure the flow stays in `Waiting` and nothing of the attempt is
    /// kept.
    pub async fn start(&self, request: SessionRequest) -> AppResult<()> {
        self.state.snapshot().check(FlowCommand::Start)?;
        if self.starting.swap(true, Ordering::SeqCst) {
            return Err(AppError::Busy("the interview is already starting".to_string()));
        }

        let epoch = self.epoch();
        let result = self.open_session(&request).await;
        self.starting.store(false, Ordering::SeqCst);

        let (session, questions) = match result {
            Ok(opened) => opened,
            Err(err) => {
                self.report(Stage::Waiting, &err);
                return Err(err);
            }
        };
        if !self.still_current(epoch) {
            tracing::info!("Interview abandoned while starting; dropping session {}", session.session_id);
            return Err(AppError::Cancelled);
        }

        tracing::info!(
            "Interview {} started with {} questions",
            session.session_id,
            questions.len()
        );
        *self.session.write() = Some(session);
        self.receipts.write().clear();
        self.state.transition(FlowCommand::Start, |state| {
            *state = FlowState::Interviewing {
                question_index: 0,
                questions,
                is_recording: false,
                is_submitting: false,
                last_error: None,
            };
            Ok(())
        })
    }

    async fn open_session(&self, request: &SessionRequest) -> AppResult<(InterviewSession, QuestionList)> {
        let policy = self.config.flow.upload_retry;
        let session = with_upload_retry(policy, "create session", || {
            self.backend.create_session(request)
        })
        .await?;
        let questions = with_upload_retry(policy, "list questions", || {
            self.backend.list_questions(&session.session_id)
        })
        .await?;

        if questions.is_empty() {
            return Err(ApiError::MalformedResponse(format!(
                "session {} has no questions",
                session.session_id
            ))
            .into());
        }
        let questions = QuestionList::from_server(questions);
        let max_questions = self.config.flow.max_questions;
        if questions.len() > max_questions {
            tracing::info!(
                "Session {} preloaded {} questions; keeping the first {}",
                session.session_id,
                questions.len(),
                max_questions
            );
        }
        Ok((session, questions.truncated(max_questions)))
    }

    /// Start recording the answer to the current question
    pub async fn begin_answer(&self) -> AppResult<()> {
        let index = self.state.transition(FlowCommand::BeginAnswer, |state| match state {
            FlowState::Interviewing {
                question_index,
                is_recording,
                last_error,
                ..
            } => {
                *is_recording = true;
                *last_error = None;
                Ok(*question_index)
            }
            other => Err(unexpected(other, FlowCommand::BeginAnswer)),
        })?;

        match self.start_recorders().await {
            Ok(()) => {
                tracing::info!("Recording answer to question {}", index + 1);
                Ok(())
            }
            Err(err) => {
                self.report(Stage::Interviewing, &err);
                self.state.update(|state| match state {
                    FlowState::Interviewing {
                        question_index,
                        questions,
                        ..
                    } => {
                        *state = FlowState::Error {
                            stage: Stage::Interviewing,
                            message: err.user_message(),
                            recovery: Recovery::ResumeInterview {
                                question_index: *question_index,
                                questions: questions.clone(),
                            },
                        };
                        true
                    }
                    _ => false,
                });
                Err(err)
            }
        }
    }

    async fn start_recorders(&self) -> AppResult<()> {
        // Held across the device prompt: an overlapping stop or discard waits
        // until the recorder has actually started (or failed to).
        let mut answer_recorder = self.answer_recorder.lock().await;
        let stream = self.media.lock().await.ensure_live().await?;

        if self.config.flow.record_session_video {
            self.ensure_session_video(&stream).await;
        }

        let audio = stream.audio_only();
        if audio.tracks().is_empty() {
            return Err(RecorderError::StreamEnded.into());
        }
        answer_recorder.start(&audio, Some(&self.config.recording.audio_mime))?;
        Ok(())
    }

    /// Keep one continuous recording of the whole stream running
    async fn ensure_session_video(&self, stream: &MediaStream) {
        if !stream.has_kind(TrackKind::Video) {
            return;
        }
        let mut recorder = self.session_recorder.lock().await;
        if recorder.source_ended() {
            tracing::warn!("Session video source ended; restarting the session recording");
            if let Ok(Some(partial)) = recorder.stop().await {
                *self.retained_video.lock() = Some(partial);
            }
        }
        if recorder.is_recording() {
            return;
        }
        if let Err(err) = recorder.start(stream, Some(&self.config.recording.video_mime)) {
            tracing::warn!("Session video unavailable: {}", err);
        }
    }

    /// Stop recording and submit the answer.
    ///
    /// When nothing is being recorded but a captured answer for the current
    /// question is still held from a failed submission, that answer is sent
    /// again instead.
    pub async fn end_answer(&self) -> AppResult<AnswerProgress> {
        if let FlowState::Interviewing {
            is_recording: false,
            is_submitting: false,
            ..
        } = self.state.snapshot()
        {
            if self.has_retained_answer() {
                return self.resubmit_answer().await;
            }
        }

        let question = self.state.transition(FlowCommand::EndAnswer, |state| match state {
            FlowState::Interviewing {
                question_index,
                questions,
                is_recording,
                is_submitting,
                ..
            } => {
                let question = questions
                    .get(*question_index)
                    .cloned()
                    .ok_or_else(|| unexpected_index(*question_index))?;
                *is_recording = false;
                *is_submitting = true;
                Ok(question)
            }
            other => Err(unexpected(other, FlowCommand::EndAnswer)),
        })?;

        let stopped = self.answer_recorder.lock().await.stop().await;
        let blob = match stopped {
            Ok(Some(blob)) => blob,
            Ok(None) => return Err(self.answer_failed(RecorderError::EmptyRecording.into())),
            Err(err) => return Err(self.answer_failed(err.into())),
        };

        let segment = AnswerSegment::new(&question, blob);
        *self.retained_answer.lock() = Some(segment.clone());
        self.submit_segment(question, segment).await
    }

    /// Send the held answer for the current question again
    pub async fn resubmit_answer(&self) -> AppResult<AnswerProgress> {
        let retained = self.retained_answer.lock().clone();
        let (question, segment) = self.state.transition(FlowCommand::ResubmitAnswer, |state| match state {
            FlowState::Interviewing {
                question_index,
                questions,
                is_submitting,
                last_error,
                ..
            } => {
                let question = questions
                    .get(*question_index)
                    .cloned()
                    .ok_or_else(|| unexpected_index(*question_index))?;
                let segment = retained
                    .filter(|segment| segment.answers(&question))
                    .ok_or_else(|| AppError::InvalidTransition {
                        stage: Stage::Interviewing,
                        action: "resubmit answer without a recorded answer".to_string(),
                    })?;
                *is_submitting = true;
                *last_error = None;
                Ok((question, segment))
            }
            other => Err(unexpected(other, FlowCommand::ResubmitAnswer)),
        })?;

        tracing::info!("Resubmitting held answer for {}", question.id);
        self.submit_segment(question, segment).await
    }

    async fn submit_segment(&self, question: Question, segment: AnswerSegment) -> AppResult<AnswerProgress> {
        let Some(session) = self.session() else {
            return Err(self.answer_failed(AppError::InvalidTransition {
                stage: Stage::Interviewing,
                action: "submit an answer without a session".to_string(),
            }));
        };

        let epoch = self.epoch();
        let result = with_upload_retry(self.config.flow.upload_retry, "submit answer", || {
            self.backend.submit_answer(&session, &question, &segment.blob)
        })
        .await;
        if !self.still_current(epoch) {
            return Err(AppError::Cancelled);
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.answer_failed(err.into())),
        };

        *self.retained_answer.lock() = None;
        self.receipts.write().push(outcome.receipt.clone());
        self.state.emit(FlowEvent::AnswerAccepted {
            receipt: outcome.receipt,
        });

        match outcome.next {
            NextStep::Final => {
                tracing::info!("Server ended the interview after {}", question.id);
                self.finish_interview().await?;
                Ok(AnswerProgress::Finished)
            }
            NextStep::Question(next) => match self.advance(next)? {
                Some(progress) => Ok(progress),
                None => {
                    self.finish_interview().await?;
                    Ok(AnswerProgress::Finished)
                }
            },
        }
    }

    /// Move to the next question. `None` means the interview is over.
    fn advance(&self, next: Question) -> AppResult<Option<AnswerProgress>> {
        let max_questions = self.config.flow.max_questions;
        let mut progress = None;
        let mut interviewing = false;

        self.state.update(|state| {
            let FlowState::Interviewing {
                question_index,
                questions,
                is_submitting,
                last_error,
                ..
            } = state
            else {
                return false;
            };
            interviewing = true;

            let mut next = next;
            if let QuestionId::Pending { .. } = next.id {
                let order = questions.highest_order().map(|o| o + 1).unwrap_or(0).max(next.order);
                next.order = order;
                next.id = QuestionId::Pending { order };
            }

            // Preloaded questions still come first; the new one joins the end
            let index = *question_index + 1;
            if index >= max_questions {
                tracing::info!("Reached the limit of {} questions", max_questions);
                return false;
            }
            if questions.contains(&next) {
                tracing::warn!("Server repeated question {}; not adding it again", next.id);
            } else if questions.len() >= max_questions {
                tracing::info!("Question list is full; dropping {}", next.id);
            } else {
                *questions = questions.appended(next);
            }
            if index >= questions.len() {
                return false;
            }

            *question_index = index;
            *is_submitting = false;
            *last_error = None;
            progress = questions.get(index).cloned().map(|question| AnswerProgress::NextQuestion {
                index,
                question,
            });
            true
        });

        if let Some(AnswerProgress::NextQuestion { index, question }) = &progress {
            tracing::info!("Advanced to question {} ({})", index + 1, question.id);
            self.state.emit(FlowEvent::QuestionAdded {
                index: *index,
                question: question.clone(),
            });
        }
        if !interviewing {
            return Err(AppError::Cancelled);
        }
        Ok(progress)
    }

    /// Return to the current question with a retryable error
    fn answer_failed(&self, err: AppError) -> AppError {
        self.report(Stage::Interviewing, &err);
        let message = err.user_message();
        self.state.update(|state| match state {
            FlowState::Interviewing {
                is_recording,
                is_submitting,
                last_error,
                ..
            } => {
                *is_recording = false;
                *is_submitting = false;
                *last_error = Some(message);
                true
            }
            _ => false,
        });
        err
    }

    /// End the interview now, whatever question is current
    pub async fn end_interview(&self) -> AppResult<()> {
        self.state.transition(FlowCommand::EndInterview, |state| match state {
            FlowState::Interviewing {
                is_recording,
                is_submitting,
                ..
            } => {
                *is_recording = false;
                *is_submitting = true;
                Ok(())
            }
            other => Err(unexpected(other, FlowCommand::EndInterview)),
        })?;

        tracing::info!("Interview ended by the candidate");
        self.answer_recorder.lock().await.discard();
        self.finish_interview().await
    }

    /// Stop the session video, upload it, release media and start analysis.
    ///
    /// A missing video id never blocks the move to `Analyzing`.
    async fn finish_interview(&self) -> AppResult<()> {
        let epoch = self.epoch();
        let session_id = self.session().map(|s| s.session_id);

        self.answer_recorder.lock().await.discard();
        let video = self.stop_session_video().await;

        if let (Some(cache), Some(video), Some(session_id)) = (&self.cache, &video, &session_id) {
            if let Err(err) = cache.save_session_video(video, session_id).await {
                tracing::warn!("Could not cache the session video: {}", err);
            }
        }

        let video_id = match (video, &session_id) {
            (Some(video), Some(session_id)) => self.upload_session_video(session_id, video).await,
            _ => {
                tracing::info!("No session video to upload");
                None
            }
        };

        if let Some(session_id) = &session_id {
            if let Err(err) = self.backend.complete_session(session_id).await {
                tracing::warn!("Could not mark session {} complete: {}", session_id, err);
            }
        }

        self.media.lock().await.release();
        if !self.still_current(epoch) {
            return Err(AppError::Cancelled);
        }

        self.state.set(FlowState::Analyzing {
            video_id: video_id.clone(),
            poll_attempt: 0,
        });
        self.begin_analysis(video_id);
        Ok(())
    }

    async fn stop_session_video(&self) -> Option<MediaBlob> {
        let stopped = self.session_recorder.lock().await.stop().await;
        let partial = self.retained_video.lock().take();
        match stopped {
            Ok(Some(video)) => Some(video),
            Ok(None) => partial,
            Err(err) => {
                tracing::warn!("Session video not usable: {}", err);
                partial
            }
        }
    }

    /// Upload with the configured retry; on failure keep the video for a later retry
    async fn upload_session_video(&self, session_id: &str, video: MediaBlob) -> Option<String> {
        let result = with_upload_retry(self.config.flow.upload_retry, "upload video", || {
            self.backend.upload_video(session_id, &video)
        })
        .await;

        match result {
            Ok(video_id) => Some(video_id),
            Err(err) => {
                tracing::warn!("Session video upload failed: {}", err);
                *self.retained_video.lock() = Some(video);
                None
            }
        }
    }

    fn begin_analysis(&self, video_id: Option<String>) {
        let Some(video_id) = video_id else {
            let err = AppError::AnalysisFailed("the session video could not be uploaded".to_string());
            self.report(Stage::Analyzing, &err);
            self.state.update(|state| {
                if !matches!(state, FlowState::Analyzing { .. }) {
                    return false;
                }
                *state = FlowState::Error {
                    stage: Stage::Analyzing,
                    message: err.user_message(),
                    recovery: Recovery::RetryAnalysis { video_id: None },
                };
                true
            });
            return;
        };

        let cancel = CancellationToken::new();
        {
            let mut current = self.poll_cancel.lock();
            current.cancel();
            *current = cancel.clone();
        }

        let poller = AnalysisPoller::new(self.backend.clone())
            .with_interval(self.config.analysis.poll_interval())
            .with_max_attempts(self.config.analysis.max_attempts);
        let task = tokio::spawn(run_analysis(
            self.backend.clone(),
            self.state.clone(),
            poller,
            video_id,
            cancel,
        ));

        if let Some(previous) = self.analysis_task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Re-run analysis after it failed, re-uploading the video first when
    /// no video id was obtained
    pub async fn retry_analysis(&self) -> AppResult<()> {
        let video_id = self.state.transition(FlowCommand::RetryAnalysis, |state| match state {
            FlowState::Error {
                recovery: Recovery::RetryAnalysis { video_id },
                ..
            } => {
                let video_id = video_id.clone();
                *state = FlowState::Analyzing {
                    video_id: video_id.clone(),
                    poll_attempt: 0,
                };
                Ok(video_id)
            }
            other => Err(unexpected(other, FlowCommand::RetryAnalysis)),
        })?;

        let video_id = match video_id {
            Some(video_id) => video_id,
            None => self.reupload_video().await?,
        };
        tracing::info!("Retrying analysis of {}", video_id);
        self.begin_analysis(Some(video_id));
        Ok(())
    }

    async fn reupload_video(&self) -> AppResult<String> {
        let video = self.retained_video.lock().take();
        let (Some(video), Some(session)) = (video, self.session()) else {
            let err = AppError::AnalysisFailed("no session video is available to analyse".to_string());
            self.report(Stage::Analyzing, &err);
            self.state.set(FlowState::Error {
                stage: Stage::Analyzing,
                message: err.user_message(),
                recovery: Recovery::RestartInterview,
            });
            return Err(err);
        };

        let result = with_upload_retry(self.config.flow.upload_retry, "upload video", || {
            self.backend.upload_video(&session.session_id, &video)
        })
        .await;

        match result {
            Ok(video_id) => {
                self.state.update(|state| match state {
                    FlowState::Analyzing { video_id: current, .. } => {
                        *current = Some(video_id.clone());
                        true
                    }
                    _ => false,
                });
                Ok(video_id)
            }
            Err(err) => {
                *self.retained_video.lock() = Some(video);
                let err = AppError::from(err);
                self.report(Stage::Analyzing, &err);
                self.state.set(FlowState::Error {
                    stage: Stage::Analyzing,
                    message: err.user_message(),
                    recovery: Recovery::RetryAnalysis { video_id: None },
                });
                Err(err)
            }
        }
    }

    /// Leave an error state through its recovery action
    pub async fn recover(&self) -> AppResult<FlowState> {
        let recovery = match self.state.snapshot() {
            FlowState::Error { recovery, .. } => recovery,
            other => return Err(unexpected(&other, FlowCommand::Recover)),
        };

        match recovery {
            Recovery::RetryAnalysis { .. } => self.retry_analysis().await?,
            Recovery::ResumeInterview {
                question_index,
                questions,
            } => {
                self.state.transition(FlowCommand::Recover, |state| {
                    *state = FlowState::Interviewing {
                        question_index,
                        questions,
                        is_recording: false,
                        is_submitting: false,
                        last_error: None,
                    };
                    Ok(())
                })?;
                tracing::info!("Resumed interview at question {}", question_index + 1);
            }
            Recovery::RestartInterview => {
                self.state.transition(FlowCommand::Recover, |_| Ok(()))?;
                self.abandon().await;
            }
        }
        Ok(self.state())
    }

    /// Stop everything and go back to `Waiting`.
    ///
    /// Stops both recorders, releases the camera and microphone, and cancels
    /// any pending analysis poll. A completed interview keeps its results.
    pub async fn abandon(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.stop_analysis();

        self.answer_recorder.lock().await.discard();
        self.session_recorder.lock().await.discard();
        self.media.lock().await.release();

        *self.retained_answer.lock() = None;
        *self.retained_video.lock() = None;

        let mut reset = false;
        self.state.update(|state| {
            if matches!(state, FlowState::Waiting | FlowState::Complete { .. }) {
                return false;
            }
            *state = FlowState::Waiting;
            reset = true;
            true
        });
        if reset {
            *self.session.write() = None;
            self.receipts.write().clear();
            tracing::info!("Interview abandoned");
        }
    }

    fn stop_analysis(&self) {
        self.poll_cancel.lock().cancel();
        if let Some(task) = self.analysis_task.lock().take() {
            task.abort();
        }
    }

    /// Wait for the background analysis to settle and return the final state
    pub async fn wait_for_analysis(&self) -> FlowState {
        let task = self.analysis_task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    tracing::error!("Analysis task failed: {}", err);
                }
            }
        }
        self.state()
    }

    /// Spoken version of question `index`
    pub async fn question_audio(&self, index: usize) -> AppResult<String> {
        let question = self
            .state
            .snapshot()
            .questions()
            .and_then(|questions| questions.get(index).cloned())
            .ok_or_else(|| unexpected_index(index))?;

        if let Some(url) = question.audio_url {
            return Ok(url);
        }
        let id = question.id.as_persisted().ok_or_else(|| {
            AppError::Api(ApiError::InvalidRequest(format!(
                "question {} has no server id yet",
                question.id
            )))
        })?;
        Ok(self.backend.question_audio(id).await?)
    }
}

impl Drop for InterviewController {
    fn drop(&mut self) {
        self.stop_analysis();
    }
}

async fn run_analysis(
    backend: Arc<dyn InterviewBackend>,
    state: FlowStateHandle,
    poller: AnalysisPoller,
    video_id: String,
    cancel: CancellationToken,
) {
    let fail = |message: String, stage_video: Option<String>| {
        state.emit(FlowEvent::Error {
            stage: Stage::Analyzing,
            message: message.clone(),
        });
        state.update(|current| {
            if !matches!(current, FlowState::Analyzing { .. }) {
                return false;
            }
            *current = FlowState::Error {
                stage: Stage::Analyzing,
                message,
                recovery: Recovery::RetryAnalysis {
                    video_id: stage_video,
                },
            };
            true
        });
    };

    let triggered = tokio::select! {
        _ = cancel.cancelled() => return,
        triggered = backend.trigger_analysis(&video_id) => triggered,
    };
    match triggered {
        Ok(true) => tracing::info!("Analysis of {} accepted", video_id),
        Ok(false) => tracing::warn!("Server did not accept analysis of {}; polling anyway", video_id),
        Err(err) => {
            tracing::error!("Could not start analysis of {}: {}", video_id, err);
            fail(AppError::from(err).user_message(), Some(video_id));
            return;
        }
    }

    let progress = state.clone();
    let outcome = poller
        .poll_until_done(&video_id, &cancel, move |attempt| {
            progress.update(|current| match current {
                FlowState::Analyzing { poll_attempt, .. } => {
                    *poll_attempt = attempt;
                    true
                }
                _ => false,
            });
        })
        .await;

    match outcome {
        PollOutcome::Completed(results) => {
            state.update(|current| {
                if !matches!(current, FlowState::Analyzing { .. }) {
                    return false;
                }
                *current = FlowState::Complete { results };
                true
            });
        }
        PollOutcome::Failed(reason) => fail(reason, Some(video_id)),
        PollOutcome::TimedOut { attempts } => {
            fail(AppError::Timeout { attempts }.user_message(), Some(video_id))
        }
        PollOutcome::Cancelled => tracing::debug!("Analysis polling of {} cancelled", video_id),
    }
}

fn unexpected(state: &FlowState, command: FlowCommand) -> AppError {
    AppError::InvalidTransition {
        stage: state.stage(),
        action: command.name().to_string(),
    }
}

fn unexpected_index(index: usize) -> AppError {
    AppError::InvalidTransition {
        stage: Stage::Interviewing,
        action: format!("use question {} which does not exist", index + 1),
    }
}
