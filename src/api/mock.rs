//! Scripted in-memory backend for tests

use super::backend::{AnalysisStatus, AnswerOutcome, InterviewBackend, NextStep};
use super::error::{ApiError, ApiResult};
use crate::interview::types::{
    AnswerReceipt, InterviewSession, Question, QuestionId, SessionRequest, SessionStatus,
};
use crate::recorder::MediaBlob;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateSession(SessionRequest),
    ListQuestions(String),
    SubmitAnswer { question_id: QuestionId, bytes: usize },
    UploadVideo { session_id: String, bytes: usize },
    TriggerAnalysis(String),
    AnalysisStatus(String),
    CompleteSession(String),
    SessionStatus(String),
    QuestionAudio(String),
}

/// Backend double that answers from scripted queues and records every call
pub struct ScriptedBackend {
    sessions: Mutex<VecDeque<ApiResult<InterviewSession>>>,
    questions: Mutex<ApiResult<Vec<Question>>>,
    answers: Mutex<VecDeque<ApiResult<NextStep>>>,
    uploads: Mutex<VecDeque<ApiResult<String>>>,
    statuses: Mutex<VecDeque<ApiResult<AnalysisStatus>>>,
    /// Returned once the status queue runs dry
    idle_status: Mutex<AnalysisStatus>,
    submit_gate: Mutex<Option<Arc<Notify>>>,
    calls: Mutex<Vec<Call>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(VecDeque::new()),
            questions: Mutex::new(Ok(Vec::new())),
            answers: Mutex::new(VecDeque::new()),
            uploads: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            idle_status: Mutex::new(AnalysisStatus::Processing),
            submit_gate: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Session `s1` with the given initial questions
    pub fn with_questions(questions: Vec<Question>) -> Self {
        let backend = Self::new();
        *backend.questions.lock() = Ok(questions);
        backend
    }

    pub fn push_session(&self, result: ApiResult<InterviewSession>) {
        self.sessions.lock().push_back(result);
    }

    pub fn fail_questions(&self, error: ApiError) {
        *self.questions.lock() = Err(error);
    }

    pub fn push_answer(&self, result: ApiResult<NextStep>) {
        self.answers.lock().push_back(result);
    }

    pub fn push_upload(&self, result: ApiResult<String>) {
        self.uploads.lock().push_back(result);
    }

    pub fn push_status(&self, result: ApiResult<AnalysisStatus>) {
        self.statuses.lock().push_back(result);
    }

    pub fn set_idle_status(&self, status: AnalysisStatus) {
        *self.idle_status.lock() = status;
    }

    /// Hold every answer submission until the returned handle is notified
    pub fn gate_submissions(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.submit_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| matches(c)).count()
    }

    pub fn status_queries(&self) -> usize {
        self.count(|c| matches!(c, Call::AnalysisStatus(_)))
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl InterviewBackend for ScriptedBackend {
    async fn create_session(&self, request: &SessionRequest) -> ApiResult<InterviewSession> {
        self.record(Call::CreateSession(request.clone()));
        self.sessions.lock().pop_front().unwrap_or_else(|| {
            Ok(InterviewSession {
                session_id: "s1".to_string(),
                job_posting_id: request.job_posting_id.clone(),
            })
        })
    }

    async fn list_questions(&self, session_id: &str) -> ApiResult<Vec<Question>> {
        self.record(Call::ListQuestions(session_id.to_string()));
        self.questions.lock().clone()
    }

    async fn submit_answer(
        &self,
        _session: &InterviewSession,
        question: &Question,
        audio: &MediaBlob,
    ) -> ApiResult<AnswerOutcome> {
        self.record(Call::SubmitAnswer {
            question_id: question.id.clone(),
            bytes: audio.len(),
        });
        let gate = self.submit_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let next = self
            .answers
            .lock()
            .pop_front()
            .unwrap_or(Ok(NextStep::Final))?;
        Ok(AnswerOutcome {
            next,
            receipt: AnswerReceipt {
                question_id: question.id.clone(),
                answer_text: Some(format!("answer to {}", question.id)),
                metrics: None,
            },
        })
    }

    async fn upload_video(&self, session_id: &str, video: &MediaBlob) -> ApiResult<String> {
        self.record(Call::UploadVideo {
            session_id: session_id.to_string(),
            bytes: video.len(),
        });
        self.uploads
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("v1".to_string()))
    }

    async fn trigger_analysis(&self, video_id: &str) -> ApiResult<bool> {
        self.record(Call::TriggerAnalysis(video_id.to_string()));
        Ok(true)
    }

    async fn analysis_status(&self, video_id: &str) -> ApiResult<AnalysisStatus> {
        self.record(Call::AnalysisStatus(video_id.to_string()));
        let scripted = self.statuses.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(self.idle_status.lock().clone()))
    }

    async fn complete_session(&self, session_id: &str) -> ApiResult<()> {
        self.record(Call::CompleteSession(session_id.to_string()));
        Ok(())
    }

    async fn session_status(&self, session_id: &str) -> ApiResult<SessionStatus> {
        self.record(Call::SessionStatus(session_id.to_string()));
        Ok(SessionStatus {
            session_id: session_id.to_string(),
            status: "in_progress".to_string(),
            total_questions: 0,
            answered_questions: self.count(|c| matches!(c, Call::SubmitAnswer { .. })) as u32,
        })
    }

    async fn question_audio(&self, question_id: &str) -> ApiResult<String> {
        self.record(Call::QuestionAudio(question_id.to_string()));
        Ok(format!("/static/tts/{}.wav", question_id))
    }
}
