//! Wire formats of the interview backend
//!
//! Responses are decoded leniently here and turned into domain types, so
//! the rest of the crate never sees raw payloads.

use super::error::ApiError;
use crate::interview::types::{
    AnalysisResult, AnswerMetrics, Capability, DetailedResult, ImprovementSuggestion,
    InterviewSession, NonverbalMetrics, Question, QuestionId, QuestionKind, SessionStatus,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier that some endpoints send as a number
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Text(String),
    Number(i64),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireId::Text(id) => f.write_str(id),
            WireId::Number(id) => write!(f, "{}", id),
        }
    }
}

fn non_empty(id: Option<WireId>) -> Option<String> {
    id.map(|id| id.to_string()).filter(|id| !id.trim().is_empty())
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_posting_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionResponse {
    pub id: WireId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub job_posting_id: Option<WireId>,
}

impl CreateSessionResponse {
    pub fn into_session(self, requested_job_posting: Option<String>) -> Result<InterviewSession, ApiError> {
        let session_id = self.id.to_string();
        if session_id.trim().is_empty() {
            return Err(ApiError::MalformedResponse("session id is empty".to_string()));
        }
        Ok(InterviewSession {
            session_id,
            job_posting_id: non_empty(self.job_posting_id).or(requested_job_posting),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireQuestion {
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default, alias = "question_text")]
    pub text: String,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(rename = "type", alias = "question_type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub parent_question_id: Option<WireId>,
    #[serde(default)]
    pub audio_url: Option<String>,
}

impl WireQuestion {
    /// `type: "end"` marks the end of the interview rather than a question
    pub fn is_end_marker(&self) -> bool {
        self.kind
            .as_deref()
            .map(|k| k.eq_ignore_ascii_case("end"))
            .unwrap_or(false)
    }

    /// Convert to a domain question; `fallback_order` is used when the server
    /// did not assign one.
    pub fn into_question(self, fallback_order: i64) -> Question {
        let order = self.order.unwrap_or(fallback_order);
        let kind = match self.kind.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("followup") | Some("follow_up") | Some("follow-up") => QuestionKind::Followup,
            _ => QuestionKind::Main,
        };
        Question {
            id: non_empty(self.id)
                .map(QuestionId::Persisted)
                .unwrap_or(QuestionId::Pending { order }),
            text: self.text,
            order,
            kind,
            source: self.source,
            parent_question_id: non_empty(self.parent_question_id),
            audio_url: self.audio_url.filter(|u| !u.is_empty()),
        }
    }
}

/// Questions arrive either as a bare array or wrapped in `{questions: [...]}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QuestionListResponse {
    Bare(Vec<WireQuestion>),
    Wrapped { questions: Vec<WireQuestion> },
}

impl QuestionListResponse {
    pub fn into_questions(self) -> Vec<Question> {
        let wire = match self {
            QuestionListResponse::Bare(questions) => questions,
            QuestionListResponse::Wrapped { questions } => questions,
        };
        wire.into_iter()
            .enumerate()
            .map(|(index, q)| q.into_question(index as i64))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitAnswerResponse {
    #[serde(default)]
    pub next_question: Option<WireQuestion>,
    #[serde(default)]
    pub is_final: Option<bool>,
    #[serde(default)]
    pub answer_text: Option<String>,
    #[serde(default)]
    pub metrics: Option<AnswerMetrics>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadVideoResponse {
    #[serde(alias = "id")]
    pub video_id: WireId,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerAnalysisRequest<'a> {
    pub video_id: &'a str,
}

fn accepted_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerAnalysisResponse {
    #[serde(default = "accepted_by_default")]
    pub accepted: bool,
}

/// Job status values; anything unrecognised keeps the poller waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisStatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub suggestions: Vec<ImprovementSuggestion>,
    #[serde(default)]
    pub metrics: Option<NonverbalMetrics>,
    #[serde(default)]
    pub feedback: Vec<String>,
    #[serde(default)]
    pub detailed_result: Option<DetailedResult>,
    #[serde(default, alias = "videoScore")]
    pub video_score: Option<f64>,
    #[serde(default, alias = "workmapScore")]
    pub workmap_score: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AnalysisStatusResponse {
    /// Scores fall back to the metrics block, then to zero
    pub fn into_result(self) -> AnalysisResult {
        let metrics = self.metrics;
        let from_metrics = |pick: fn(&NonverbalMetrics) -> Option<f64>| metrics.as_ref().and_then(pick);
        AnalysisResult {
            video_score: self
                .video_score
                .or_else(|| from_metrics(|m| m.video_score))
                .unwrap_or(0.0),
            workmap_score: self
                .workmap_score
                .or_else(|| from_metrics(|m| m.workmap_score))
                .unwrap_or(0.0),
            capabilities: self.capabilities,
            suggestions: self.suggestions,
            feedback: self.feedback,
            detailed_result: self.detailed_result,
            metrics,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TtsResponse {
    pub audio_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionStatusResponse {
    pub session_id: WireId,
    pub status: String,
    #[serde(default)]
    pub total_questions: u32,
    #[serde(default)]
    pub answered_questions: u32,
}

impl From<SessionStatusResponse> for SessionStatus {
    fn from(resp: SessionStatusResponse) -> Self {
        SessionStatus {
            session_id: resp.session_id.to_string(),
            status: resp.status,
            total_questions: resp.total_questions,
            answered_questions: resp.answered_questions,
        }
    }
}

/// Error payloads: `{detail}` or `{error}` or `{message}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn reason(self) -> Option<String> {
        let detail = self.detail.map(|d| match d {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
        detail.or(self.error).or(self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_without_id_is_pending() {
        let wire: WireQuestion =
            serde_json::from_str(r#"{"text":"Why this role?","type":"followup","parent_question_id":7}"#).unwrap();
        let question = wire.into_question(4);

        assert_eq!(question.id, QuestionId::Pending { order: 4 });
        assert_eq!(question.kind, QuestionKind::Followup);
        assert_eq!(question.parent_question_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_wrapped_question_list() {
        let resp: QuestionListResponse = serde_json::from_str(
            r#"{"questions":[{"id":"q1","text":"Tell me about yourself","order":0,"type":"main","source":"job"}]}"#,
        )
        .unwrap();
        let questions = resp.into_questions();
        assert_eq!(questions[0].id, QuestionId::Persisted("q1".to_string()));
        assert_eq!(questions[0].source.as_deref(), Some("job"));
    }

    #[test]
    fn test_unknown_status_tolerated() {
        let resp: AnalysisStatusResponse = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(resp.status, JobStatus::Unknown);
    }

    #[test]
    fn test_scores_fall_back_to_metrics() {
        let resp: AnalysisStatusResponse = serde_json::from_str(
            r#"{"status":"completed","capabilities":[{"skill":"Communication","value":85}],
                "metrics":{"video_score":72.5,"smile_ratio":0.4},"feedback":["Keep eye contact"]}"#,
        )
        .unwrap();
        let result = resp.into_result();

        assert_eq!(result.capabilities[0].value, 85.0);
        assert_eq!(result.video_score, 72.5);
        assert_eq!(result.workmap_score, 0.0);
        assert_eq!(result.feedback, ["Keep eye contact"]);
    }

    #[test]
    fn test_error_reason_sources() {
        let body: ErrorBody = serde_json::from_str(r#"{"detail":"Session not found"}"#).unwrap();
        assert_eq!(body.reason().as_deref(), Some("Session not found"));

        let body: ErrorBody = serde_json::from_str(r#"{"message":"quota exceeded"}"#).unwrap();
        assert_eq!(body.reason().as_deref(), Some("quota exceeded"));
    }
}
