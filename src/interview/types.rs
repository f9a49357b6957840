//! Interview domain types
//!
//! Sessions, questions, answers and the analysis payload.

use crate::recorder::MediaBlob;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Request to open a new interview
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Job posting page the server crawls for context
    pub job_posting_url: Option<String>,
    /// Already-ingested job posting
    pub job_posting_id: Option<String>,
}

impl SessionRequest {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            job_posting_url: Some(url.into()),
            job_posting_id: None,
        }
    }

    pub fn from_job_posting(id: impl Into<String>) -> Self {
        Self {
            job_posting_url: None,
            job_posting_id: Some(id.into()),
        }
    }
}

/// One interview attempt. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSession {
    pub session_id: String,
    pub job_posting_id: Option<String>,
}

/// Question identifier: either assigned by the server or a local placeholder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionId {
    /// Not yet persisted; identified by its order only
    Pending { order: i64 },
    /// Server-assigned
    Persisted(String),
}

impl QuestionId {
    pub fn is_persisted(&self) -> bool {
        matches!(self, QuestionId::Persisted(_))
    }

    pub fn as_persisted(&self) -> Option<&str> {
        match self {
            QuestionId::Persisted(id) => Some(id),
            QuestionId::Pending { .. } => None,
        }
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionId::Pending { order } => write!(f, "pending-{}", order),
            QuestionId::Persisted(id) => f.write_str(id),
        }
    }
}

/// Main question or a follow-up generated from a previous answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Main,
    Followup,
}

impl QuestionKind {
    /// Value sent as `turn_type` with each answer
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::Main => "main",
            QuestionKind::Followup => "followup",
        }
    }
}

/// One prompt shown to the candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    /// Display and answer sequence; never changes once assigned
    pub order: i64,
    pub kind: QuestionKind,
    pub source: Option<String>,
    pub parent_question_id: Option<String>,
    /// Pre-rendered speech for the question
    pub audio_url: Option<String>,
}

impl Question {
    pub fn new(id: impl Into<String>, order: i64, text: impl Into<String>) -> Self {
        Self {
            id: QuestionId::Persisted(id.into()),
            text: text.into(),
            order,
            kind: QuestionKind::Main,
            source: None,
            parent_question_id: None,
            audio_url: None,
        }
    }

    /// Whether `other` describes the same question
    pub fn same_as(&self, other: &Question) -> bool {
        match (&self.id, &other.id) {
            (QuestionId::Persisted(a), QuestionId::Persisted(b)) => a == b,
            _ => self.order == other.order && self.text == other.text,
        }
    }
}

/// Append-only question sequence.
///
/// Every append yields a new list; existing values are never changed, so a
/// snapshot held by the UI stays valid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionList(Arc<Vec<Question>>);

impl QuestionList {
    /// Sort the server's initial list by `order`, keeping server order on ties
    pub fn from_server(mut questions: Vec<Question>) -> Self {
        questions.sort_by_key(|q| q.order);
        Self(Arc::new(questions))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Question> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Question] {
        &self.0
    }

    pub fn contains(&self, question: &Question) -> bool {
        self.0.iter().any(|q| q.same_as(question))
    }

    /// New list with `question` at the end
    pub fn appended(&self, question: Question) -> Self {
        let mut questions = Vec::with_capacity(self.0.len() + 1);
        questions.extend(self.0.iter().cloned());
        questions.push(question);
        Self(Arc::new(questions))
    }

    /// At most the first `max` questions
    pub fn truncated(self, max: usize) -> Self {
        if self.0.len() <= max {
            return self;
        }
        Self(Arc::new(self.0[..max].to_vec()))
    }

    pub fn highest_order(&self) -> Option<i64> {
        self.0.iter().map(|q| q.order).max()
    }
}

impl Serialize for QuestionList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

/// One recorded answer, held until the server accepted it
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerSegment {
    pub question_id: QuestionId,
    pub turn: QuestionKind,
    pub blob: MediaBlob,
    pub recorded_at: DateTime<Utc>,
}

impl AnswerSegment {
    pub fn new(question: &Question, blob: MediaBlob) -> Self {
        Self {
            question_id: question.id.clone(),
            turn: question.kind,
            recorded_at: blob.finished_at,
            blob,
        }
    }

    pub fn answers(&self, question: &Question) -> bool {
        self.question_id == question.id
    }
}

/// Speech metrics the server computed for one answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerMetrics {
    #[serde(default)]
    pub duration_sec: f64,
    #[serde(default)]
    pub word_count: u32,
    #[serde(default)]
    pub avg_wpm: f64,
}

/// What the server returned for an accepted answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerReceipt {
    pub question_id: QuestionId,
    /// Transcription of the answer
    pub answer_text: Option<String>,
    pub metrics: Option<AnswerMetrics>,
}

/// Score for one skill, 0 to 100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub skill: String,
    #[serde(alias = "score")]
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementSuggestion {
    #[serde(default)]
    pub id: String,
    /// Capability this suggestion targets
    pub capability: String,
    #[serde(default, alias = "currentScore")]
    pub current_score: f64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "actionItems")]
    pub action_items: Vec<String>,
}

/// Nonverbal signals extracted from the session video
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NonverbalMetrics {
    pub center_gaze_ratio: Option<f64>,
    pub smile_ratio: Option<f64>,
    pub nod_count: Option<u32>,
    pub wpm: Option<f64>,
    pub filler_count: Option<u32>,
    pub primary_emotion: Option<String>,
    pub video_score: Option<f64>,
    pub workmap_score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedResult {
    pub transcript: Option<String>,
    /// Per-frame signals, passed through as sent
    #[serde(default)]
    pub timeline: Vec<serde_json::Value>,
    #[serde(default)]
    pub alerts: Vec<serde_json::Value>,
}

/// Terminal analysis payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub capabilities: Vec<Capability>,
    pub suggestions: Vec<ImprovementSuggestion>,
    pub video_score: f64,
    pub workmap_score: f64,
    pub metrics: Option<NonverbalMetrics>,
    pub feedback: Vec<String>,
    pub detailed_result: Option<DetailedResult>,
}

/// Server-side progress of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub status: String,
    #[serde(default)]
    pub total_questions: u32,
    #[serde(default)]
    pub answered_questions: u32,
}
