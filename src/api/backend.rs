//! Backend abstraction
//!
//! The controller talks to the server only through `InterviewBackend`, so
//! an in-memory double can stand in for HTTP.

use super::error::ApiResult;
use super::types::{AnalysisStatusResponse, JobStatus, SubmitAnswerResponse};
use crate::interview::types::{
    AnalysisResult, AnswerReceipt, InterviewSession, Question, SessionRequest, SessionStatus,
};
use crate::recorder::MediaBlob;
use async_trait::async_trait;

/// What comes after an accepted answer
#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    Question(Question),
    Final,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub next: NextStep,
    pub receipt: AnswerReceipt,
}

impl AnswerOutcome {
    /// Interpret a submission response for `answered`.
    ///
    /// `is_final` wins over a next question, an `end` marker counts as final,
    /// and a response carrying neither ends the interview.
    pub fn from_response(answered: &Question, response: SubmitAnswerResponse) -> Self {
        let receipt = AnswerReceipt {
            question_id: answered.id.clone(),
            answer_text: response.answer_text,
            metrics: response.metrics,
        };

        let next = match (response.is_final, response.next_question) {
            (Some(true), _) => NextStep::Final,
            (_, Some(next)) if next.is_end_marker() => NextStep::Final,
            (_, Some(next)) => NextStep::Question(next.into_question(answered.order + 1)),
            (_, None) => {
                tracing::warn!(
                    "Answer response for {} had neither next_question nor is_final; ending interview",
                    answered.id
                );
                NextStep::Final
            }
        };

        Self { next, receipt }
    }
}

/// Analysis job state as reported by the server
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed(AnalysisResult),
    Failed(Option<String>),
}

impl From<AnalysisStatusResponse> for AnalysisStatus {
    fn from(resp: AnalysisStatusResponse) -> Self {
        match resp.status {
            JobStatus::Completed => AnalysisStatus::Completed(resp.into_result()),
            JobStatus::Failed => AnalysisStatus::Failed(resp.error),
            JobStatus::Processing => AnalysisStatus::Processing,
            JobStatus::Pending | JobStatus::Unknown => AnalysisStatus::Pending,
        }
    }
}

impl AnalysisStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed(_) | AnalysisStatus::Failed(_))
    }
}

/// Interview server operations
#[async_trait]
pub trait InterviewBackend: Send + Sync {
    /// Open a new interview session
    async fn create_session(&self, request: &SessionRequest) -> ApiResult<InterviewSession>;

    /// Initial questions, in server order
    async fn list_questions(&self, session_id: &str) -> ApiResult<Vec<Question>>;

    /// Send one recorded answer and learn what comes next
    async fn submit_answer(
        &self,
        session: &InterviewSession,
        question: &Question,
        audio: &MediaBlob,
    ) -> ApiResult<AnswerOutcome>;

    /// Upload the session video, returning its server id
    async fn upload_video(&self, session_id: &str, video: &MediaBlob) -> ApiResult<String>;

    /// Ask the server to start analysing an uploaded video
    async fn trigger_analysis(&self, video_id: &str) -> ApiResult<bool>;

    async fn analysis_status(&self, video_id: &str) -> ApiResult<AnalysisStatus>;

    /// Mark the session finished on the server
    async fn complete_session(&self, session_id: &str) -> ApiResult<()>;

    async fn session_status(&self, session_id: &str) -> ApiResult<SessionStatus>;

    /// URL of the spoken version of a question
    async fn question_audio(&self, question_id: &str) -> ApiResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::types::QuestionId;

    fn answered() -> Question {
        Question::new("q1", 0, "Tell me about yourself")
    }

    fn parse(json: &str) -> AnswerOutcome {
        AnswerOutcome::from_response(&answered(), serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_next_question() {
        let outcome = parse(
            r#"{"next_question":{"id":"q2","order":1,"text":"Why this role?"},"is_final":false,
                "answer_text":"I build things","metrics":{"duration_sec":12.5,"word_count":30,"avg_wpm":144}}"#,
        );
        match outcome.next {
            NextStep::Question(q) => assert_eq!(q.id, QuestionId::Persisted("q2".to_string())),
            NextStep::Final => panic!("expected a next question"),
        }
        assert_eq!(outcome.receipt.answer_text.as_deref(), Some("I build things"));
        assert_eq!(outcome.receipt.metrics.unwrap().word_count, 30);
    }

    #[test]
    fn test_final_variants() {
        assert_eq!(parse(r#"{"is_final":true}"#).next, NextStep::Final);
        assert_eq!(
            parse(r#"{"is_final":true,"next_question":{"id":"q2","text":"ignored"}}"#).next,
            NextStep::Final
        );
        assert_eq!(
            parse(r#"{"next_question":{"type":"end","text":"Thanks for your time"}}"#).next,
            NextStep::Final
        );
        assert_eq!(parse(r#"{}"#).next, NextStep::Final);
    }

    #[test]
    fn test_missing_order_follows_answered_question() {
        let outcome = parse(r#"{"next_question":{"text":"Can you expand on that?","type":"followup"}}"#);
        match outcome.next {
            NextStep::Question(q) => {
                assert_eq!(q.order, 1);
                assert_eq!(q.id, QuestionId::Pending { order: 1 });
            }
            NextStep::Final => panic!("expected a next question"),
        }
    }
}
