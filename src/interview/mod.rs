//! Interview flow
//!
//! - `state`: the flow state machine and its observable handle
//! - `controller`: drives media, recorders and the backend through the flow
//! - `poller`: waits for the server-side analysis job

pub mod controller;
pub mod poller;
pub mod state;
pub mod types;

pub use controller::{AnswerProgress, InterviewController};
pub use poller::{AnalysisPoller, PollOutcome};
pub use state::{FlowCommand, FlowEvent, FlowState, FlowStateHandle, Recovery, Stage};
pub use types::{
    AnalysisResult, AnswerReceipt, InterviewSession, Question, QuestionId, QuestionKind,
    QuestionList, SessionRequest, SessionStatus,
};
