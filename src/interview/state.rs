//! Interview flow state
//!
//! `FlowState` is the single source of truth the UI renders from. Every
//! command is checked against the current state before the controller
//! suspends on anything, so overlapping operations are rejected up front.

use super::types::{AnalysisResult, AnswerReceipt, Question, QuestionList};
use crate::recorder::RecorderError;
use crate::utils::{AppError, AppResult};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Interview stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Waiting,
    Interviewing,
    Analyzing,
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Waiting => "waiting",
            Stage::Interviewing => "interviewing",
            Stage::Analyzing => "analyzing",
            Stage::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// The single recovery action offered by an error state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Recovery {
    /// No session exists; start over
    RestartInterview,
    /// Pick the interview up at the same question
    ResumeInterview {
        question_index: usize,
        questions: QuestionList,
    },
    /// Re-run the analysis unit, re-uploading first when `video_id` is missing
    RetryAnalysis { video_id: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FlowState {
    Waiting,
    Interviewing {
        question_index: usize,
        questions: QuestionList,
        is_recording: bool,
        is_submitting: bool,
        /// Retryable failure of the last answer, shown next to the question
        last_error: Option<String>,
    },
    Analyzing {
        video_id: Option<String>,
        poll_attempt: u32,
    },
    Complete {
        results: AnalysisResult,
    },
    Error {
        /// Stage that failed
        #[serde(rename = "failedStage")]
        stage: Stage,
        message: String,
        recovery: Recovery,
    },
}

impl Default for FlowState {
    fn default() -> Self {
        Self::Waiting
    }
}

/// User or system requests the controller accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowCommand {
    Start,
    BeginAnswer,
    EndAnswer,
    ResubmitAnswer,
    EndInterview,
    RetryAnalysis,
    Recover,
    Abandon,
}

impl FlowCommand {
    pub const ALL: [FlowCommand; 8] = [
        FlowCommand::Start,
        FlowCommand::BeginAnswer,
        FlowCommand::EndAnswer,
        FlowCommand::ResubmitAnswer,
        FlowCommand::EndInterview,
        FlowCommand::RetryAnalysis,
        FlowCommand::Recover,
        FlowCommand::Abandon,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FlowCommand::Start => "start",
            FlowCommand::BeginAnswer => "begin answer",
            FlowCommand::EndAnswer => "end answer",
            FlowCommand::ResubmitAnswer => "resubmit answer",
            FlowCommand::EndInterview => "end interview",
            FlowCommand::RetryAnalysis => "retry analysis",
            FlowCommand::Recover => "recover",
            FlowCommand::Abandon => "abandon",
        }
    }
}

impl FlowState {
    /// Stage this state belongs to; an error reports the stage that failed
    pub fn stage(&self) -> Stage {
        match self {
            FlowState::Waiting => Stage::Waiting,
            FlowState::Interviewing { .. } => Stage::Interviewing,
            FlowState::Analyzing { .. } => Stage::Analyzing,
            FlowState::Complete { .. } => Stage::Complete,
            FlowState::Error { stage, .. } => *stage,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FlowState::Error { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Complete { .. })
    }

    pub fn questions(&self) -> Option<&QuestionList> {
        match self {
            FlowState::Interviewing { questions, .. } => Some(questions),
            FlowState::Error {
                recovery: Recovery::ResumeInterview { questions, .. },
                ..
            } => Some(questions),
            _ => None,
        }
    }

    /// The question being answered, while interviewing
    pub fn current_question(&self) -> Option<&Question> {
        match self {
            FlowState::Interviewing {
                question_index,
                questions,
                ..
            } => questions.get(*question_index),
            _ => None,
        }
    }

    pub fn results(&self) -> Option<&AnalysisResult> {
        match self {
            FlowState::Complete { results } => Some(results),
            _ => None,
        }
    }

    /// Decide whether `command` may run now.
    ///
    /// Every (state, command) pair yields exactly one answer: allowed,
    /// `Busy` while another operation holds the state, or
    /// `InvalidTransition`.
    pub fn check(&self, command: FlowCommand) -> AppResult<()> {
        let invalid = || -> AppResult<()> {
            Err(AppError::InvalidTransition {
                stage: self.stage(),
                action: command.name().to_string(),
            })
        };

        if command == FlowCommand::Abandon {
            return Ok(());
        }

        match self {
            FlowState::Waiting => match command {
                FlowCommand::Start => Ok(()),
                _ => invalid(),
            },
            FlowState::Interviewing {
                is_recording,
                is_submitting,
                ..
            } => match command {
                FlowCommand::BeginAnswer | FlowCommand::EndAnswer | FlowCommand::ResubmitAnswer
                | FlowCommand::EndInterview
                    if *is_submitting =>
                {
                    Err(AppError::Busy("an answer is being submitted".to_string()))
                }
                FlowCommand::BeginAnswer if *is_recording => {
                    Err(AppError::Recorder(RecorderError::AlreadyRecording))
                }
                FlowCommand::BeginAnswer => Ok(()),
                FlowCommand::EndAnswer if *is_recording => Ok(()),
                FlowCommand::ResubmitAnswer if *is_recording => {
                    Err(AppError::Busy("an answer is being recorded".to_string()))
                }
                FlowCommand::ResubmitAnswer => Ok(()),
                FlowCommand::EndInterview => Ok(()),
                _ => invalid(),
            },
            FlowState::Analyzing { .. } | FlowState::Complete { .. } => invalid(),
            FlowState::Error { recovery, .. } => match command {
                FlowCommand::Recover => Ok(()),
                FlowCommand::RetryAnalysis if matches!(recovery, Recovery::RetryAnalysis { .. }) => {
                    Ok(())
                }
                _ => invalid(),
            },
        }
    }
}

/// Notifications broadcast to subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FlowEvent {
    StateChanged { state: FlowState },
    QuestionAdded { index: usize, question: Question },
    AnswerAccepted { receipt: AnswerReceipt },
    Error { stage: Stage, message: String },
}

/// Shared, observable flow state
#[derive(Clone)]
pub struct FlowStateHandle {
    state: Arc<RwLock<FlowState>>,
    event_tx: broadcast::Sender<FlowEvent>,
}

impl Default for FlowStateHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowStateHandle {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(FlowState::Waiting)),
            event_tx,
        }
    }

    pub fn snapshot(&self) -> FlowState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.event_tx.subscribe()
    }

    /// Replace the state and announce it
    pub fn set(&self, next: FlowState) {
        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut *state, next.clone())
        };
        if previous.stage() != next.stage() || previous.is_error() != next.is_error() {
            tracing::info!(
                "Flow {}{} -> {}{}",
                previous.stage(),
                if previous.is_error() { " (error)" } else { "" },
                next.stage(),
                if next.is_error() { " (error)" } else { "" }
            );
        }
        self.emit(FlowEvent::StateChanged { state: next });
    }

    /// Check `command` and apply `mutate` under one lock acquisition.
    ///
    /// Nothing can interleave between the check and the mutation, which is
    /// what keeps two overlapping commands from both passing the guard.
    pub fn transition<T>(
        &self,
        command: FlowCommand,
        mutate: impl FnOnce(&mut FlowState) -> AppResult<T>,
    ) -> AppResult<T> {
        let (result, snapshot) = {
            let mut state = self.state.write();
            state.check(command)?;
            let result = mutate(&mut state)?;
            (result, state.clone())
        };
        self.emit(FlowEvent::StateChanged { state: snapshot });
        Ok(result)
    }

    /// Mutate the state without a command check, if `mutate` returns true
    pub fn update(&self, mutate: impl FnOnce(&mut FlowState) -> bool) {
        let snapshot = {
            let mut state = self.state.write();
            if !mutate(&mut state) {
                return;
            }
            state.clone()
        };
        self.emit(FlowEvent::StateChanged { state: snapshot });
    }

    pub fn emit(&self, event: FlowEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::types::Question;

    fn questions() -> QuestionList {
        QuestionList::from_server(vec![Question::new("q1", 0, "Tell me about yourself")])
    }

    fn interviewing(is_recording: bool, is_submitting: bool) -> FlowState {
        FlowState::Interviewing {
            question_index: 0,
            questions: questions(),
            is_recording,
            is_submitting,
            last_error: None,
        }
    }

    fn sample_states() -> Vec<FlowState> {
        vec![
            FlowState::Waiting,
            interviewing(false, false),
            interviewing(true, false),
            interviewing(false, true),
            FlowState::Analyzing {
                video_id: Some("v1".to_string()),
                poll_attempt: 3,
            },
            FlowState::Complete {
                results: AnalysisResult::default(),
            },
            FlowState::Error {
                stage: Stage::Waiting,
                message: "no session".to_string(),
                recovery: Recovery::RestartInterview,
            },
            FlowState::Error {
                stage: Stage::Interviewing,
                message: "camera busy".to_string(),
                recovery: Recovery::ResumeInterview {
                    question_index: 0,
                    questions: questions(),
                },
            },
            FlowState::Error {
                stage: Stage::Analyzing,
                message: "timed out".to_string(),
                recovery: Recovery::RetryAnalysis { video_id: None },
            },
        ]
    }

    #[test]
    fn test_every_pair_has_one_defined_outcome() {
        for state in sample_states() {
            for command in FlowCommand::ALL {
                match state.check(command) {
                    Ok(())
                    | Err(AppError::Busy(_))
                    | Err(AppError::InvalidTransition { .. })
                    | Err(AppError::Recorder(RecorderError::AlreadyRecording)) => {}
                    Err(other) => panic!("{:?} / {:?} gave {:?}", state, command, other),
                }
            }
        }
    }

    #[test]
    fn test_interviewing_guards() {
        assert!(interviewing(false, false).check(FlowCommand::BeginAnswer).is_ok());
        assert!(matches!(
            interviewing(true, false).check(FlowCommand::BeginAnswer),
            Err(AppError::Recorder(RecorderError::AlreadyRecording))
        ));
        assert!(matches!(
            interviewing(false, true).check(FlowCommand::EndAnswer),
            Err(AppError::Busy(_))
        ));
        assert!(matches!(
            interviewing(false, false).check(FlowCommand::EndAnswer),
            Err(AppError::InvalidTransition { .. })
        ));
        assert!(interviewing(true, false).check(FlowCommand::EndInterview).is_ok());
    }

    #[test]
    fn test_terminal_and_error_states() {
        let complete = FlowState::Complete {
            results: AnalysisResult::default(),
        };
        for command in FlowCommand::ALL {
            if command != FlowCommand::Abandon {
                assert!(complete.check(command).is_err());
            }
        }

        let failed_analysis = &sample_states()[8];
        assert!(failed_analysis.check(FlowCommand::RetryAnalysis).is_ok());
        assert!(failed_analysis.check(FlowCommand::Recover).is_ok());

        let failed_start = &sample_states()[6];
        assert!(failed_start.check(FlowCommand::RetryAnalysis).is_err());
        assert!(failed_start.check(FlowCommand::Start).is_err());
    }

    #[test]
    fn test_transition_is_checked_and_announced() {
        let handle = FlowStateHandle::new();
        let mut events = handle.subscribe();

        let err = handle
            .transition(FlowCommand::EndInterview, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { stage: Stage::Waiting, .. }));
        assert!(events.try_recv().is_err());

        handle
            .transition(FlowCommand::Start, |state| {
                *state = interviewing(false, false);
                Ok(())
            })
            .unwrap();
        match events.try_recv().unwrap() {
            FlowEvent::StateChanged { state } => assert_eq!(state.stage(), Stage::Interviewing),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_state_serializes_with_stage_tag() {
        let json = serde_json::to_value(interviewing(true, false)).unwrap();
        assert_eq!(json["stage"], "interviewing");
        assert_eq!(json["questionIndex"], 0);
        assert_eq!(json["isRecording"], true);
        assert_eq!(json["questions"][0]["text"], "Tell me about yourself");
    }
}
