use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{GenerationState, Status};

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub problem: String,
}

impl FieldIssue {
    pub fn missing(field: &str) -> Self {
        Self {
            field: field.to_string(),
            problem: "missing".to_string(),
        }
    }

    pub fn invalid(field: &str, problem: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            problem: problem.into(),
        }
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{} ({})", i.field, i.problem))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fatal workflow errors. Validation of generated text is not in here: a
/// failed validation is an ordinary outcome that feeds the feedback loop
/// until the budget runs out, at which point it becomes `FeedbackExhausted`.
#[derive(Debug, Clone, Error)]
pub enum PetitionError {
    #[error("invalid petition request: {}", join_issues(.issues))]
    Validation { issues: Vec<FieldIssue> },

    #[error("insufficient retrieval context ({structure} structure / {content} content chunks)")]
    RetrievalInsufficient { structure: usize, content: usize },

    #[error("retrieval failed: {0}")]
    RetrievalFailed(String),

    #[error("generation service failed: {0}")]
    GenerationService(String),

    #[error(
        "feedback budget exhausted after {attempts} attempts; missing sections: [{}]",
        .missing_sections.join(", ")
    )]
    FeedbackExhausted {
        attempts: u32,
        missing_sections: Vec<String>,
        issues: Vec<String>,
    },

    #[error("internal workflow error: {0}")]
    Internal(String),
}

/// A status change that the transition table does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no transition from '{from}' on {outcome:?}")]
pub struct InvalidTransition {
    pub from: Status,
    pub outcome: crate::workflow::Outcome,
}

/// Returned by [`crate::workflow::Workflow::run`] when a request ends in `failed`.
///
/// `state` is `None` only for input validation failures, which abort before
/// any state exists. Otherwise it carries the partial state for diagnosis
/// (including the last draft when the feedback budget ran out).
#[derive(Debug)]
pub struct WorkflowFailure {
    pub error: PetitionError,
    pub state: Option<Box<GenerationState>>,
}

impl std::fmt::Display for WorkflowFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            Some(s) => write!(f, "session {}: {}", s.session_id(), self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for WorkflowFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
