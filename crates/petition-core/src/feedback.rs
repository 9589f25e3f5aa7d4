//! Bounded corrective loop for drafts that fail validation.

use crate::error::PetitionError;
use crate::types::GenerationState;
use crate::validate::ValidationReport;

/// Appended to the composed prompt on a retry; `{ERROR}` is replaced by the
/// list of problems found in the previous draft.
const CORRECTIVE_INSTRUCTION: &str = "\n\n<error_feedback>\nThe previous draft was rejected:\n{ERROR}\n\nRewrite the complete petition. Keep everything that was correct, and fix every problem listed above.\n</error_feedback>\n";

#[derive(Debug)]
pub enum FeedbackDecision {
    /// Regenerate with this prompt.
    Retry { prompt: String },
    /// Budget spent; the workflow must fail with this error.
    Exhausted(PetitionError),
}

#[derive(Debug, Clone, Copy)]
pub struct FeedbackController {
    max_retries: u32,
}

impl FeedbackController {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Bullet list naming each missing section and issue.
    pub fn describe(report: &ValidationReport) -> String {
        let mut lines: Vec<String> = report
            .missing_sections
            .iter()
            .map(|s| format!("- Missing required section: add a heading \"{s}\" with its content"))
            .collect();
        lines.extend(report.issues.iter().map(|i| format!("- {i}")));
        lines.join("\n")
    }

    pub fn corrective_prompt(composed: &str, report: &ValidationReport) -> String {
        let mut p = String::with_capacity(composed.len() + 512);
        p.push_str(composed);
        p.push_str(&CORRECTIVE_INSTRUCTION.replace("{ERROR}", &Self::describe(report)));
        p
    }

    /// Decide what follows a failed validation. Only this increments `retry_count`.
    pub(crate) fn apply(&self, state: &mut GenerationState) -> FeedbackDecision {
        let Some(report) = state.last_report().cloned() else {
            return FeedbackDecision::Exhausted(PetitionError::Internal(
                "feedback reached without a validation report".into(),
            ));
        };
        if state.retry_count() >= self.max_retries {
            return FeedbackDecision::Exhausted(PetitionError::FeedbackExhausted {
                attempts: state.generation_calls(),
                missing_sections: report.missing_sections,
                issues: report.issues,
            });
        }
        let Some(composed) = state.composed_prompt() else {
            return FeedbackDecision::Exhausted(PetitionError::Internal(
                "feedback reached without a composed prompt".into(),
            ));
        };
        let prompt = Self::corrective_prompt(composed, &report);
        state.increment_retry();
        FeedbackDecision::Retry { prompt }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrective_prompt_names_every_problem() {
        let report = ValidationReport {
            valid: false,
            missing_sections: vec!["RELIEF".into()],
            issues: vec!["document too short: 12 characters, minimum is 500".into()],
            char_count: 12,
        };
        let p = FeedbackController::corrective_prompt("<petition_request/>", &report);
        assert!(p.starts_with("<petition_request/>"));
        assert!(p.contains("\"RELIEF\""));
        assert!(p.contains("- document too short"));
        assert!(!p.contains("{ERROR}"));
    }
}
