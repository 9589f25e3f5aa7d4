//! The per-request state machine.
//!
//! ```text
//! pending → retrieving → prompting → generating → validating → formatting → complete
//!                                        ↑             │
//!                                        └─ feedback ←─┘ (invalid draft)
//! any non-terminal status ── fatal ──→ failed
//! ```
//!
//! Each stage returns an [`Outcome`]; the next status comes only from
//! [`next_status`], never from the stage itself.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::embed::Embedder;
use crate::error::{InvalidTransition, PetitionError, WorkflowFailure};
use crate::feedback::{FeedbackController, FeedbackDecision};
use crate::format::{OutputFormatter, PetitionOutput};
use crate::generator::{GenerationBackend, GenerationInvoker};
use crate::index::IndexStore;
use crate::input::{process_input, PetitionRequest};
use crate::prompt::PromptComposer;
use crate::retrieval::{build_query, DualRetriever};
use crate::rules::jurisdiction_profile;
use crate::types::{ErrorKind, GenerationState, Status};
use crate::validate::OutputValidator;

/// What a stage reports back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Stage succeeded; move to the next stage.
    Advance,
    /// Draft failed validation; enter the feedback loop.
    Invalid,
    /// Unrecoverable error; stop.
    Fatal,
}

/// The transition table. Anything not listed is rejected.
pub fn next_status(from: Status, outcome: Outcome) -> Result<Status, InvalidTransition> {
    use Outcome::*;
    use Status::*;
    let to = match (from, outcome) {
        (Pending, Advance) => Retrieving,
        (Retrieving, Advance) => Prompting,
        (Prompting, Advance) => Generating,
        (Generating, Advance) => Validating,
        (Validating, Advance) => Formatting,
        (Validating, Invalid) => Feedback,
        (Feedback, Advance) => Generating,
        (Formatting, Advance) => Complete,
        (s, Fatal) if !s.is_terminal() => Failed,
        _ => return Err(InvalidTransition { from, outcome }),
    };
    Ok(to)
}

fn error_kind(e: &PetitionError) -> ErrorKind {
    match e {
        PetitionError::Validation { .. } => ErrorKind::InputValidation,
        PetitionError::RetrievalInsufficient { .. } => ErrorKind::RetrievalInsufficient,
        PetitionError::RetrievalFailed(_) => ErrorKind::RetrievalFailed,
        PetitionError::GenerationService(_) => ErrorKind::GenerationService,
        PetitionError::FeedbackExhausted { .. } => ErrorKind::FeedbackExhausted,
        PetitionError::Internal(_) => ErrorKind::Internal,
    }
}

fn internal(e: impl std::fmt::Display) -> PetitionError {
    PetitionError::Internal(e.to_string())
}

#[derive(Debug, Clone, Copy)]
pub struct WorkflowSettings {
    pub max_retries: u32,
    pub min_output_chars: usize,
}

impl WorkflowSettings {
    pub fn from_config(c: &Config) -> Self {
        Self {
            max_retries: c.max_retries,
            min_output_chars: c.min_output_chars,
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_output_chars: 500,
        }
    }
}

/// Shared, stateless engine. One instance serves every request; each call
/// to [`Workflow::run`] owns its own [`GenerationState`].
pub struct Workflow {
    retriever: DualRetriever,
    composer: PromptComposer,
    invoker: GenerationInvoker,
    feedback: FeedbackController,
    formatter: OutputFormatter,
    settings: WorkflowSettings,
}

impl Workflow {
    pub fn new(retriever: DualRetriever, invoker: GenerationInvoker, settings: WorkflowSettings) -> Self {
        Self {
            retriever,
            composer: PromptComposer::new(settings.min_output_chars),
            invoker,
            feedback: FeedbackController::new(settings.max_retries),
            formatter: OutputFormatter,
            settings,
        }
    }

    pub fn from_config(
        config: &Config,
        store: Arc<IndexStore>,
        structure_embedder: Arc<dyn Embedder>,
        content_embedder: Arc<dyn Embedder>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Self {
        let retriever = DualRetriever::new(
            store,
            structure_embedder,
            content_embedder,
            config.top_k,
            config.retrieval_timeout(),
        );
        let invoker = GenerationInvoker::new(backend, config.generation_options(), config.generation_timeout());
        Self::new(retriever, invoker, WorkflowSettings::from_config(config))
    }

    pub fn settings(&self) -> WorkflowSettings {
        self.settings
    }

    /// Run a request to completion, flattened into the caller-facing shape.
    pub async fn run_to_output(&self, req: PetitionRequest) -> PetitionOutput {
        match self.run(req).await {
            Ok(state) => PetitionOutput::from_state(&state),
            Err(failure) => PetitionOutput::from_failure(&failure),
        }
    }

    /// Drive one request through the state machine.
    ///
    /// Returns the completed state, or the error that stopped it together
    /// with the partial state (absent only when input validation failed).
    pub async fn run(&self, req: PetitionRequest) -> Result<GenerationState, WorkflowFailure> {
        let mut state = match process_input(req) {
            Ok(s) => s,
            Err(error) => {
                warn!("rejected petition request: {error}");
                return Err(WorkflowFailure { error, state: None });
            }
        };
        info!(
            session_id = state.session_id(),
            jurisdiction = %state.jurisdiction(),
            petition_type = %state.petition_type(),
            "workflow started"
        );
        state.record_step(true, "input validated");

        let mut outcome = Ok(Outcome::Advance);
        loop {
            match outcome {
                Ok(o) => {
                    if let Err(e) = self.transition(&mut state, o) {
                        return Err(self.fail(state, internal(e)));
                    }
                }
                Err(e) => return Err(self.fail(state, e)),
            }
            outcome = match state.status() {
                Status::Retrieving => self.retrieve(&mut state).await,
                Status::Prompting => self.compose(&mut state),
                Status::Generating => self.generate(&mut state).await,
                Status::Validating => self.validate(&mut state),
                Status::Feedback => self.feedback(&mut state),
                Status::Formatting => self.format(&mut state),
                Status::Complete => {
                    info!(
                        session_id = state.session_id(),
                        retries = state.retry_count(),
                        generation_calls = state.generation_calls(),
                        "workflow complete"
                    );
                    return Ok(state);
                }
                s @ (Status::Pending | Status::Failed) => Err(internal(format!("engine resumed in '{s}'"))),
            };
        }
    }

    fn transition(&self, state: &mut GenerationState, outcome: Outcome) -> Result<(), InvalidTransition> {
        let from = state.status();
        let to = next_status(from, outcome)?;
        info!(session_id = state.session_id(), from = %from, to = %to, "status transition");
        state.status = to;
        Ok(())
    }

    fn fail(&self, mut state: GenerationState, error: PetitionError) -> WorkflowFailure {
        error!(
            session_id = state.session_id(),
            stage = %state.status(),
            "workflow failed: {error}"
        );
        state.record_error(error_kind(&error), error.to_string(), true);
        state.record_step(false, error.to_string());
        // Every non-terminal status has a fatal edge.
        state.status = next_status(state.status(), Outcome::Fatal).unwrap_or(Status::Failed);
        WorkflowFailure {
            error,
            state: Some(Box::new(state)),
        }
    }

    // ── Stages ───────────────────────────────────────────────────────────

    async fn retrieve(&self, state: &mut GenerationState) -> Result<Outcome, PetitionError> {
        let query = build_query(
            state.user_input(),
            state.case_details(),
            state.jurisdiction(),
            state.petition_type(),
        );
        let r = self
            .retriever
            .retrieve(&query, state.jurisdiction(), state.petition_type())
            .await?;

        let k = self.retriever.top_k();
        for (name, result) in [("structure", &r.structure), ("content", &r.content)] {
            if result.degraded {
                state.record_error(
                    ErrorKind::DegradedRetrieval,
                    format!(
                        "{name} index: {} of {k} exact matches, relaxed to jurisdiction-only ({} returned)",
                        result.exact_matches,
                        result.chunks.len()
                    ),
                    false,
                );
            }
        }
        let (s, c) = (r.structure.chunks.len(), r.content.chunks.len());
        state.set_chunks(r.structure.chunks, r.structure.degraded, r.content.chunks, r.content.degraded);

        if s == 0 && c == 0 {
            return Err(PetitionError::RetrievalInsufficient { structure: 0, content: 0 });
        }
        state.record_step(true, format!("retrieved {s} structure and {c} content chunks"));
        Ok(Outcome::Advance)
    }

    fn compose(&self, state: &mut GenerationState) -> Result<Outcome, PetitionError> {
        let prompt = self.composer.compose(state)?;
        let chars = prompt.len();
        state.set_composed_prompt(prompt.clone()).map_err(internal)?;
        state.begin_attempt(prompt);
        state.record_step(true, format!("composed prompt ({chars} bytes)"));
        Ok(Outcome::Advance)
    }

    async fn generate(&self, state: &mut GenerationState) -> Result<Outcome, PetitionError> {
        if state.generation_calls() > self.settings.max_retries {
            return Err(internal("generation call budget exceeded"));
        }
        let prompt = state
            .active_prompt()
            .map(str::to_string)
            .ok_or_else(|| internal("no active prompt"))?;
        state.record_generation_call();
        let attempt = state.generation_calls();

        let generation = self.invoker.invoke(state.session_id(), &prompt).await?;
        if let Some(reason) = generation.retried_after {
            state.record_error(ErrorKind::TransientTransport, reason, false);
        }
        let chars = generation.text.chars().count();
        state.set_raw_output(generation.text).map_err(internal)?;
        state.record_step(
            true,
            format!("attempt {attempt}: {} returned {chars} characters", self.invoker.backend_name()),
        );
        Ok(Outcome::Advance)
    }

    fn validate(&self, state: &mut GenerationState) -> Result<Outcome, PetitionError> {
        let validator = OutputValidator::new(
            jurisdiction_profile(state.jurisdiction()).markers,
            self.settings.min_output_chars,
        );
        let report = {
            let text = state.raw_output().ok_or_else(|| internal("no draft to validate"))?;
            validator.validate(text)
        };
        let valid = report.valid;
        if valid {
            state.record_step(true, format!("draft valid ({} characters)", report.char_count));
        } else {
            let problems = FeedbackController::describe(&report);
            warn!(
                session_id = state.session_id(),
                attempt = state.generation_calls(),
                missing = ?report.missing_sections,
                "draft failed validation"
            );
            state.record_error(ErrorKind::ValidationFailure, problems.clone(), false);
            state.record_step(false, problems);
        }
        state.set_report(report).map_err(internal)?;
        Ok(if valid { Outcome::Advance } else { Outcome::Invalid })
    }

    fn feedback(&self, state: &mut GenerationState) -> Result<Outcome, PetitionError> {
        match self.feedback.apply(state) {
            FeedbackDecision::Retry { prompt } => {
                state.begin_attempt(prompt);
                state.record_step(
                    true,
                    format!("retry {} of {}", state.retry_count(), self.feedback.max_retries()),
                );
                Ok(Outcome::Advance)
            }
            FeedbackDecision::Exhausted(e) => Err(e),
        }
    }

    fn format(&self, state: &mut GenerationState) -> Result<Outcome, PetitionError> {
        if !state.last_report().is_some_and(|r| r.valid) {
            return Err(internal("refusing to format an unvalidated draft"));
        }
        let body = state
            .raw_output()
            .ok_or_else(|| internal("no draft to format"))?
            .to_string();
        // The header counts the formatting step recorded below.
        let steps = state.steps().len() + 1;
        let doc = self.formatter.render(state, &body, steps, Utc::now());
        state.set_final_document(doc).map_err(internal)?;
        state.record_step(true, "formatted final document");
        Ok(Outcome::Advance)
    }
}
