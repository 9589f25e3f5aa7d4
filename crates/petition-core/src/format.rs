use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FieldIssue, PetitionError, WorkflowFailure};
use crate::rules::{jurisdiction_profile, petition_profile};
use crate::types::{GenerationState, RecordedError, StepRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PetitionMetadata {
    pub session_id: String,
    pub jurisdiction: String,
    pub petition_type: String,
    pub generated_at: DateTime<Utc>,
    pub steps: usize,
    pub structure_chunks: usize,
    pub content_chunks: usize,
    pub structure_degraded: bool,
    pub content_degraded: bool,
    pub retry_count: u32,
    pub generation_calls: u32,
    pub status: String,
}

impl PetitionMetadata {
    pub fn from_state(state: &GenerationState, generated_at: DateTime<Utc>) -> Self {
        Self {
            session_id: state.session_id().to_string(),
            jurisdiction: state.jurisdiction().code().to_string(),
            petition_type: state.petition_type().code().to_string(),
            generated_at,
            steps: state.steps().len(),
            structure_chunks: state.structure_chunks().len(),
            content_chunks: state.content_chunks().len(),
            structure_degraded: state.structure_degraded(),
            content_degraded: state.content_degraded(),
            retry_count: state.retry_count(),
            generation_calls: state.generation_calls(),
            status: state.status().to_string(),
        }
    }
}

/// Failure details carried on an unsuccessful output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub missing_sections: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub invalid_fields: Vec<FieldIssue>,
}

impl Diagnostics {
    pub fn from_error(error: &PetitionError) -> Self {
        let mut d = Diagnostics {
            error: error.to_string(),
            ..Default::default()
        };
        match error {
            PetitionError::Validation { issues } => d.invalid_fields = issues.clone(),
            PetitionError::FeedbackExhausted {
                missing_sections,
                issues,
                ..
            } => {
                d.missing_sections = missing_sections.clone();
                d.issues = issues.clone();
            }
            _ => {}
        }
        d
    }
}

/// What a caller gets back for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PetitionOutput {
    pub success: bool,
    /// Final document on success; the last rejected draft, if any, on failure.
    pub petition_text: Option<String>,
    pub metadata: Option<PetitionMetadata>,
    /// Number of workflow steps taken; matches the document header.
    pub processing_steps: usize,
    pub steps: Vec<StepRecord>,
    pub errors: Vec<RecordedError>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub diagnostics: Option<Diagnostics>,
}

impl PetitionOutput {
    pub fn from_state(state: &GenerationState) -> Self {
        Self {
            success: true,
            petition_text: state.final_document().map(str::to_string),
            metadata: Some(PetitionMetadata::from_state(state, Utc::now())),
            processing_steps: state.steps().len(),
            steps: state.steps().to_vec(),
            errors: state.errors().to_vec(),
            diagnostics: None,
        }
    }

    pub fn from_failure(failure: &WorkflowFailure) -> Self {
        let diagnostics = Some(Diagnostics::from_error(&failure.error));
        match failure.state.as_deref() {
            Some(state) => Self {
                success: false,
                petition_text: state.raw_output().map(str::to_string),
                metadata: Some(PetitionMetadata::from_state(state, Utc::now())),
                processing_steps: state.steps().len(),
                steps: state.steps().to_vec(),
                errors: state.errors().to_vec(),
                diagnostics,
            },
            None => Self {
                success: false,
                petition_text: None,
                metadata: None,
                processing_steps: 0,
                steps: Vec::new(),
                errors: Vec::new(),
                diagnostics,
            },
        }
    }
}

/// Prefixes the validated draft with a metadata header.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFormatter;

impl OutputFormatter {
    /// `steps` is the count the header reports; the caller passes the number
    /// the log will hold once the formatting step itself is recorded.
    pub fn render(&self, state: &GenerationState, body: &str, steps: usize, at: DateTime<Utc>) -> String {
        let jp = jurisdiction_profile(state.jurisdiction());
        let pp = petition_profile(state.petition_type());
        let rule = "=".repeat(72);
        format!(
            "{rule}\n\
             Session ID:     {}\n\
             Jurisdiction:   {} ({})\n\
             Petition Type:  {} ({})\n\
             Generated:      {}\n\
             Workflow Steps: {steps}\n\
             {rule}\n\n\
             {}\n",
            state.session_id(),
            jp.name,
            jp.jurisdiction.code(),
            pp.name,
            pp.petition_type.code(),
            at.format("%Y-%m-%d %H:%M:%S UTC"),
            body.trim(),
        )
    }
}
