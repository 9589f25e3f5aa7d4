use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validate::ValidationReport;

// ── Jurisdiction / Petition Type ─────────────────────────────────────────

/// Court tier a petition is filed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Jurisdiction {
    #[serde(rename = "SC")]
    SupremeCourt,
    #[serde(rename = "HC")]
    HighCourt,
    #[serde(rename = "DC")]
    DistrictCourt,
    #[serde(rename = "ST")]
    SpecializedTribunal,
    #[serde(rename = "CC")]
    ConsumerCourt,
}

impl Jurisdiction {
    pub const ALL: [Jurisdiction; 5] = [
        Self::SupremeCourt,
        Self::HighCourt,
        Self::DistrictCourt,
        Self::SpecializedTribunal,
        Self::ConsumerCourt,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::SupremeCourt => "SC",
            Self::HighCourt => "HC",
            Self::DistrictCourt => "DC",
            Self::SpecializedTribunal => "ST",
            Self::ConsumerCourt => "CC",
        }
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Jurisdiction {
    type Err = String;

    /// Accepts the short code ("HC") or the snake/space-separated name ("high_court").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "sc" | "supreme_court" => Ok(Self::SupremeCourt),
            "hc" | "high_court" => Ok(Self::HighCourt),
            "dc" | "district_court" => Ok(Self::DistrictCourt),
            "st" | "specialized_tribunal" | "tribunal" => Ok(Self::SpecializedTribunal),
            "cc" | "consumer_court" => Ok(Self::ConsumerCourt),
            _ => Err(format!("unknown jurisdiction '{s}'")),
        }
    }
}

/// Legal document category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PetitionType {
    #[serde(rename = "PIL")]
    PublicInterest,
    #[serde(rename = "CIVIL")]
    Civil,
    #[serde(rename = "CRIMINAL")]
    Criminal,
    #[serde(rename = "WRIT")]
    Writ,
    #[serde(rename = "SLP")]
    SpecialLeave,
}

impl PetitionType {
    pub const ALL: [PetitionType; 5] = [
        Self::PublicInterest,
        Self::Civil,
        Self::Criminal,
        Self::Writ,
        Self::SpecialLeave,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::PublicInterest => "PIL",
            Self::Civil => "CIVIL",
            Self::Criminal => "CRIMINAL",
            Self::Writ => "WRIT",
            Self::SpecialLeave => "SLP",
        }
    }
}

impl fmt::Display for PetitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for PetitionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "pil" | "public_interest_litigation" | "public_interest" => Ok(Self::PublicInterest),
            "civil" | "civil_petition" => Ok(Self::Civil),
            "criminal" | "criminal_petition" => Ok(Self::Criminal),
            "writ" | "writ_petition" => Ok(Self::Writ),
            "slp" | "special_leave_petition" | "special_leave" => Ok(Self::SpecialLeave),
            _ => Err(format!("unknown petition type '{s}'")),
        }
    }
}

// ── Workflow Status ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Retrieving,
    Prompting,
    Generating,
    Validating,
    Feedback,
    Formatting,
    Complete,
    Failed,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrieving => "retrieving",
            Self::Prompting => "prompting",
            Self::Generating => "generating",
            Self::Validating => "validating",
            Self::Feedback => "feedback",
            Self::Formatting => "formatting",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Index Entries / Chunks ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Document templates and section skeletons.
    Structure,
    /// Substantive arguments and precedents.
    Content,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Content => "content",
        }
    }
}

/// One indexed passage as produced by the offline index builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    /// Document the passage was chunked from. Defaults to `id` when absent.
    #[serde(default)]
    pub source_id: Option<String>,
    pub embedding: Vec<f32>,
    pub source_text: String,
    #[serde(rename = "jurisdiction")]
    pub jurisdiction_tag: Jurisdiction,
    #[serde(rename = "petition_type")]
    pub petition_type_tag: PetitionType,
    /// Section name for structure entries, topic for content entries.
    pub label: String,
}

impl IndexEntry {
    pub fn source_key(&self) -> &str {
        self.source_id.as_deref().unwrap_or(&self.id)
    }
}

/// A retrieved entry with its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub kind: IndexKind,
    pub label: String,
    pub text: String,
    pub jurisdiction: Jurisdiction,
    pub petition_type: PetitionType,
    pub similarity: f32,
}

// ── Step / Error Records ─────────────────────────────────────────────────

/// One entry in the per-request processing log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub stage: Status,
    pub success: bool,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputValidation,
    DegradedRetrieval,
    RetrievalInsufficient,
    RetrievalFailed,
    TransientTransport,
    GenerationService,
    ValidationFailure,
    FeedbackExhausted,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedError {
    pub stage: Status,
    pub kind: ErrorKind,
    pub message: String,
    pub fatal: bool,
    pub timestamp: DateTime<Utc>,
}

// ── Generation State ─────────────────────────────────────────────────────

/// A slot on [`GenerationState`] was written twice within one attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} already written for this attempt")]
pub struct SlotAlreadySet {
    pub field: &'static str,
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &'static str) -> Result<(), SlotAlreadySet> {
    if slot.is_some() {
        return Err(SlotAlreadySet { field });
    }
    *slot = Some(value);
    Ok(())
}

/// Per-request workflow state. Owned by exactly one workflow execution.
///
/// Identity fields (session, jurisdiction, petition type, case details) are
/// fixed at construction. Progressive fields are written by the workflow
/// engine only, through the crate-private mutators below.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationState {
    session_id: String,
    jurisdiction: Jurisdiction,
    petition_type: PetitionType,
    case_details: BTreeMap<String, String>,
    user_input: String,
    pub(crate) status: Status,
    structure_chunks: Vec<Chunk>,
    content_chunks: Vec<Chunk>,
    structure_degraded: bool,
    content_degraded: bool,
    composed_prompt: Option<String>,
    active_prompt: Option<String>,
    raw_output: Option<String>,
    last_report: Option<ValidationReport>,
    final_document: Option<String>,
    retry_count: u32,
    generation_calls: u32,
    errors: Vec<RecordedError>,
    steps: Vec<StepRecord>,
    created_at: DateTime<Utc>,
}

impl GenerationState {
    pub(crate) fn new(
        session_id: String,
        jurisdiction: Jurisdiction,
        petition_type: PetitionType,
        case_details: BTreeMap<String, String>,
        user_input: String,
    ) -> Self {
        Self {
            session_id,
            jurisdiction,
            petition_type,
            case_details,
            user_input,
            status: Status::Pending,
            structure_chunks: Vec::new(),
            content_chunks: Vec::new(),
            structure_degraded: false,
            content_degraded: false,
            composed_prompt: None,
            active_prompt: None,
            raw_output: None,
            last_report: None,
            final_document: None,
            retry_count: 0,
            generation_calls: 0,
            errors: Vec::new(),
            steps: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn jurisdiction(&self) -> Jurisdiction {
        self.jurisdiction
    }

    pub fn petition_type(&self) -> PetitionType {
        self.petition_type
    }

    pub fn case_details(&self) -> &BTreeMap<String, String> {
        &self.case_details
    }

    pub fn case_field(&self, name: &str) -> Option<&str> {
        self.case_details.get(name).map(String::as_str)
    }

    pub fn user_input(&self) -> &str {
        &self.user_input
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn structure_chunks(&self) -> &[Chunk] {
        &self.structure_chunks
    }

    pub fn content_chunks(&self) -> &[Chunk] {
        &self.content_chunks
    }

    pub fn structure_degraded(&self) -> bool {
        self.structure_degraded
    }

    pub fn content_degraded(&self) -> bool {
        self.content_degraded
    }

    pub fn composed_prompt(&self) -> Option<&str> {
        self.composed_prompt.as_deref()
    }

    /// Prompt sent on the current attempt (composed prompt plus any corrective block).
    pub fn active_prompt(&self) -> Option<&str> {
        self.active_prompt.as_deref()
    }

    pub fn raw_output(&self) -> Option<&str> {
        self.raw_output.as_deref()
    }

    pub fn last_report(&self) -> Option<&ValidationReport> {
        self.last_report.as_ref()
    }

    pub fn final_document(&self) -> Option<&str> {
        self.final_document.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn generation_calls(&self) -> u32 {
        self.generation_calls
    }

    pub fn errors(&self) -> &[RecordedError] {
        &self.errors
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // ── crate-private mutators ───────────────────────────────────────────

    pub(crate) fn set_chunks(
        &mut self,
        structure: Vec<Chunk>,
        structure_degraded: bool,
        content: Vec<Chunk>,
        content_degraded: bool,
    ) {
        self.structure_chunks = structure;
        self.structure_degraded = structure_degraded;
        self.content_chunks = content;
        self.content_degraded = content_degraded;
    }

    pub(crate) fn set_composed_prompt(&mut self, prompt: String) -> Result<(), SlotAlreadySet> {
        set_once(&mut self.composed_prompt, prompt, "composed_prompt")
    }

    /// Open a new generation attempt: install the prompt and clear per-attempt slots.
    pub(crate) fn begin_attempt(&mut self, prompt: String) {
        self.active_prompt = Some(prompt);
        self.raw_output = None;
        self.last_report = None;
    }

    pub(crate) fn record_generation_call(&mut self) {
        self.generation_calls += 1;
    }

    pub(crate) fn set_raw_output(&mut self, output: String) -> Result<(), SlotAlreadySet> {
        set_once(&mut self.raw_output, output, "raw_output")
    }

    pub(crate) fn set_report(&mut self, report: ValidationReport) -> Result<(), SlotAlreadySet> {
        set_once(&mut self.last_report, report, "validation_report")
    }

    pub(crate) fn set_final_document(&mut self, doc: String) -> Result<(), SlotAlreadySet> {
        set_once(&mut self.final_document, doc, "final_document")
    }

    pub(crate) fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    pub(crate) fn record_error(&mut self, kind: ErrorKind, message: impl Into<String>, fatal: bool) {
        self.errors.push(RecordedError {
            stage: self.status,
            kind,
            message: message.into(),
            fatal,
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn record_step(&mut self, success: bool, detail: impl Into<String>) {
        self.steps.push(StepRecord {
            stage: self.status,
            success,
            detail: detail.into(),
            timestamp: Utc::now(),
        });
    }
}
