#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use petition_core::embed::{Embedder, HashingEmbedder};
use petition_core::generator::{BackendError, GenerationBackend, GenerationInvoker, GenerationOptions};
use petition_core::index::{AnnParams, IndexStore, VectorIndex};
use petition_core::input::PetitionRequest;
use petition_core::retrieval::DualRetriever;
use petition_core::types::{IndexEntry, IndexKind, Jurisdiction, PetitionType};
use petition_core::workflow::{Workflow, WorkflowSettings};

pub const DIMS: usize = 64;

// ── index fixtures ───────────────────────────────────────────────────────────

pub fn entry(id: &str, j: Jurisdiction, p: PetitionType, label: &str, text: &str) -> IndexEntry {
    IndexEntry {
        id: id.into(),
        source_id: None,
        embedding: HashingEmbedder::new(DIMS).vector(text),
        source_text: text.into(),
        jurisdiction_tag: j,
        petition_type_tag: p,
        label: label.into(),
    }
}

/// Five structure sections for one (jurisdiction, petition type).
pub fn structure_set(prefix: &str, j: Jurisdiction, p: PetitionType) -> Vec<IndexEntry> {
    [
        ("title", "IN THE HIGH COURT memo of parties cause title civil petition"),
        ("facts", "STATEMENT OF FACTS the petitioner states the facts of the dispute"),
        ("grounds", "GROUNDS because the respondent acted without authority of law"),
        ("relief", "PRAYER it is most respectfully prayed that this court may grant relief"),
        ("verification", "VERIFICATION verified that the contents are true to my knowledge"),
    ]
    .iter()
    .enumerate()
    .map(|(i, (label, text))| entry(&format!("{prefix}-{i}"), j, p, label, text))
    .collect()
}

/// Five content exemplars for one (jurisdiction, petition type).
pub fn content_set(prefix: &str, j: Jurisdiction, p: PetitionType) -> Vec<IndexEntry> {
    [
        ("tenancy", "Facts: landlord cut water supply. Arguments: essential services cannot be withdrawn to force eviction"),
        ("injunction", "Facts: threatened dispossession. Arguments: prima facie case and balance of convenience favour the tenant"),
        ("damages", "Facts: loss of goods. Arguments: damages follow breach of the lease covenant"),
        ("natural justice", "Facts: no notice issued. Arguments: audi alteram partem applies to eviction proceedings"),
        ("specific performance", "Facts: agreement to renew lease. Arguments: the renewal clause is enforceable"),
    ]
    .iter()
    .enumerate()
    .map(|(i, (label, text))| entry(&format!("{prefix}-{i}"), j, p, label, text))
    .collect()
}

pub fn store(structure: Vec<IndexEntry>, content: Vec<IndexEntry>) -> IndexStore {
    IndexStore::new(
        VectorIndex::new(IndexKind::Structure, DIMS, structure, AnnParams::default()).unwrap(),
        VectorIndex::new(IndexKind::Content, DIMS, content, AnnParams::default()).unwrap(),
    )
}

/// Well-stocked store for High Court civil petitions.
pub fn hc_civil_store() -> IndexStore {
    store(
        structure_set("s-hc-civ", Jurisdiction::HighCourt, PetitionType::Civil),
        content_set("c-hc-civ", Jurisdiction::HighCourt, PetitionType::Civil),
    )
}

// ── backend stub ─────────────────────────────────────────────────────────────

/// Plays back a script of responses; the last one repeats once the script runs out.
pub struct ScriptedBackend {
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
    script: Vec<Result<String, BackendError>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<String, BackendError>>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            script,
        })
    }

    pub fn always(text: String) -> Arc<Self> {
        Self::new(vec![Ok(text)])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.script
            .get(n)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or_else(|| Err(BackendError::Fatal("empty script".into())))
    }
}

/// Answers with a compliant draft unless the prompt mentions `marker`,
/// in which case the call never completes.
pub struct GatedBackend {
    pub calls: AtomicUsize,
    marker: String,
}

impl GatedBackend {
    pub fn stalls_on(marker: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            marker: marker.to_string(),
        })
    }
}

#[async_trait]
impl GenerationBackend for GatedBackend {
    fn name(&self) -> &str {
        "gated"
    }

    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains(&self.marker) {
            std::future::pending::<()>().await;
        }
        Ok(compliant_draft())
    }
}

// ── drafts ───────────────────────────────────────────────────────────────────

const FACTS: &str = "The petitioner has been a tenant of the premises since 2012 and has paid rent regularly. \
On 3 March 2024 the respondent disconnected the water supply without notice in order to force the petitioner out.";
const GROUNDS: &str = "A. Because the respondent cannot withdraw essential services to compel eviction. \
B. Because no notice was issued and the principles of natural justice were ignored.";
const PRAYER: &str = "It is therefore most respectfully prayed that this Court may direct the respondent \
to restore the water supply forthwith and restrain the respondent from dispossessing the petitioner.";

pub fn compliant_draft() -> String {
    format!(
        "IN THE HIGH COURT OF JUDICATURE\n\nSTATEMENT OF FACTS\n{FACTS}\n\nGROUNDS\n{GROUNDS}\n\nPRAYER\n{PRAYER}\n"
    )
}

/// Long enough and free of placeholders, but with no relief section.
pub fn draft_without_relief() -> String {
    format!("IN THE HIGH COURT OF JUDICATURE\n\nSTATEMENT OF FACTS\n{FACTS} {FACTS}\n\nGROUNDS\n{GROUNDS} {GROUNDS}\n")
}

// ── workflow wiring ──────────────────────────────────────────────────────────

pub fn workflow(store: IndexStore, backend: Arc<dyn GenerationBackend>, max_retries: u32) -> Workflow {
    workflow_with_timeout(store, backend, max_retries, Duration::from_secs(5))
}

pub fn workflow_with_timeout(
    store: IndexStore,
    backend: Arc<dyn GenerationBackend>,
    max_retries: u32,
    generation_timeout: Duration,
) -> Workflow {
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIMS));
    let retriever = DualRetriever::new(
        Arc::new(store),
        Arc::clone(&embedder),
        embedder,
        5,
        Duration::from_secs(5),
    );
    let invoker = GenerationInvoker::new(backend, GenerationOptions::default(), generation_timeout);
    Workflow::new(
        retriever,
        invoker,
        WorkflowSettings {
            max_retries,
            min_output_chars: 500,
        },
    )
}

pub fn request(jurisdiction: &str, petition_type: &str) -> PetitionRequest {
    let details: BTreeMap<String, String> = [
        ("petitioner_name", "Meera Iyer"),
        ("respondent_name", "Kiran Estates Pvt Ltd"),
        ("facts", "landlord disconnected water supply to force eviction of the tenant"),
        ("legal_grounds", "essential services cannot be withdrawn; natural justice"),
        ("relief", "restore water supply and restrain dispossession"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    PetitionRequest {
        session_id: Some("sess-test".into()),
        jurisdiction: jurisdiction.into(),
        petition_type: petition_type.into(),
        case_details: details,
        user_input: "draft a petition against illegal disconnection of water supply".into(),
    }
}
