//! Dual retrieval: one query against the structure index and one against the
//! content index, each filtered by jurisdiction and petition type and relaxed
//! to jurisdiction-only when the exact filter yields fewer than `k` hits.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::embed::Embedder;
use crate::error::PetitionError;
use crate::index::{IndexStore, SearchFilter};
use crate::rules::petition_profile;
use crate::types::{Chunk, IndexKind, Jurisdiction, PetitionType};

/// Case-detail fields folded into the retrieval query, in order.
const QUERY_FIELDS: &[&str] = &["facts", "legal_grounds", "relief"];

#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunks: Vec<Chunk>,
    /// The exact filter came back short and the jurisdiction-only filter was used.
    pub degraded: bool,
    /// Hits under the exact (jurisdiction, petition type) filter.
    pub exact_matches: usize,
}

#[derive(Debug, Clone)]
pub struct DualRetrieval {
    pub structure: RetrievalResult,
    pub content: RetrievalResult,
}

/// Retrieval query text for one request.
pub fn build_query(
    user_input: &str,
    case_details: &std::collections::BTreeMap<String, String>,
    jurisdiction: Jurisdiction,
    petition_type: PetitionType,
) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if !user_input.trim().is_empty() {
        parts.push(user_input.trim());
    }
    for field in QUERY_FIELDS {
        if let Some(v) = case_details.get(*field).map(|v| v.trim()).filter(|v| !v.is_empty()) {
            parts.push(v);
        }
    }
    let profile = petition_profile(petition_type);
    parts.extend(profile.keywords.iter().copied());

    format!(
        "{} jurisdiction:{} petition_type:{}",
        parts.join(" "),
        jurisdiction.code(),
        petition_type.code()
    )
}

pub struct DualRetriever {
    store: Arc<IndexStore>,
    structure_embedder: Arc<dyn Embedder>,
    content_embedder: Arc<dyn Embedder>,
    top_k: usize,
    timeout: Duration,
}

impl DualRetriever {
    pub fn new(
        store: Arc<IndexStore>,
        structure_embedder: Arc<dyn Embedder>,
        content_embedder: Arc<dyn Embedder>,
        top_k: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            structure_embedder,
            content_embedder,
            top_k: top_k.max(1),
            timeout,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Query both indices. Fails only on embedder or index errors, or on
    /// timeout; empty results are returned as such for the caller to judge.
    pub async fn retrieve(
        &self,
        query: &str,
        jurisdiction: Jurisdiction,
        petition_type: PetitionType,
    ) -> Result<DualRetrieval, PetitionError> {
        let both = async {
            let (structure, content) = tokio::join!(
                self.retrieve_one(IndexKind::Structure, query, jurisdiction, petition_type),
                self.retrieve_one(IndexKind::Content, query, jurisdiction, petition_type),
            );
            Ok::<_, PetitionError>(DualRetrieval {
                structure: structure?,
                content: content?,
            })
        };
        match tokio::time::timeout(self.timeout, both).await {
            Ok(r) => r,
            Err(_) => Err(PetitionError::RetrievalFailed(format!(
                "retrieval timed out after {:?}",
                self.timeout
            ))),
        }
    }

    async fn retrieve_one(
        &self,
        kind: IndexKind,
        query: &str,
        jurisdiction: Jurisdiction,
        petition_type: PetitionType,
    ) -> Result<RetrievalResult, PetitionError> {
        let embedder = match kind {
            IndexKind::Structure => &self.structure_embedder,
            IndexKind::Content => &self.content_embedder,
        };
        let vector = embedder.embed(query).await.map_err(|e| {
            PetitionError::RetrievalFailed(format!(
                "{} embedder '{}': {e:#}",
                kind.as_str(),
                embedder.name()
            ))
        })?;

        let store = Arc::clone(&self.store);
        let k = self.top_k;
        let result = tokio::task::spawn_blocking(move || {
            search_with_fallback(&store, kind, &vector, jurisdiction, petition_type, k)
        })
        .await
        .map_err(|e| PetitionError::Internal(format!("search task: {e}")))??;

        if result.degraded {
            warn!(
                index = kind.as_str(),
                jurisdiction = %jurisdiction,
                petition_type = %petition_type,
                exact_matches = result.exact_matches,
                returned = result.chunks.len(),
                "degraded retrieval: relaxed to jurisdiction-only filter"
            );
        } else {
            info!(index = kind.as_str(), returned = result.chunks.len(), "retrieval complete");
        }
        Ok(result)
    }
}

/// Synchronous core of one index lookup.
pub fn search_with_fallback(
    store: &IndexStore,
    kind: IndexKind,
    query: &[f32],
    jurisdiction: Jurisdiction,
    petition_type: PetitionType,
    k: usize,
) -> Result<RetrievalResult, PetitionError> {
    let index = store.get(kind);
    let exact = index
        .search(query, &SearchFilter::exact(jurisdiction, petition_type), k)
        .map_err(|e| PetitionError::RetrievalFailed(e.to_string()))?;
    let exact_matches = exact.len();
    if exact_matches >= k {
        return Ok(RetrievalResult {
            chunks: exact,
            degraded: false,
            exact_matches,
        });
    }

    let relaxed = index
        .search(query, &SearchFilter::jurisdiction_only(jurisdiction), k)
        .map_err(|e| PetitionError::RetrievalFailed(e.to_string()))?;
    Ok(RetrievalResult {
        chunks: relaxed,
        degraded: true,
        exact_matches,
    })
}
