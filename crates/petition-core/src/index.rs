//! Read-only similarity indices.
//!
//! Two indices (structure, content) are loaded once at startup from JSON
//! files written by the offline index builder and then shared behind an
//! `Arc`. Nothing here mutates after construction.
//!
//! Lookup narrows to a posting list by (jurisdiction, petition type) or by
//! jurisdiction alone, then either scans that list exhaustively or, when the
//! list is larger than `exact_scan_threshold`, probes random-hyperplane LSH
//! tables and scores only the colliding entries.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{Chunk, IndexEntry, IndexKind, Jurisdiction, PetitionType};

pub const STRUCTURE_FILE: &str = "structure_index.json";
pub const CONTENT_FILE: &str = "content_index.json";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} index declares zero dimensions")]
    ZeroDimensions { kind: &'static str },
    #[error("{kind} index entry '{id}' has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        kind: &'static str,
        id: String,
        expected: usize,
        found: usize,
    },
    #[error("{kind} index has duplicate entry id '{id}'")]
    DuplicateId { kind: &'static str, id: String },
    #[error("query vector has {found} dimensions, {kind} index expects {expected}")]
    QueryDimension {
        kind: &'static str,
        expected: usize,
        found: usize,
    },
}

/// On-disk layout of one index file.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexFile {
    pub dimensions: usize,
    pub entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Copy)]
pub struct AnnParams {
    pub exact_scan_threshold: usize,
    pub tables: usize,
    pub bits: usize,
    pub seed: u64,
}

impl Default for AnnParams {
    fn default() -> Self {
        Self {
            exact_scan_threshold: 10_000,
            tables: 8,
            bits: 12,
            seed: 1337,
        }
    }
}

impl AnnParams {
    pub fn from_config(c: &crate::config::Config) -> Self {
        Self {
            exact_scan_threshold: c.exact_scan_threshold,
            tables: c.lsh_tables,
            bits: c.lsh_bits,
            seed: c.lsh_seed,
        }
    }
}

/// Metadata restriction applied before ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchFilter {
    pub jurisdiction: Jurisdiction,
    /// `None` means jurisdiction-only (the relaxed filter).
    pub petition_type: Option<PetitionType>,
}

impl SearchFilter {
    pub fn exact(jurisdiction: Jurisdiction, petition_type: PetitionType) -> Self {
        Self {
            jurisdiction,
            petition_type: Some(petition_type),
        }
    }

    pub fn jurisdiction_only(jurisdiction: Jurisdiction) -> Self {
        Self {
            jurisdiction,
            petition_type: None,
        }
    }

    fn admits(&self, e: &IndexEntry) -> bool {
        e.jurisdiction_tag == self.jurisdiction
            && self.petition_type.map_or(true, |p| e.petition_type_tag == p)
    }
}

// ── LSH ──────────────────────────────────────────────────────────────────

/// Random-hyperplane LSH: each table hashes a vector to `bits` sign bits.
struct HyperplaneLsh {
    /// tables × bits × dimensions
    planes: Vec<Vec<Vec<f32>>>,
    buckets: Vec<HashMap<u64, Vec<u32>>>,
}

impl HyperplaneLsh {
    fn build(entries: &[IndexEntry], dimensions: usize, params: &AnnParams) -> Self {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let bits = params.bits.clamp(1, 63);
        let tables = params.tables.max(1);
        let planes: Vec<Vec<Vec<f32>>> = (0..tables)
            .map(|_| {
                (0..bits)
                    .map(|_| (0..dimensions).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
                    .collect()
            })
            .collect();

        let mut buckets = vec![HashMap::<u64, Vec<u32>>::new(); tables];
        for (i, e) in entries.iter().enumerate() {
            for (t, table) in planes.iter().enumerate() {
                let sig = Self::signature(table, &e.embedding);
                buckets[t].entry(sig).or_default().push(i as u32);
            }
        }
        Self { planes, buckets }
    }

    fn signature(table: &[Vec<f32>], v: &[f32]) -> u64 {
        table.iter().enumerate().fold(0u64, |sig, (bit, plane)| {
            if dot(plane, v) >= 0.0 {
                sig | (1u64 << bit)
            } else {
                sig
            }
        })
    }

    /// Entries colliding with `query` in any table, probing the exact bucket
    /// and every bucket one bit away.
    fn candidates(&self, query: &[f32]) -> HashSet<u32> {
        let mut out = HashSet::new();
        for (table, buckets) in self.planes.iter().zip(&self.buckets) {
            let sig = Self::signature(table, query);
            let probes = std::iter::once(sig).chain((0..table.len()).map(|b| sig ^ (1u64 << b)));
            for probe in probes {
                if let Some(ids) = buckets.get(&probe) {
                    out.extend(ids.iter().copied());
                }
            }
        }
        out
    }
}

// ── VectorIndex ──────────────────────────────────────────────────────────

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

pub struct VectorIndex {
    kind: IndexKind,
    dimensions: usize,
    entries: Vec<IndexEntry>,
    norms: Vec<f32>,
    by_jurisdiction: HashMap<Jurisdiction, Vec<u32>>,
    by_pair: HashMap<(Jurisdiction, PetitionType), Vec<u32>>,
    lsh: Option<HyperplaneLsh>,
    exact_scan_threshold: usize,
}

impl VectorIndex {
    /// Validate and index `entries`. Every embedding must be `dimensions`
    /// long and every id unique.
    pub fn new(
        kind: IndexKind,
        dimensions: usize,
        entries: Vec<IndexEntry>,
        params: AnnParams,
    ) -> Result<Self, IndexError> {
        let kind_name = kind.as_str();
        if dimensions == 0 {
            return Err(IndexError::ZeroDimensions { kind: kind_name });
        }
        let mut seen = HashSet::new();
        for e in &entries {
            if e.embedding.len() != dimensions {
                return Err(IndexError::DimensionMismatch {
                    kind: kind_name,
                    id: e.id.clone(),
                    expected: dimensions,
                    found: e.embedding.len(),
                });
            }
            if !seen.insert(e.id.as_str()) {
                return Err(IndexError::DuplicateId {
                    kind: kind_name,
                    id: e.id.clone(),
                });
            }
        }

        let mut by_jurisdiction: HashMap<Jurisdiction, Vec<u32>> = HashMap::new();
        let mut by_pair: HashMap<(Jurisdiction, PetitionType), Vec<u32>> = HashMap::new();
        for (i, e) in entries.iter().enumerate() {
            by_jurisdiction.entry(e.jurisdiction_tag).or_default().push(i as u32);
            by_pair
                .entry((e.jurisdiction_tag, e.petition_type_tag))
                .or_default()
                .push(i as u32);
        }

        let norms = entries.iter().map(|e| norm(&e.embedding)).collect();
        let lsh = (entries.len() > params.exact_scan_threshold)
            .then(|| HyperplaneLsh::build(&entries, dimensions, &params));

        Ok(Self {
            kind,
            dimensions,
            entries,
            norms,
            by_jurisdiction,
            by_pair,
            lsh,
            exact_scan_threshold: params.exact_scan_threshold,
        })
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn posting(&self, filter: &SearchFilter) -> &[u32] {
        let list = match filter.petition_type {
            Some(p) => self.by_pair.get(&(filter.jurisdiction, p)),
            None => self.by_jurisdiction.get(&filter.jurisdiction),
        };
        list.map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of entries admitted by `filter`.
    pub fn count(&self, filter: &SearchFilter) -> usize {
        self.posting(filter).len()
    }

    /// Top-`k` entries admitted by `filter`, by descending cosine similarity
    /// (ties broken by ascending id), at most one per source document.
    pub fn search(
        &self,
        query: &[f32],
        filter: &SearchFilter,
        k: usize,
    ) -> Result<Vec<Chunk>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::QueryDimension {
                kind: self.kind.as_str(),
                expected: self.dimensions,
                found: query.len(),
            });
        }
        let posting = self.posting(filter);
        if posting.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let qnorm = norm(query);

        let approx = match &self.lsh {
            Some(lsh) if posting.len() > self.exact_scan_threshold => {
                let hits: Vec<u32> = lsh
                    .candidates(query)
                    .into_iter()
                    .filter(|&i| filter.admits(&self.entries[i as usize]))
                    .collect();
                let ranked = self.rank(query, qnorm, hits.into_iter(), k);
                if ranked.len() >= k {
                    debug!(kind = self.kind.as_str(), "lsh lookup satisfied top-{k}");
                    Some(ranked)
                } else {
                    None
                }
            }
            _ => None,
        };

        // An LSH probe that comes back short falls through to the full scan.
        Ok(match approx {
            Some(r) => r,
            None => self.rank(query, qnorm, posting.iter().copied(), k),
        })
    }

    fn rank(
        &self,
        query: &[f32],
        qnorm: f32,
        candidates: impl Iterator<Item = u32>,
        k: usize,
    ) -> Vec<Chunk> {
        let mut scored: Vec<(f32, &IndexEntry)> = candidates
            .map(|i| {
                let e = &self.entries[i as usize];
                let denom = qnorm * self.norms[i as usize];
                let sim = if denom > f32::EPSILON {
                    dot(query, &e.embedding) / denom
                } else {
                    0.0
                };
                (sim, e)
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));

        let mut sources = HashSet::new();
        scored
            .into_iter()
            .filter(|(_, e)| sources.insert(e.source_key()))
            .take(k)
            .map(|(sim, e)| Chunk {
                id: e.id.clone(),
                source_id: e.source_key().to_string(),
                kind: self.kind,
                label: e.label.clone(),
                text: e.source_text.clone(),
                jurisdiction: e.jurisdiction_tag,
                petition_type: e.petition_type_tag,
                similarity: sim,
            })
            .collect()
    }
}

// ── IndexStore ───────────────────────────────────────────────────────────

/// The pair of indices a process serves from.
pub struct IndexStore {
    pub structure: VectorIndex,
    pub content: VectorIndex,
}

impl IndexStore {
    pub fn new(structure: VectorIndex, content: VectorIndex) -> Self {
        Self { structure, content }
    }

    /// Load `structure_index.json` and `content_index.json` from `dir`.
    pub fn load(dir: impl AsRef<Path>, params: AnnParams) -> Result<Self, IndexError> {
        let dir = dir.as_ref();
        let structure = load_file(&dir.join(STRUCTURE_FILE), IndexKind::Structure, params)?;
        let content = load_file(&dir.join(CONTENT_FILE), IndexKind::Content, params)?;
        info!(
            dir = %dir.display(),
            structure_entries = structure.len(),
            content_entries = content.len(),
            "index store loaded"
        );
        Ok(Self { structure, content })
    }

    pub fn get(&self, kind: IndexKind) -> &VectorIndex {
        match kind {
            IndexKind::Structure => &self.structure,
            IndexKind::Content => &self.content,
        }
    }
}

fn load_file(path: &Path, kind: IndexKind, params: AnnParams) -> Result<VectorIndex, IndexError> {
    let raw = std::fs::read_to_string(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: IndexFile = serde_json::from_str(&raw).map_err(|source| IndexError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    VectorIndex::new(kind, file.dimensions, file.entries, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, v: Vec<f32>, j: Jurisdiction, p: PetitionType) -> IndexEntry {
        IndexEntry {
            id: id.into(),
            source_id: None,
            embedding: v,
            source_text: format!("text of {id}"),
            jurisdiction_tag: j,
            petition_type_tag: p,
            label: "facts".into(),
        }
    }

    #[test]
    fn rejects_wrong_dimension() {
        let e = entry("a", vec![1.0, 0.0], Jurisdiction::HighCourt, PetitionType::Civil);
        let err = VectorIndex::new(IndexKind::Structure, 3, vec![e], AnnParams::default());
        assert!(matches!(err, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let a = entry("a", vec![1.0], Jurisdiction::HighCourt, PetitionType::Civil);
        let b = entry("a", vec![0.5], Jurisdiction::HighCourt, PetitionType::Civil);
        let err = VectorIndex::new(IndexKind::Content, 1, vec![a, b], AnnParams::default());
        assert!(matches!(err, Err(IndexError::DuplicateId { .. })));
    }

    #[test]
    fn query_dimension_is_checked() {
        let idx = VectorIndex::new(IndexKind::Content, 2, vec![], AnnParams::default()).unwrap();
        let f = SearchFilter::jurisdiction_only(Jurisdiction::HighCourt);
        assert!(matches!(
            idx.search(&[1.0], &f, 5),
            Err(IndexError::QueryDimension { .. })
        ));
    }

    #[test]
    fn lsh_path_finds_identical_vector() {
        let mut entries = Vec::new();
        for i in 0..200 {
            let angle = i as f32 * 0.031;
            entries.push(entry(
                &format!("e{i:03}"),
                vec![angle.cos(), angle.sin(), (angle * 0.5).cos()],
                Jurisdiction::SupremeCourt,
                PetitionType::Writ,
            ));
        }
        let target = entries[77].embedding.clone();
        let params = AnnParams {
            exact_scan_threshold: 10,
            tables: 6,
            bits: 4,
            seed: 7,
        };
        let idx = VectorIndex::new(IndexKind::Structure, 3, entries, params).unwrap();
        assert!(idx.lsh.is_some());
        let f = SearchFilter::exact(Jurisdiction::SupremeCourt, PetitionType::Writ);
        let hits = idx.search(&target, &f, 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "e077");
    }
}
