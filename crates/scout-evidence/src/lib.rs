// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Evidence Store (spec §4.B): source documents and field claims, with
//! within-job dedupe by URL hash and a cross-job freshness cache.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use scout_core::{Claim, DocumentMetadata, DocumentStatus, SourceDocument};
use scout_error::ErrorCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors raised by an [`EvidenceStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    /// One or more claims in a batch referenced a `source_doc_id` the store
    /// has never seen; the whole batch was rejected (all-or-nothing).
    #[error("batch insert failed: unknown source_doc_id {source_doc_id}")]
    UnknownSourceDoc {
        /// The offending claim's source document id.
        source_doc_id: Uuid,
    },
    /// The storage backend failed (I/O, serialization).
    #[error("evidence backend error: {reason}")]
    Backend {
        /// Human-readable detail.
        reason: String,
    },
}

impl EvidenceError {
    /// The stable error code this variant maps to.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            EvidenceError::UnknownSourceDoc { .. } => ErrorCode::EvidenceUnknownSourceDoc,
            EvidenceError::Backend { .. } => ErrorCode::EvidenceBatchInsertFailed,
        }
    }
}

/// Persistence for [`SourceDocument`]s and [`Claim`]s.
pub trait EvidenceStore: Send + Sync {
    /// Deduplicate within `job_id` by URL hash, returning the existing
    /// `doc_id` if one is already recorded for this job and URL; otherwise
    /// persist a new document under `doc_id` (supplied by the caller, which
    /// owns id generation) and return it.
    #[allow(clippy::too_many_arguments)]
    fn upsert_source(
        &self,
        doc_id: Uuid,
        job_id: Uuid,
        url: &str,
        raw_content: &str,
        metadata: DocumentMetadata,
        status: DocumentStatus,
        now: DateTime<Utc>,
    ) -> Result<Uuid, EvidenceError>;

    /// Look up a cached document for `url` from any job, if one exists and
    /// is younger than `ttl`.
    fn find_source_by_url(
        &self,
        url: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Option<SourceDocument>, EvidenceError>;

    /// Atomically insert a batch of claims: either every claim is inserted
    /// or none are. Duplicate `(source_doc_id, field, value)` triples
    /// collapse to a single row (idempotent).
    fn insert_claims_batch(&self, claims: Vec<Claim>) -> Result<(), EvidenceError>;

    /// All claims contributing to `item_id`.
    fn claims_for_item(&self, item_id: Uuid) -> Result<Vec<Claim>, EvidenceError>;

    /// Look up one document by id, e.g. to recover the host/url a claim
    /// was extracted from for Trust Engine arbitration.
    fn get_source(&self, doc_id: Uuid) -> Result<Option<SourceDocument>, EvidenceError>;
}

fn dedup_key(claim: &Claim) -> (Uuid, String, String) {
    (claim.source_doc_id, claim.field.clone(), claim.value.clone())
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    docs: HashMap<Uuid, SourceDocument>,
    docs_by_job_url: HashMap<(Uuid, String), Uuid>,
    docs_by_url_hash: HashMap<String, Vec<Uuid>>,
    claims: HashMap<Uuid, Claim>,
    claims_by_item: HashMap<Uuid, Vec<Uuid>>,
    seen_claim_keys: std::collections::HashSet<(Uuid, String, String)>,
}

/// In-memory [`EvidenceStore`].
#[derive(Default)]
pub struct InMemoryEvidenceStore {
    state: Mutex<MemoryState>,
}

impl InMemoryEvidenceStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvidenceStore for InMemoryEvidenceStore {
    fn upsert_source(
        &self,
        doc_id: Uuid,
        job_id: Uuid,
        url: &str,
        raw_content: &str,
        metadata: DocumentMetadata,
        status: DocumentStatus,
        now: DateTime<Utc>,
    ) -> Result<Uuid, EvidenceError> {
        let url_hash = scout_core::url_hash(url).map_err(|e| EvidenceError::Backend {
            reason: e.to_string(),
        })?;
        let domain = scout_core::domain_of(url).map_err(|e| EvidenceError::Backend {
            reason: e.to_string(),
        })?;

        let mut state = self.state.lock().expect("evidence mutex poisoned");
        let key = (job_id, url_hash.clone());
        if let Some(existing) = state.docs_by_job_url.get(&key) {
            return Ok(*existing);
        }

        let doc = SourceDocument {
            doc_id,
            job_id,
            url: url.to_string(),
            url_hash: url_hash.clone(),
            domain,
            raw_content: raw_content.to_string(),
            fetched_at: now,
            status,
            metadata,
        };
        state.docs_by_job_url.insert(key, doc_id);
        state.docs_by_url_hash.entry(url_hash).or_default().push(doc_id);
        state.docs.insert(doc_id, doc);
        Ok(doc_id)
    }

    fn find_source_by_url(
        &self,
        url: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Option<SourceDocument>, EvidenceError> {
        let url_hash = scout_core::url_hash(url).map_err(|e| EvidenceError::Backend {
            reason: e.to_string(),
        })?;
        let state = self.state.lock().expect("evidence mutex poisoned");
        let candidates = match state.docs_by_url_hash.get(&url_hash) {
            Some(ids) => ids,
            None => return Ok(None),
        };
        let freshest = candidates
            .iter()
            .filter_map(|id| state.docs.get(id))
            .filter(|doc| !doc.is_stale(now, ttl))
            .max_by_key(|doc| doc.fetched_at);
        Ok(freshest.cloned())
    }

    fn insert_claims_batch(&self, claims: Vec<Claim>) -> Result<(), EvidenceError> {
        let mut state = self.state.lock().expect("evidence mutex poisoned");
        for claim in &claims {
            if !state.docs.contains_key(&claim.source_doc_id) {
                return Err(EvidenceError::UnknownSourceDoc {
                    source_doc_id: claim.source_doc_id,
                });
            }
        }
        for claim in claims {
            let key = dedup_key(&claim);
            if state.seen_claim_keys.contains(&key) {
                continue;
            }
            state.seen_claim_keys.insert(key);
            state
                .claims_by_item
                .entry(claim.item_id)
                .or_default()
                .push(claim.claim_id);
            state.claims.insert(claim.claim_id, claim);
        }
        Ok(())
    }

    fn claims_for_item(&self, item_id: Uuid) -> Result<Vec<Claim>, EvidenceError> {
        let state = self.state.lock().expect("evidence mutex poisoned");
        Ok(state
            .claims_by_item
            .get(&item_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.claims.get(id))
            .cloned()
            .collect())
    }

    fn get_source(&self, doc_id: Uuid) -> Result<Option<SourceDocument>, EvidenceError> {
        let state = self.state.lock().expect("evidence mutex poisoned");
        Ok(state.docs.get(&doc_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// File-backed implementation
// ---------------------------------------------------------------------------

/// File-based [`EvidenceStore`]: one JSON file per document under
/// `root/docs`, one per claim under `root/claims`, keeping an in-memory
/// index alongside for dedup/TTL lookups (rebuilt on open).
pub struct FileEvidenceStore {
    root: PathBuf,
    state: Mutex<MemoryState>,
}

impl FileEvidenceStore {
    /// Open (or create) a store rooted at `root`, replaying any existing
    /// documents/claims on disk into the in-memory index.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, EvidenceError> {
        let root = root.into();
        std::fs::create_dir_all(root.join("docs")).map_err(|e| EvidenceError::Backend {
            reason: e.to_string(),
        })?;
        std::fs::create_dir_all(root.join("claims")).map_err(|e| EvidenceError::Backend {
            reason: e.to_string(),
        })?;

        let mut state = MemoryState::default();
        for doc in Self::read_all::<SourceDocument>(&root.join("docs"))? {
            state
                .docs_by_job_url
                .insert((doc.job_id, doc.url_hash.clone()), doc.doc_id);
            state
                .docs_by_url_hash
                .entry(doc.url_hash.clone())
                .or_default()
                .push(doc.doc_id);
            state.docs.insert(doc.doc_id, doc);
        }
        for claim in Self::read_all::<Claim>(&root.join("claims"))? {
            let key = dedup_key(&claim);
            state.seen_claim_keys.insert(key);
            state
                .claims_by_item
                .entry(claim.item_id)
                .or_default()
                .push(claim.claim_id);
            state.claims.insert(claim.claim_id, claim);
        }

        Ok(Self {
            root,
            state: Mutex::new(state),
        })
    }

    fn read_all<T: for<'de> Deserialize<'de>>(dir: &Path) -> Result<Vec<T>, EvidenceError> {
        let mut out = Vec::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(EvidenceError::Backend { reason: e.to_string() }),
        };
        for entry in entries {
            let entry = entry.map_err(|e| EvidenceError::Backend { reason: e.to_string() })?;
            let content = std::fs::read_to_string(entry.path()).map_err(|e| EvidenceError::Backend {
                reason: e.to_string(),
            })?;
            let value = serde_json::from_str(&content).map_err(|e| EvidenceError::Backend {
                reason: e.to_string(),
            })?;
            out.push(value);
        }
        Ok(out)
    }

    fn write_doc(&self, doc: &SourceDocument) -> Result<(), EvidenceError> {
        let path = self.root.join("docs").join(format!("{}.json", doc.doc_id));
        let json = serde_json::to_string_pretty(doc).map_err(|e| EvidenceError::Backend {
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| EvidenceError::Backend {
            reason: e.to_string(),
        })
    }

    fn write_claim(&self, claim: &Claim) -> Result<(), EvidenceError> {
        let path = self.root.join("claims").join(format!("{}.json", claim.claim_id));
        let json = serde_json::to_string_pretty(claim).map_err(|e| EvidenceError::Backend {
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| EvidenceError::Backend {
            reason: e.to_string(),
        })
    }
}

impl EvidenceStore for FileEvidenceStore {
    fn upsert_source(
        &self,
        doc_id: Uuid,
        job_id: Uuid,
        url: &str,
        raw_content: &str,
        metadata: DocumentMetadata,
        status: DocumentStatus,
        now: DateTime<Utc>,
    ) -> Result<Uuid, EvidenceError> {
        let url_hash = scout_core::url_hash(url).map_err(|e| EvidenceError::Backend {
            reason: e.to_string(),
        })?;
        let domain = scout_core::domain_of(url).map_err(|e| EvidenceError::Backend {
            reason: e.to_string(),
        })?;

        {
            let state = self.state.lock().expect("evidence mutex poisoned");
            if let Some(existing) = state.docs_by_job_url.get(&(job_id, url_hash.clone())) {
                return Ok(*existing);
            }
        }

        let doc = SourceDocument {
            doc_id,
            job_id,
            url: url.to_string(),
            url_hash: url_hash.clone(),
            domain,
            raw_content: raw_content.to_string(),
            fetched_at: now,
            status,
            metadata,
        };
        self.write_doc(&doc)?;

        let mut state = self.state.lock().expect("evidence mutex poisoned");
        state.docs_by_job_url.insert((job_id, url_hash.clone()), doc_id);
        state.docs_by_url_hash.entry(url_hash).or_default().push(doc_id);
        state.docs.insert(doc_id, doc);
        Ok(doc_id)
    }

    fn find_source_by_url(
        &self,
        url: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Option<SourceDocument>, EvidenceError> {
        let url_hash = scout_core::url_hash(url).map_err(|e| EvidenceError::Backend {
            reason: e.to_string(),
        })?;
        let state = self.state.lock().expect("evidence mutex poisoned");
        let candidates = match state.docs_by_url_hash.get(&url_hash) {
            Some(ids) => ids,
            None => return Ok(None),
        };
        Ok(candidates
            .iter()
            .filter_map(|id| state.docs.get(id))
            .filter(|doc| !doc.is_stale(now, ttl))
            .max_by_key(|doc| doc.fetched_at)
            .cloned())
    }

    fn insert_claims_batch(&self, claims: Vec<Claim>) -> Result<(), EvidenceError> {
        {
            let state = self.state.lock().expect("evidence mutex poisoned");
            for claim in &claims {
                if !state.docs.contains_key(&claim.source_doc_id) {
                    return Err(EvidenceError::UnknownSourceDoc {
                        source_doc_id: claim.source_doc_id,
                    });
                }
            }
        }

        for claim in claims {
            let key = dedup_key(&claim);
            let already_seen = {
                let state = self.state.lock().expect("evidence mutex poisoned");
                state.seen_claim_keys.contains(&key)
            };
            if already_seen {
                continue;
            }
            self.write_claim(&claim)?;
            let mut state = self.state.lock().expect("evidence mutex poisoned");
            state.seen_claim_keys.insert(key);
            state
                .claims_by_item
                .entry(claim.item_id)
                .or_default()
                .push(claim.claim_id);
            state.claims.insert(claim.claim_id, claim);
        }
        Ok(())
    }

    fn claims_for_item(&self, item_id: Uuid) -> Result<Vec<Claim>, EvidenceError> {
        let state = self.state.lock().expect("evidence mutex poisoned");
        Ok(state
            .claims_by_item
            .get(&item_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.claims.get(id))
            .cloned()
            .collect())
    }

    fn get_source(&self, doc_id: Uuid) -> Result<Option<SourceDocument>, EvidenceError> {
        let state = self.state.lock().expect("evidence mutex poisoned");
        Ok(state.docs.get(&doc_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claim(item_id: Uuid, source_doc_id: Uuid, field: &str, value: &str) -> Claim {
        Claim {
            claim_id: Uuid::new_v4(),
            item_id,
            source_doc_id,
            field: field.to_string(),
            value: value.to_string(),
            confidence: 90,
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_source_dedupes_within_job() {
        let store = InMemoryEvidenceStore::new();
        let job_id = Uuid::new_v4();
        let first = store
            .upsert_source(
                Uuid::new_v4(),
                job_id,
                "https://example.com/a",
                "content",
                DocumentMetadata::default(),
                DocumentStatus::Success,
                Utc::now(),
            )
            .unwrap();
        let second = store
            .upsert_source(
                Uuid::new_v4(),
                job_id,
                "https://EXAMPLE.com/a",
                "other content",
                DocumentMetadata::default(),
                DocumentStatus::Success,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn find_source_by_url_respects_ttl() {
        let store = InMemoryEvidenceStore::new();
        let now = Utc::now();
        store
            .upsert_source(
                Uuid::new_v4(),
                Uuid::new_v4(),
                "https://example.com/a",
                "content",
                DocumentMetadata::default(),
                DocumentStatus::Success,
                now - Duration::hours(25),
            )
            .unwrap();
        let fresh = store
            .find_source_by_url("https://example.com/a", now, Duration::hours(24))
            .unwrap();
        assert!(fresh.is_none());
    }

    #[test]
    fn insert_claims_batch_is_all_or_nothing() {
        let store = InMemoryEvidenceStore::new();
        let job_id = Uuid::new_v4();
        let doc_id = store
            .upsert_source(
                Uuid::new_v4(),
                job_id,
                "https://example.com/a",
                "content",
                DocumentMetadata::default(),
                DocumentStatus::Success,
                Utc::now(),
            )
            .unwrap();
        let item_id = Uuid::new_v4();
        let good = sample_claim(item_id, doc_id, "brand", "HP");
        let bad = sample_claim(item_id, Uuid::new_v4(), "model", "CF217A");
        let result = store.insert_claims_batch(vec![good, bad]);
        assert!(result.is_err());
        assert!(store.claims_for_item(item_id).unwrap().is_empty());
    }

    #[test]
    fn insert_claims_batch_collapses_duplicates() {
        let store = InMemoryEvidenceStore::new();
        let job_id = Uuid::new_v4();
        let doc_id = store
            .upsert_source(
                Uuid::new_v4(),
                job_id,
                "https://example.com/a",
                "content",
                DocumentMetadata::default(),
                DocumentStatus::Success,
                Utc::now(),
            )
            .unwrap();
        let item_id = Uuid::new_v4();
        let claim_a = sample_claim(item_id, doc_id, "brand", "HP");
        let claim_b = sample_claim(item_id, doc_id, "brand", "HP");
        store
            .insert_claims_batch(vec![claim_a, claim_b])
            .unwrap();
        assert_eq!(store.claims_for_item(item_id).unwrap().len(), 1);
    }

    #[test]
    fn file_store_reopens_with_prior_docs_and_claims() {
        let dir = tempfile::tempdir().unwrap();
        let job_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let doc_id;
        {
            let store = FileEvidenceStore::open(dir.path()).unwrap();
            doc_id = store
                .upsert_source(
                    Uuid::new_v4(),
                    job_id,
                    "https://example.com/a",
                    "content",
                    DocumentMetadata::default(),
                    DocumentStatus::Success,
                    Utc::now(),
                )
                .unwrap();
            store
                .insert_claims_batch(vec![sample_claim(item_id, doc_id, "brand", "HP")])
                .unwrap();
        }

        let reopened = FileEvidenceStore::open(dir.path()).unwrap();
        assert_eq!(reopened.claims_for_item(item_id).unwrap().len(), 1);
        let cached = reopened
            .find_source_by_url("https://example.com/a", Utc::now(), Duration::hours(24))
            .unwrap()
            .unwrap();
        assert_eq!(cached.doc_id, doc_id);
    }
}
