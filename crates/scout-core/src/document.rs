//! [`SourceDocument`]: raw fetched content, created once by the Executor and
//! never mutated afterward.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of fetching a [`SourceDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Content fetched and persisted.
    Success,
    /// Fetch failed (the document row still exists, for auditing).
    Failed,
    /// Fetch was intentionally not attempted (e.g. degraded mode).
    Skipped,
}

/// Extraction-time context about a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DocumentMetadata {
    /// Page title, if extracted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// What produced this document (e.g. `"scrape"`, `"fallback_search"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

/// Raw content fetched from one URL, scoped to a job and cacheable across
/// jobs by `url_hash`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SourceDocument {
    /// Unique identifier.
    pub doc_id: Uuid,
    /// Owning job.
    pub job_id: Uuid,
    /// Original URL fetched.
    pub url: String,
    /// `H(canonicalize_url(url))`; unique together with `job_id`.
    pub url_hash: String,
    /// Host component of `url`, for trust-tier lookup.
    pub domain: String,
    /// Fetched content, markdown or plain text.
    pub raw_content: String,
    /// When the fetch completed.
    pub fetched_at: DateTime<Utc>,
    /// Fetch outcome.
    pub status: DocumentStatus,
    /// Extraction-time context.
    pub metadata: DocumentMetadata,
}

impl SourceDocument {
    /// Whether this document is old enough that a fresh fetch should be
    /// preferred over the cached copy (spec §4.B `TTL_source`, default 24h).
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.fetched_at) >= ttl
    }
}
