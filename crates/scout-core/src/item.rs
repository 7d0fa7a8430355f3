//! [`Item`]: the evolving product record bound to a job, and the per-field
//! [`FieldEvidence`] the Trust Engine attaches to it.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Publish-readiness of an [`Item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Still being resolved.
    Processing,
    /// Gatekeeper found issues; record is usable but flagged.
    NeedsReview,
    /// Passed all gate rules.
    Published,
    /// The owning job failed before an item could be produced.
    Failed,
}

/// The Trust Engine's resolution for one field, attached alongside the
/// resolved value in [`Item::evidence`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FieldEvidence {
    /// The resolved value, JSON-encoded if non-scalar.
    pub value: String,
    /// Confidence in `0.0..=1.0`.
    pub confidence: f64,
    /// URL of the winning source, if any single source can be named.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Whether a competing value scored within the runner-up threshold.
    pub is_conflict: bool,
    /// Resolution method (e.g. `"weighted_vote"`, `"weighted_vote_with_conflict"`).
    pub method: String,
    /// When this field was last resolved.
    pub timestamp: DateTime<Utc>,
}

/// The evolving, job-scoped product record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Item {
    /// Unique identifier.
    pub item_id: Uuid,
    /// Owning job.
    pub job_id: Uuid,
    /// The merged product record, keyed by dotted field path in its JSON
    /// shape.
    pub data: serde_json::Value,
    /// Per-field provenance and confidence.
    pub evidence: std::collections::BTreeMap<String, FieldEvidence>,
    /// Publish-readiness.
    pub status: ItemStatus,
    /// Structured reason codes from the Quality Gatekeeper (spec §7).
    #[serde(default)]
    pub validation_errors: Vec<String>,
}

impl Item {
    /// A fresh, empty item in [`ItemStatus::Processing`].
    #[must_use]
    pub fn new(item_id: Uuid, job_id: Uuid) -> Self {
        Self {
            item_id,
            job_id,
            data: serde_json::Value::Object(serde_json::Map::new()),
            evidence: std::collections::BTreeMap::new(),
            status: ItemStatus::Processing,
            validation_errors: Vec::new(),
        }
    }

    /// Current confidence for `field`, if resolved.
    #[must_use]
    pub fn confidence_of(&self, field: &str) -> Option<f64> {
        self.evidence.get(field).map(|e| e.confidence)
    }
}
