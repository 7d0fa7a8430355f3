// SPDX-License-Identifier: MIT OR Apache-2.0
//! The transport-agnostic boundary contract (spec §6): job trigger input,
//! status query/response, and the persisted result record shape. These
//! types carry no behavior of their own — they are what an HTTP handler,
//! CLI, or message-queue consumer would serialize at the edge of the core.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use scout_core::{FieldEvidence, JobMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-supplied budget overrides for one job (spec §6 `JobTrigger`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BudgetOverrides {
    /// Upper bound on distinct search queries issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queries: Option<u32>,
    /// Upper bound on results considered per query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_per_query: Option<u32>,
    /// Overrides `MAX_CONCURRENCY` for this job only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u32>,
}

/// Request to start research on one supplier title (spec §6 "Job trigger").
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobTrigger {
    /// The noisy, as-supplied supplier product title.
    pub input_raw: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Requested depth/cost tradeoff.
    pub mode: JobMode,
    /// Bypass the `(tenant_id, input_hash)` result cache.
    #[serde(default)]
    pub force_refresh: bool,
    /// A prior job to carry forward `Plan.evidence` shortcuts from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_job_id: Option<Uuid>,
    /// Opaque pointer to provider credentials; the core never reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_keys_ref: Option<String>,
    /// Caller-supplied budget overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budgets: Option<BudgetOverrides>,
}

/// Response to a [`JobTrigger`]: just enough to poll status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobTriggerAck {
    /// The newly created (or cache-shared) job's id.
    pub job_id: Uuid,
}

/// Poll request for one job's status (spec §6 "Status query").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StatusQuery {
    /// The job to look up.
    pub job_id: Uuid,
}

/// One append-only entry in a job's stage-transition log.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepEntry {
    /// The stage name transitioned to (e.g. `"resolve"`).
    pub stage: String,
    /// When the transition happened.
    pub at: DateTime<Utc>,
    /// Free-text detail, if any (e.g. an error summary).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Response to a [`StatusQuery`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusResponse {
    /// Current job status (`scout_core::JobStatus`, rendered as its
    /// `snake_case` tag so this crate carries no dependency beyond the
    /// domain model it wraps).
    pub status: String,
    /// Append-only stage-transition log.
    pub steps: Vec<StepEntry>,
    /// The finished record, once the job reaches a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultRecord>,
}

/// The persisted result shape handed back to callers (spec §6 "Result
/// record").
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResultRecord {
    /// The job this record was produced by.
    pub job_id: Uuid,
    /// The raw, as-supplied input title.
    pub input_raw: String,
    /// Stable hash of the normalized input.
    pub input_hash: String,
    /// The merged product record, domain-specific shape.
    pub data: serde_json::Value,
    /// Per-field provenance and confidence, keyed by dotted field path.
    pub evidence: BTreeMap<String, FieldEvidence>,
    /// Publish-readiness (`"published"`, `"needs_review"`, or `"failed"`).
    pub status: String,
    /// Structured reason codes (spec §7), empty when fully published.
    #[serde(default)]
    pub validation_errors: Vec<String>,
    /// When this record was finalized.
    pub processed_at: DateTime<Utc>,
    /// Total wall-clock processing time.
    pub processing_duration_ms: u64,
    /// Gatekeeper rule set version that produced `validation_errors`.
    pub ruleset_version: String,
    /// Claim-extraction/parsing logic version.
    pub parser_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_trigger_round_trips_through_json() {
        let trigger = JobTrigger {
            input_raw: "HP CF217A".to_string(),
            tenant_id: "t1".to_string(),
            mode: JobMode::Balanced,
            force_refresh: false,
            previous_job_id: None,
            api_keys_ref: None,
            budgets: Some(BudgetOverrides { max_queries: Some(5), limit_per_query: None, concurrency: None }),
        };
        let json = serde_json::to_string(&trigger).unwrap();
        let back: JobTrigger = serde_json::from_str(&json).unwrap();
        assert_eq!(back.input_raw, "HP CF217A");
        assert_eq!(back.budgets.unwrap().max_queries, Some(5));
    }

    #[test]
    fn status_response_omits_result_until_terminal() {
        let response = StatusResponse {
            status: "searching".to_string(),
            steps: vec![StepEntry { stage: "plan".to_string(), at: Utc::now(), detail: None }],
            result: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("result").is_none());
    }
}
