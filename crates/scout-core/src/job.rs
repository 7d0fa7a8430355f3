//! The [`Job`] entity: one unit of work for a single supplier input title.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Research depth/cost tradeoff requested for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Minimal search, shallow depth cap, fewest slices.
    Fast,
    /// Default tradeoff.
    Balanced,
    /// Maximum search breadth and reflection loops.
    Deep,
}

/// Job lifecycle stage. Ordered: transitions must move forward in this
/// order, except into [`JobStatus::Failed`], which is reachable from any
/// non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet planned.
    Pending,
    /// Deriving a [`crate::Plan`].
    Planning,
    /// Draining the frontier.
    Searching,
    /// Reflection repair loop.
    Enrichment,
    /// Synthesis / cleanup before gating.
    Polish,
    /// Running the quality gatekeeper.
    GateCheck,
    /// Result persisted, job complete.
    Done,
    /// Terminal failure.
    Failed,
}

impl JobStatus {
    /// Stage order used to check monotonic transitions. `Failed` is
    /// intentionally absent: it is handled as a special case in
    /// [`JobStatus::can_transition_to`].
    const ORDER: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Planning,
        JobStatus::Searching,
        JobStatus::Enrichment,
        JobStatus::Polish,
        JobStatus::GateCheck,
    ];

    fn rank(self) -> Option<usize> {
        Self::ORDER.iter().position(|s| *s == self)
    }

    /// Whether a job currently in `self` may move to `next`.
    ///
    /// `Failed` is reachable from any non-terminal status. `Done` is only
    /// reachable from `GateCheck`. All other transitions must strictly
    /// advance the stage order; no transition is a no-op and nothing moves
    /// backward.
    #[must_use]
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self == JobStatus::Done || self == JobStatus::Failed {
            return false;
        }
        if next == JobStatus::Failed {
            return true;
        }
        if next == JobStatus::Done {
            return self == JobStatus::GateCheck;
        }
        match (self.rank(), next.rank()) {
            (Some(a), Some(b)) => b == a + 1,
            _ => false,
        }
    }

    /// Whether this status is terminal (no further transitions possible).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

/// One unit of work for a single raw supplier title.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique identifier.
    pub job_id: Uuid,
    /// Owning tenant.
    pub tenant_id: String,
    /// Raw, as-supplied input title.
    pub input_raw: String,
    /// `H(normalize(input_raw))`, stable across whitespace/case variation.
    pub input_hash: String,
    /// Requested depth/cost tradeoff.
    pub mode: JobMode,
    /// Current lifecycle stage.
    pub status: JobStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last status-transition time.
    pub updated_at: DateTime<Utc>,
    /// Opaque pointer to the persisted result, once one exists.
    pub result_ref: Option<String>,
    /// Whether the caller opted out of the `(tenant_id, input_hash)` cache.
    pub force_refresh: bool,
}

impl Job {
    /// Build a new job in [`JobStatus::Pending`] from a raw title.
    #[must_use]
    pub fn new(
        job_id: Uuid,
        tenant_id: impl Into<String>,
        input_raw: impl Into<String>,
        mode: JobMode,
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let input_raw = input_raw.into();
        let input_hash = crate::hashing::input_hash(&input_raw);
        Self {
            job_id,
            tenant_id: tenant_id.into(),
            input_raw,
            input_hash,
            mode,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            result_ref: None,
            force_refresh,
        }
    }

    /// Move to `next`, enforcing [`JobStatus::can_transition_to`].
    pub fn transition(&mut self, next: JobStatus, now: DateTime<Utc>) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: format!("{:?}", self.status),
                to: format!("{next:?}"),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Whether `other` may share this job's cached result: same tenant,
    /// same input hash, and neither requested a forced refresh.
    #[must_use]
    pub fn shares_cache_with(&self, tenant_id: &str, input_hash: &str, force_refresh: bool) -> bool {
        !force_refresh
            && !self.force_refresh
            && self.tenant_id == tenant_id
            && self.input_hash == input_hash
    }
}
