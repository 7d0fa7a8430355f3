//! [`FrontierTask`]: one unit the Task Executor runs, and its lease/attempt
//! lifecycle. The frontier's queue mechanics live in `scout-frontier`; this
//! module only owns the entity shape.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::plan::StrategyType as TaskType;

/// Lifecycle state of a [`FrontierTask`]. `Completed`/`Failed` are terminal:
/// a task can never transition back to `Pending` once it reaches either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting to be picked up.
    Pending,
    /// Leased to an executor; `lease_expires_at` is set.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully (including attempts-exhausted lease expiry).
    Failed,
}

impl TaskState {
    /// Terminal states accept no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// Provenance and extraction hints carried alongside a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TaskMeta {
    /// Name of the [`crate::Strategy`] this task was seeded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_name: Option<String>,
    /// Domain restriction, for `domain_map`/`domain_crawl` tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_domain: Option<String>,
    /// Extraction schema hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    /// Task id this one was expanded from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_from: Option<Uuid>,
    /// Set by Reflection: this task targets a repair goal, not the base
    /// search pass.
    #[serde(default)]
    pub repair: bool,
}

/// One unit the Task Executor runs: a query, URL, or domain to investigate.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FrontierTask {
    /// Unique identifier.
    pub task_id: Uuid,
    /// Owning job.
    pub job_id: Uuid,
    /// What kind of investigation this task performs.
    pub task_type: TaskType,
    /// Query string, URL, or domain.
    pub value: String,
    /// Higher dispatches first within a job.
    pub priority: i32,
    /// Expansion depth; bounded by the job's mode-dependent depth cap.
    pub depth: i32,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Set while `state == Processing`; cleared on completion or failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Incremented each time a lease expires before completion.
    #[serde(default)]
    pub attempts: u32,
    /// Extraction hints and provenance.
    #[serde(default)]
    pub meta: TaskMeta,
    /// When this task was enqueued; the FIFO tie-break key within equal
    /// priority.
    pub enqueued_at: DateTime<Utc>,
}

impl FrontierTask {
    /// Build a new task in [`TaskState::Pending`].
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: Uuid,
        job_id: Uuid,
        task_type: TaskType,
        value: impl Into<String>,
        priority: i32,
        depth: i32,
        meta: TaskMeta,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            job_id,
            task_type,
            value: value.into(),
            priority,
            depth,
            state: TaskState::Pending,
            lease_expires_at: None,
            attempts: 0,
            meta,
            enqueued_at: now,
        }
    }

    /// The `(job_id, value)` dedup key spec §4.C enqueues against.
    #[must_use]
    pub fn dedup_key(&self) -> (Uuid, &str) {
        (self.job_id, self.value.as_str())
    }
}
