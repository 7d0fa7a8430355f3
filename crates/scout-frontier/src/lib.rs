// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Frontier (spec §4.C): a persistent priority queue of
//! [`FrontierTask`]s keyed by `(job_id, priority desc, enqueued_at asc)`,
//! with leasing and a reaper that returns expired leases to `pending`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use scout_core::{Clock, FrontierTask, TaskMeta, TaskState, TaskType};
use scout_error::ErrorCode;
use uuid::Uuid;

/// Errors raised by a [`Frontier`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum FrontierError {
    /// No task with this id is known to the frontier.
    #[error("no such frontier task: {task_id}")]
    TaskNotFound {
        /// The requested task id.
        task_id: Uuid,
    },
    /// `complete()` was called on a task that is not currently `processing`.
    #[error("task {task_id} is not leased (state: {state:?})")]
    NotLeased {
        /// The task id.
        task_id: Uuid,
        /// Its actual current state.
        state: TaskState,
    },
}

impl FrontierError {
    /// The stable error code this variant maps to.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            FrontierError::TaskNotFound { .. } => ErrorCode::FrontierTaskNotFound,
            FrontierError::NotLeased { .. } => ErrorCode::FrontierNotLeased,
        }
    }
}

/// Outcome reported to [`Frontier::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The task finished successfully.
    Completed,
    /// The task finished unsuccessfully; permanent, not a lease expiry.
    Failed,
}

/// Snapshot counts for one job's queue (spec §4.C `stats`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierStats {
    /// Tasks waiting to be leased.
    pub pending: usize,
    /// Tasks currently leased to an executor.
    pub processing: usize,
    /// Tasks that finished successfully.
    pub completed: usize,
    /// Tasks that finished unsuccessfully (including attempts-exhausted).
    pub failed: usize,
}

/// The durable priority queue of work tasks driving one job's execution.
pub trait Frontier: Send + Sync {
    /// Insert a task unless `(job_id, value)` is already enqueued in a
    /// non-terminal state (spec §4.C dedup, property P4/R2). Returns the
    /// id of the inserted or pre-existing task either way.
    #[allow(clippy::too_many_arguments)]
    fn add(
        &self,
        task_id: Uuid,
        job_id: Uuid,
        task_type: TaskType,
        value: &str,
        priority: i32,
        depth: i32,
        meta: TaskMeta,
        now: DateTime<Utc>,
    ) -> Uuid;

    /// Atomically select up to `n` `pending` tasks for `job_id` with the
    /// highest priority (FIFO tie-break by `enqueued_at`), mark them
    /// `processing`, and set `lease_expires_at = now + lease`.
    fn next_batch(
        &self,
        job_id: Uuid,
        n: usize,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Vec<FrontierTask>;

    /// Transition a leased task to `completed` or `failed`.
    fn complete(&self, task_id: Uuid, outcome: TaskOutcome) -> Result<(), FrontierError>;

    /// Snapshot counts for `job_id`.
    fn stats(&self, job_id: Uuid) -> FrontierStats;

    /// Return any `processing` task whose lease has expired to `pending`
    /// with `attempts += 1`; once `attempts` reaches `max_attempts` the task
    /// is marked `failed` instead. Returns the number of tasks reaped.
    fn reap_expired(&self, now: DateTime<Utc>, max_attempts: u32) -> usize;
}

struct State {
    tasks: HashMap<Uuid, FrontierTask>,
    active_by_key: HashMap<(Uuid, String), Uuid>,
}

impl State {
    fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            active_by_key: HashMap::new(),
        }
    }
}

/// In-memory [`Frontier`] backed by a single mutex-guarded map; the
/// reference implementation used by tests and the in-process scheduler.
pub struct InMemoryFrontier {
    state: Mutex<State>,
}

impl Default for InMemoryFrontier {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFrontier {
    /// An empty frontier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new()),
        }
    }
}

impl Frontier for InMemoryFrontier {
    fn add(
        &self,
        task_id: Uuid,
        job_id: Uuid,
        task_type: TaskType,
        value: &str,
        priority: i32,
        depth: i32,
        meta: TaskMeta,
        now: DateTime<Utc>,
    ) -> Uuid {
        let mut state = self.state.lock().expect("frontier mutex poisoned");
        let key = (job_id, value.to_string());
        if let Some(existing) = state.active_by_key.get(&key) {
            return *existing;
        }
        let task = FrontierTask::new(task_id, job_id, task_type, value, priority, depth, meta, now);
        state.active_by_key.insert(key, task_id);
        state.tasks.insert(task_id, task);
        task_id
    }

    fn next_batch(
        &self,
        job_id: Uuid,
        n: usize,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Vec<FrontierTask> {
        let mut state = self.state.lock().expect("frontier mutex poisoned");
        let mut candidates: Vec<Uuid> = state
            .tasks
            .values()
            .filter(|t| t.job_id == job_id && t.state == TaskState::Pending)
            .map(|t| t.task_id)
            .collect();
        candidates.sort_by(|a, b| {
            let ta = &state.tasks[a];
            let tb = &state.tasks[b];
            tb.priority
                .cmp(&ta.priority)
                .then(ta.enqueued_at.cmp(&tb.enqueued_at))
        });
        candidates.truncate(n);

        let mut leased = Vec::with_capacity(candidates.len());
        for id in candidates {
            let task = state.tasks.get_mut(&id).expect("candidate vanished");
            task.state = TaskState::Processing;
            task.lease_expires_at = Some(now + lease);
            leased.push(task.clone());
        }
        leased
    }

    fn complete(&self, task_id: Uuid, outcome: TaskOutcome) -> Result<(), FrontierError> {
        let mut state = self.state.lock().expect("frontier mutex poisoned");
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or(FrontierError::TaskNotFound { task_id })?;
        if task.state != TaskState::Processing {
            return Err(FrontierError::NotLeased {
                task_id,
                state: task.state,
            });
        }
        task.state = match outcome {
            TaskOutcome::Completed => TaskState::Completed,
            TaskOutcome::Failed => TaskState::Failed,
        };
        task.lease_expires_at = None;
        let key = (task.job_id, task.value.clone());
        state.active_by_key.remove(&key);
        Ok(())
    }

    fn stats(&self, job_id: Uuid) -> FrontierStats {
        let state = self.state.lock().expect("frontier mutex poisoned");
        let mut stats = FrontierStats::default();
        for task in state.tasks.values().filter(|t| t.job_id == job_id) {
            match task.state {
                TaskState::Pending => stats.pending += 1,
                TaskState::Processing => stats.processing += 1,
                TaskState::Completed => stats.completed += 1,
                TaskState::Failed => stats.failed += 1,
            }
        }
        stats
    }

    fn reap_expired(&self, now: DateTime<Utc>, max_attempts: u32) -> usize {
        let mut state = self.state.lock().expect("frontier mutex poisoned");
        let expired: Vec<Uuid> = state
            .tasks
            .values()
            .filter(|t| {
                t.state == TaskState::Processing
                    && t.lease_expires_at.is_some_and(|exp| exp <= now)
            })
            .map(|t| t.task_id)
            .collect();

        let count = expired.len();
        for id in expired {
            let task = state.tasks.get_mut(&id).expect("expired task vanished");
            task.attempts += 1;
            task.lease_expires_at = None;
            if task.attempts >= max_attempts {
                task.state = TaskState::Failed;
                let key = (task.job_id, task.value.clone());
                state.active_by_key.remove(&key);
                tracing::warn!(target: "scout.frontier", task_id = %id, attempts = task.attempts, "task failed after max attempts");
            } else {
                task.state = TaskState::Pending;
                tracing::info!(target: "scout.frontier", task_id = %id, attempts = task.attempts, "lease expired, returned to pending");
            }
        }
        count
    }
}

/// Spawn a background task that calls [`Frontier::reap_expired`] on
/// `interval`, using `clock` for "now" so tests can drive it deterministically
/// through a [`scout_core::FixedClock`] instead of real sleeps.
pub fn spawn_background_reaper(
    frontier: Arc<dyn Frontier>,
    clock: Arc<dyn Clock>,
    interval: StdDuration,
    max_attempts: u32,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let reaped = frontier.reap_expired(clock.now(), max_attempts);
            if reaped > 0 {
                tracing::debug!(target: "scout.frontier", reaped, "background reaper pass");
            }
        }
    })
}
