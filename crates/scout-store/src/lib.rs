// SPDX-License-Identifier: MIT OR Apache-2.0
//! Job/Item persistence and the append-only audit log (spec §6 `jobs`,
//! `items`, and `audit_log` tables), behind a [`JobStore`] trait so the
//! orchestrator never depends on a concrete relational backend.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use scout_core::{Item, Job};
use scout_error::ErrorCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors raised by a [`JobStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested entity does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of what was looked up, for diagnostics.
        what: String,
    },
    /// The backend failed (I/O, serialization).
    #[error("store backend error: {reason}")]
    Backend {
        /// Human-readable detail.
        reason: String,
    },
}

impl StoreError {
    /// The stable error code this variant maps to.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::NotFound { .. } => ErrorCode::StoreNotFound,
            StoreError::Backend { .. } => ErrorCode::StoreBackend,
        }
    }
}

/// One row of the append-only `audit_log` table (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AuditEntry {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: String,
    /// What kind of entity this entry is about (e.g. `"job"`, `"item"`).
    pub entity_type: String,
    /// The entity's id.
    pub entity_id: Uuid,
    /// What happened (e.g. `"stage_transition"`, `"gate_check"`).
    pub action: String,
    /// State before the action, if applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    /// State after the action, if applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    /// Free-text reason, e.g. the stage name transitioned to.
    pub reason: String,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Persistence for [`Job`], [`Item`], and the audit log.
///
/// Every orchestrator stage reads its inputs from a `JobStore` (plus the
/// Frontier and Evidence Store) and nothing else, so a crash between any two
/// stage transitions resumes cleanly (spec §4.I, P6).
pub trait JobStore: Send + Sync {
    /// Persist `job`, overwriting any existing row with the same id.
    fn save_job(&self, job: &Job) -> Result<(), StoreError>;
    /// Load a job by id.
    fn load_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;
    /// Find a job sharing `(tenant_id, input_hash)` that is eligible for
    /// cache reuse (spec §3 `Job` invariants).
    fn find_cached_job(&self, tenant_id: &str, input_hash: &str) -> Result<Option<Job>, StoreError>;

    /// Persist `item`, overwriting any existing row with the same id.
    fn save_item(&self, item: &Item) -> Result<(), StoreError>;
    /// Load an item by id.
    fn load_item(&self, item_id: Uuid) -> Result<Option<Item>, StoreError>;
    /// Load the item owned by `job_id`, if one has been created.
    fn load_item_for_job(&self, job_id: Uuid) -> Result<Option<Item>, StoreError>;

    /// Append one audit log entry.
    fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError>;
    /// The full audit trail for one entity, in insertion order.
    fn audit_log_for(&self, entity_id: Uuid) -> Result<Vec<AuditEntry>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<Uuid, Job>,
    items: HashMap<Uuid, Item>,
    items_by_job: HashMap<Uuid, Uuid>,
    audit: Vec<AuditEntry>,
}

/// In-memory [`JobStore`], primarily for tests and single-process embeds.
#[derive(Default)]
pub struct InMemoryJobStore {
    state: Mutex<MemoryState>,
}

impl InMemoryJobStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    fn load_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.jobs.get(&job_id).cloned())
    }

    fn find_cached_job(&self, tenant_id: &str, input_hash: &str) -> Result<Option<Job>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .jobs
            .values()
            .find(|j| j.shares_cache_with(tenant_id, input_hash, false))
            .cloned())
    }

    fn save_item(&self, item: &Item) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.items_by_job.insert(item.job_id, item.item_id);
        state.items.insert(item.item_id, item.clone());
        Ok(())
    }

    fn load_item(&self, item_id: Uuid) -> Result<Option<Item>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.items.get(&item_id).cloned())
    }

    fn load_item_for_job(&self, job_id: Uuid) -> Result<Option<Item>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .items_by_job
            .get(&job_id)
            .and_then(|id| state.items.get(id))
            .cloned())
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.audit.push(entry);
        Ok(())
    }

    fn audit_log_for(&self, entity_id: Uuid) -> Result<Vec<AuditEntry>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .audit
            .iter()
            .filter(|e| e.entity_id == entity_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// File-backed implementation
// ---------------------------------------------------------------------------

/// File-based [`JobStore`]: one JSON file per job/item under `root`, and one
/// append-only JSON-lines audit file. Mirrors the teacher's file-per-record
/// receipt store layout.
#[derive(Debug)]
pub struct FileJobStore {
    root: PathBuf,
    audit_lock: Mutex<()>,
}

impl FileJobStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StoreError::Backend {
            reason: format!("create store dir {}: {e}", root.display()),
        })?;
        Ok(Self {
            root,
            audit_lock: Mutex::new(()),
        })
    }

    fn job_path(&self, job_id: Uuid) -> PathBuf {
        self.root.join("jobs").join(format!("{job_id}.json"))
    }

    fn item_path(&self, item_id: Uuid) -> PathBuf {
        self.root.join("items").join(format!("{item_id}.json"))
    }

    fn audit_path(&self) -> PathBuf {
        self.root.join("audit_log.jsonl")
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
                reason: format!("create dir {}: {e}", parent.display()),
            })?;
        }
        let json = serde_json::to_string_pretty(value).map_err(|e| StoreError::Backend {
            reason: format!("serialize {}: {e}", path.display()),
        })?;
        std::fs::write(path, json).map_err(|e| StoreError::Backend {
            reason: format!("write {}: {e}", path.display()),
        })
    }

    fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, StoreError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let value = serde_json::from_str(&content).map_err(|e| StoreError::Backend {
                    reason: format!("parse {}: {e}", path.display()),
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Backend {
                reason: format!("read {}: {e}", path.display()),
            }),
        }
    }

    fn all_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let dir = self.root.join("jobs");
        let entries = match std::fs::read_dir(&dir) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Backend {
                    reason: format!("read dir {}: {e}", dir.display()),
                });
            }
        };
        let mut jobs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Backend {
                reason: e.to_string(),
            })?;
            if let Some(job) = Self::read_json::<Job>(&entry.path())? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }
}

impl JobStore for FileJobStore {
    fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        Self::write_json(&self.job_path(job.job_id), job)
    }

    fn load_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        Self::read_json(&self.job_path(job_id))
    }

    fn find_cached_job(&self, tenant_id: &str, input_hash: &str) -> Result<Option<Job>, StoreError> {
        Ok(self
            .all_jobs()?
            .into_iter()
            .find(|j| j.shares_cache_with(tenant_id, input_hash, false)))
    }

    fn save_item(&self, item: &Item) -> Result<(), StoreError> {
        Self::write_json(&self.item_path(item.item_id), item)?;
        let pointer = self.root.join("item_by_job").join(format!("{}", item.job_id));
        if let Some(parent) = pointer.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
                reason: format!("create dir {}: {e}", parent.display()),
            })?;
        }
        std::fs::write(&pointer, item.item_id.to_string()).map_err(|e| StoreError::Backend {
            reason: format!("write {}: {e}", pointer.display()),
        })
    }

    fn load_item(&self, item_id: Uuid) -> Result<Option<Item>, StoreError> {
        Self::read_json(&self.item_path(item_id))
    }

    fn load_item_for_job(&self, job_id: Uuid) -> Result<Option<Item>, StoreError> {
        let pointer = self.root.join("item_by_job").join(format!("{job_id}"));
        match std::fs::read_to_string(&pointer) {
            Ok(id_str) => {
                let item_id = Uuid::parse_str(id_str.trim()).map_err(|e| StoreError::Backend {
                    reason: format!("corrupt pointer {}: {e}", pointer.display()),
                })?;
                self.load_item(item_id)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Backend {
                reason: format!("read {}: {e}", pointer.display()),
            }),
        }
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        let _guard = self.audit_lock.lock().expect("audit mutex poisoned");
        let line = serde_json::to_string(&entry).map_err(|e| StoreError::Backend {
            reason: format!("serialize audit entry: {e}"),
        })?;
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.audit_path())
            .map_err(|e| StoreError::Backend {
                reason: format!("open audit log: {e}"),
            })?;
        writeln!(file, "{line}").map_err(|e| StoreError::Backend {
            reason: format!("write audit log: {e}"),
        })
    }

    fn audit_log_for(&self, entity_id: Uuid) -> Result<Vec<AuditEntry>, StoreError> {
        let content = match std::fs::read_to_string(self.audit_path()) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Backend {
                    reason: e.to_string(),
                });
            }
        };
        let mut entries = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry = serde_json::from_str(line).map_err(|e| StoreError::Backend {
                reason: format!("parse audit line: {e}"),
            })?;
            if entry.entity_id == entity_id {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::JobMode;

    fn sample_job() -> Job {
        Job::new(Uuid::new_v4(), "tenant-1", "HP CF217A", JobMode::Balanced, false, Utc::now())
    }

    #[test]
    fn in_memory_round_trips_a_job() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        store.save_job(&job).unwrap();
        let loaded = store.load_job(job.job_id).unwrap().unwrap();
        assert_eq!(loaded.job_id, job.job_id);
    }

    #[test]
    fn in_memory_finds_cached_job_by_tenant_and_hash() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        store.save_job(&job).unwrap();
        let found = store
            .find_cached_job("tenant-1", &job.input_hash)
            .unwrap()
            .unwrap();
        assert_eq!(found.job_id, job.job_id);
    }

    #[test]
    fn in_memory_audit_log_filters_by_entity() {
        let store = InMemoryJobStore::new();
        let job_id = Uuid::new_v4();
        store
            .append_audit(AuditEntry {
                id: Uuid::new_v4(),
                tenant_id: "tenant-1".into(),
                entity_type: "job".into(),
                entity_id: job_id,
                action: "stage_transition".into(),
                before: None,
                after: None,
                reason: "planning".into(),
                timestamp: Utc::now(),
            })
            .unwrap();
        store
            .append_audit(AuditEntry {
                id: Uuid::new_v4(),
                tenant_id: "tenant-1".into(),
                entity_type: "job".into(),
                entity_id: Uuid::new_v4(),
                action: "stage_transition".into(),
                before: None,
                after: None,
                reason: "planning".into(),
                timestamp: Utc::now(),
            })
            .unwrap();
        let log = store.audit_log_for(job_id).unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn file_store_round_trips_job_and_item_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let job = sample_job();

        {
            let store = FileJobStore::new(dir.path()).unwrap();
            store.save_job(&job).unwrap();
            let item = Item::new(Uuid::new_v4(), job.job_id);
            store.save_item(&item).unwrap();
        }

        let reopened = FileJobStore::new(dir.path()).unwrap();
        let loaded_job = reopened.load_job(job.job_id).unwrap().unwrap();
        assert_eq!(loaded_job.job_id, job.job_id);
        let loaded_item = reopened.load_item_for_job(job.job_id).unwrap().unwrap();
        assert_eq!(loaded_item.job_id, job.job_id);
    }

    #[test]
    fn file_store_appends_audit_entries_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path()).unwrap();
        let entity_id = Uuid::new_v4();
        for i in 0..3 {
            store
                .append_audit(AuditEntry {
                    id: Uuid::new_v4(),
                    tenant_id: "tenant-1".into(),
                    entity_type: "job".into(),
                    entity_id,
                    action: "stage_transition".into(),
                    before: None,
                    after: None,
                    reason: format!("stage-{i}"),
                    timestamp: Utc::now(),
                })
                .unwrap();
        }
        let log = store.audit_log_for(entity_id).unwrap();
        assert_eq!(log.len(), 3);
    }
}
