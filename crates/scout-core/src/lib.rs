// SPDX-License-Identifier: MIT OR Apache-2.0
//! Domain model, clock/id generation, and canonicalization helpers for
//! Scout: the `Job`, `Plan`, `FrontierTask`, `SourceDocument`, `Claim`, and
//! `Item` entities plus the small [`Clock`]/[`IdGen`] traits other crates
//! build on instead of calling `Utc::now()`/`Uuid::new_v4()` inline.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod claim;
mod clock;
mod document;
mod error;
mod hashing;
mod item;
mod job;
mod plan;
mod task;
mod tier;

pub use claim::Claim;
pub use clock::{Clock, FixedClock, IdGen, SequentialIdGen, SystemClock, UuidV4Gen};
pub use document::{DocumentMetadata, DocumentStatus, SourceDocument};
pub use error::CoreError;
pub use hashing::{canonicalize_url, domain_of, input_hash, normalize_input, url_hash};
pub use item::{FieldEvidence, Item, ItemStatus};
pub use job::{Job, JobMode, JobStatus};
pub use plan::{Plan, Strategy, StrategyType, SuggestedBudget};
pub use task::{FrontierTask, TaskMeta, TaskState, TaskType};
pub use tier::SourceTier;
