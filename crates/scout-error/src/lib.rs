// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for Scout.
//!
//! Every Scout error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, an optional cause chain, and
//! arbitrary key-value context. Use [`ScoutError::new`] to construct errors
//! fluently, then `.with_context(key, value)` to attach diagnostics.
//!
//! [`ErrorCode`] also encodes the adapter failure taxonomy from the system
//! spec (`Transient`, `Permanent`, `CreditsExhausted`, `NotFound`,
//! `ValidationError`) alongside the core's own invariant-violation codes, so
//! every crate's local error enum can map into one stable vocabulary via a
//! `.code()` method.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Adapter-boundary failures (search/scrape/extract/LLM/image).
    Adapter,
    /// Frontier queue errors.
    Frontier,
    /// Evidence store errors.
    Evidence,
    /// Trust engine arbitration errors.
    Trust,
    /// Orchestrator stage-machine errors.
    Orchestrator,
    /// Quality gatekeeper errors.
    Gatekeeper,
    /// Configuration errors.
    Config,
    /// Domain model / validation errors raised by `scout-core`.
    Core,
    /// Job/Item persistence and audit-log errors.
    Store,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Adapter => "adapter",
            Self::Frontier => "frontier",
            Self::Evidence => "evidence",
            Self::Trust => "trust",
            Self::Orchestrator => "orchestrator",
            Self::Gatekeeper => "gatekeeper",
            Self::Config => "config",
            Self::Core => "core",
            Self::Store => "store",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serializes to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Adapter failure taxonomy (spec §4.E / §7) --
    /// The call failed in a way that is safe to retry (network hiccup, 5xx).
    AdapterTransient,
    /// The call failed in a way that retrying will not fix.
    AdapterPermanent,
    /// The external provider reports exhausted usage credits.
    AdapterCreditsExhausted,
    /// The requested resource does not exist upstream.
    AdapterNotFound,
    /// The adapter returned a payload that failed schema validation.
    AdapterValidationError,
    /// The adapter call exceeded `ADAPTER_TIMEOUT`.
    AdapterTimeout,

    // -- Frontier --
    /// Requested task id is not known to the frontier.
    FrontierTaskNotFound,
    /// `(job_id, value)` is already enqueued in a non-terminal state.
    FrontierDuplicateTask,
    /// `complete()` was called on a task not currently leased.
    FrontierNotLeased,

    // -- Evidence store --
    /// Batch claim insert failed and was rolled back entirely.
    EvidenceBatchInsertFailed,
    /// A claim referenced a source document outside its own job.
    EvidenceCrossJobReference,
    /// A claim referenced a source document id the store has never seen.
    EvidenceUnknownSourceDoc,

    // -- Trust engine --
    /// A required logistics field has no claims from the authoritative host.
    TrustMissingAuthoritativeSource,
    /// Trust engine received an empty claim list.
    TrustNoClaims,

    // -- Orchestrator --
    /// Stage received state inconsistent with its preconditions.
    OrchestratorInvalidTransition,
    /// An invariant that must never be violated was violated; fatal for the job.
    OrchestratorInvariantViolation,

    // -- Gatekeeper --
    /// A required top-level field is missing or below the confidence floor.
    GatekeeperRequiredFieldMissing,

    // -- Config --
    /// Configuration value failed to parse or validate.
    ConfigInvalid,

    // -- Core --
    /// A URL could not be parsed or canonicalized.
    CoreInvalidUrl,
    /// A status transition violated the monotonic stage ordering invariant.
    CoreInvalidTransition,

    // -- Store --
    /// The requested entity does not exist in the store.
    StoreNotFound,
    /// The storage backend failed (I/O, serialization).
    StoreBackend,

    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Return the [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AdapterTransient
            | Self::AdapterPermanent
            | Self::AdapterCreditsExhausted
            | Self::AdapterNotFound
            | Self::AdapterValidationError
            | Self::AdapterTimeout => ErrorCategory::Adapter,
            Self::FrontierTaskNotFound | Self::FrontierDuplicateTask | Self::FrontierNotLeased => {
                ErrorCategory::Frontier
            }
            Self::EvidenceBatchInsertFailed
            | Self::EvidenceCrossJobReference
            | Self::EvidenceUnknownSourceDoc => ErrorCategory::Evidence,
            Self::TrustMissingAuthoritativeSource | Self::TrustNoClaims => ErrorCategory::Trust,
            Self::OrchestratorInvalidTransition | Self::OrchestratorInvariantViolation => {
                ErrorCategory::Orchestrator
            }
            Self::GatekeeperRequiredFieldMissing => ErrorCategory::Gatekeeper,
            Self::ConfigInvalid => ErrorCategory::Config,
            Self::CoreInvalidUrl | Self::CoreInvalidTransition => ErrorCategory::Core,
            Self::StoreNotFound | Self::StoreBackend => ErrorCategory::Store,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Whether the core is permitted to retry an operation that failed with
    /// this code (spec §7: "only `Transient` is retried by the core").
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AdapterTransient)
    }

    /// Whether this code is fatal for the owning job (spec §7:
    /// `InternalInvariantViolation` terminates the job; everything else is
    /// recorded and the job continues).
    #[must_use]
    pub fn is_fatal_for_job(&self) -> bool {
        matches!(self, Self::OrchestratorInvariantViolation)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).unwrap_or_default();
        f.write_str(json.trim_matches('"'))
    }
}

// ---------------------------------------------------------------------------
// ScoutError
// ---------------------------------------------------------------------------

/// A classified error carrying a stable code, message, context, and cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutError {
    /// Stable machine-readable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary key-value diagnostic context.
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    /// String-rendered cause, if this error wraps another.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ScoutError {
    /// Construct a new error with the given code and message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
            cause: None,
        }
    }

    /// Attach a context key-value pair, returning `self` for chaining.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach a rendered cause, returning `self` for chaining.
    #[must_use]
    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

impl fmt::Display for ScoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {cause})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ScoutError {}
