// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for Scout.
//!
//! [`JobConfig`] is the explicit value spec §9 calls for in place of
//! scattered kwargs/env lookups: every tunable named in spec §6 plus the
//! opaque `prompts` map and the trust-tier directory (spec §4.D) that the
//! Trust Engine reads instead of hardcoding domain-to-tier assignments.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::path::Path;

use schemars::JsonSchema;
use scout_core::SourceTier;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or validating a [`JobConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested overlay file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },
    /// The file, or an environment variable, could not be parsed.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },
    /// Semantic validation failed.
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

/// Advisory-level issues that do not prevent operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// An environment variable starting with `SCOUT_` was set but is not a
    /// key this crate recognizes.
    UnknownKey {
        /// The unrecognized variable name.
        key: String,
    },
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// A timeout/deadline is configured unusually large.
    LargeTimeout {
        /// Field name.
        field: String,
        /// Configured value in milliseconds.
        ms: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::UnknownKey { key } => write!(f, "unrecognized env var '{key}'"),
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LargeTimeout { field, ms } => {
                write!(f, "'{field}' is unusually large ({ms}ms)")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// JobConfig
// ---------------------------------------------------------------------------

/// Log output format selected for `scout-telemetry::init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, for local development.
    Pretty,
    /// One JSON object per line, for shipping to a log aggregator.
    Json,
}

/// All tunables a job run needs, loaded once and threaded explicitly through
/// constructors (spec §9: "represented as an explicit `JobConfig` value").
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JobConfig {
    /// Opaque connection string for the persistence backend. The core never
    /// parses this; it is handed to a storage adapter outside this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// `JOB_BUDGET_WALLCLOCK_MS`: per-job wall-clock budget.
    pub job_budget_wallclock_ms: u64,
    /// `JOB_BUDGET_ADAPTER_CALLS`: per-job adapter-call budget.
    pub job_budget_adapter_calls: u64,
    /// `SLICE_DEADLINE_MS`: per-slice wall clock.
    pub slice_deadline_ms: u64,
    /// `MAX_CONCURRENCY`: in-flight task cap per slice.
    pub max_concurrency: u32,
    /// `MAX_SLICES`: slices per job before the scheduler stops regardless of
    /// `done`.
    pub max_slices: u32,
    /// `MAX_REFLECTION_LOOPS`: repair passes after the base draft.
    pub max_reflection_loops: u32,
    /// `ADAPTER_TIMEOUT_MS`: per-adapter-call timeout.
    pub adapter_timeout_ms: u64,
    /// `SOURCE_CACHE_TTL_MS`: freshness horizon for cached source documents.
    pub source_cache_ttl_ms: u64,
    /// `LEASE_MS`: frontier task lease duration.
    pub lease_ms: u64,
    /// `MAX_TASK_ATTEMPTS`: attempts before a task is marked failed.
    pub max_task_attempts: u32,

    /// Log format for `scout-telemetry::init`.
    pub log_format: LogFormat,

    /// Domain/host to trust-tier assignments (spec §4.D); unmapped domains
    /// default to [`SourceTier::default_unknown`].
    #[serde(default)]
    pub trust_tiers: BTreeMap<String, SourceTier>,
    /// The single host treated as authoritative for `packaging.*` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logistics_authoritative_host: Option<String>,

    /// Opaque prompt text owned by configuration, keyed by agent name. The
    /// core never parses or assembles prompt semantics (spec §9).
    #[serde(default)]
    pub prompts: BTreeMap<String, String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            job_budget_wallclock_ms: 300_000,
            job_budget_adapter_calls: 200,
            slice_deadline_ms: 40_000,
            max_concurrency: 5,
            max_slices: 30,
            max_reflection_loops: 1,
            adapter_timeout_ms: 20_000,
            source_cache_ttl_ms: 86_400_000,
            lease_ms: 60_000,
            max_task_attempts: 3,
            log_format: LogFormat::Pretty,
            trust_tiers: BTreeMap::new(),
            logistics_authoritative_host: None,
            prompts: BTreeMap::new(),
        }
    }
}

impl JobConfig {
    /// Look up the trust tier for `domain`, defaulting to
    /// [`SourceTier::default_unknown`] when unmapped.
    #[must_use]
    pub fn tier_for(&self, domain: &str) -> SourceTier {
        self.trust_tiers
            .get(domain)
            .copied()
            .unwrap_or_else(SourceTier::default_unknown)
    }
}

const RECOGNIZED_ENV_KEYS: &[&str] = &[
    "DATABASE_URL",
    "JOB_BUDGET_WALLCLOCK_MS",
    "JOB_BUDGET_ADAPTER_CALLS",
    "SLICE_DEADLINE_MS",
    "MAX_CONCURRENCY",
    "MAX_SLICES",
    "MAX_REFLECTION_LOOPS",
    "ADAPTER_TIMEOUT_MS",
    "SOURCE_CACHE_TTL_MS",
    "LEASE_MS",
    "MAX_TASK_ATTEMPTS",
];

const LARGE_TIMEOUT_THRESHOLD_MS: u64 = 3_600_000;

fn parse_env_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().map_err(|_| ConfigError::ParseError {
            reason: format!("{key}={val:?} is not a valid integer"),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(key: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val.parse::<u32>().map_err(|_| ConfigError::ParseError {
            reason: format!("{key}={val:?} is not a valid integer"),
        }),
        Err(_) => Ok(default),
    }
}

impl JobConfig {
    /// Load a [`JobConfig`] from the environment variables enumerated in
    /// spec §6, falling back to documented defaults for anything unset.
    ///
    /// Unrecognized `SCOUT_`-prefixed variables produce a
    /// [`ConfigWarning::UnknownKey`] rather than an error, so forward
    /// compatibility with a newer binary's env vars doesn't break an older
    /// one. Malformed recognized values are a hard [`ConfigError::ParseError`].
    pub fn from_env() -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let mut warnings = Vec::new();
        let defaults = Self::default();

        let config = Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            job_budget_wallclock_ms: parse_env_u64(
                "JOB_BUDGET_WALLCLOCK_MS",
                defaults.job_budget_wallclock_ms,
            )?,
            job_budget_adapter_calls: parse_env_u64(
                "JOB_BUDGET_ADAPTER_CALLS",
                defaults.job_budget_adapter_calls,
            )?,
            slice_deadline_ms: parse_env_u64("SLICE_DEADLINE_MS", defaults.slice_deadline_ms)?,
            max_concurrency: parse_env_u32("MAX_CONCURRENCY", defaults.max_concurrency)?,
            max_slices: parse_env_u32("MAX_SLICES", defaults.max_slices)?,
            max_reflection_loops: parse_env_u32(
                "MAX_REFLECTION_LOOPS",
                defaults.max_reflection_loops,
            )?,
            adapter_timeout_ms: parse_env_u64("ADAPTER_TIMEOUT_MS", defaults.adapter_timeout_ms)?,
            source_cache_ttl_ms: parse_env_u64(
                "SOURCE_CACHE_TTL_MS",
                defaults.source_cache_ttl_ms,
            )?,
            lease_ms: parse_env_u64("LEASE_MS", defaults.lease_ms)?,
            max_task_attempts: parse_env_u32("MAX_TASK_ATTEMPTS", defaults.max_task_attempts)?,
            ..defaults
        };

        for (key, value) in std::env::vars() {
            if key.starts_with("SCOUT_") && !RECOGNIZED_ENV_KEYS.contains(&key.as_str()) {
                let _ = &value;
                warnings.push(ConfigWarning::UnknownKey { key });
            }
        }

        validate(&config, &mut warnings)?;
        Ok((config, warnings))
    }

    /// Load overlay values from a TOML file and merge them on top of
    /// `base`, with the overlay's present fields taking precedence.
    pub fn merge_from_toml_file(base: Self, path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let overlay: PartialJobConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                reason: e.to_string(),
            })?;
        Ok(overlay.merge_onto(base))
    }
}

/// A partially specified overlay, every field optional, used for TOML
/// overlay merging (spec §9 "dynamic config").
#[derive(Debug, Clone, Default, Deserialize)]
struct PartialJobConfig {
    database_url: Option<String>,
    job_budget_wallclock_ms: Option<u64>,
    job_budget_adapter_calls: Option<u64>,
    slice_deadline_ms: Option<u64>,
    max_concurrency: Option<u32>,
    max_slices: Option<u32>,
    max_reflection_loops: Option<u32>,
    adapter_timeout_ms: Option<u64>,
    source_cache_ttl_ms: Option<u64>,
    lease_ms: Option<u64>,
    max_task_attempts: Option<u32>,
    #[serde(default)]
    prompts: BTreeMap<String, String>,
}

impl PartialJobConfig {
    fn merge_onto(self, base: JobConfig) -> JobConfig {
        let mut prompts = base.prompts;
        prompts.extend(self.prompts);
        JobConfig {
            database_url: self.database_url.or(base.database_url),
            job_budget_wallclock_ms: self.job_budget_wallclock_ms.unwrap_or(base.job_budget_wallclock_ms),
            job_budget_adapter_calls: self
                .job_budget_adapter_calls
                .unwrap_or(base.job_budget_adapter_calls),
            slice_deadline_ms: self.slice_deadline_ms.unwrap_or(base.slice_deadline_ms),
            max_concurrency: self.max_concurrency.unwrap_or(base.max_concurrency),
            max_slices: self.max_slices.unwrap_or(base.max_slices),
            max_reflection_loops: self.max_reflection_loops.unwrap_or(base.max_reflection_loops),
            adapter_timeout_ms: self.adapter_timeout_ms.unwrap_or(base.adapter_timeout_ms),
            source_cache_ttl_ms: self.source_cache_ttl_ms.unwrap_or(base.source_cache_ttl_ms),
            lease_ms: self.lease_ms.unwrap_or(base.lease_ms),
            max_task_attempts: self.max_task_attempts.unwrap_or(base.max_task_attempts),
            prompts,
            ..base
        }
    }
}

fn validate(config: &JobConfig, warnings: &mut Vec<ConfigWarning>) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.max_concurrency == 0 {
        errors.push("max_concurrency must be >= 1".to_string());
    }
    if config.max_slices == 0 {
        errors.push("max_slices must be >= 1".to_string());
    }
    if config.max_task_attempts == 0 {
        errors.push("max_task_attempts must be >= 1".to_string());
    }
    if config.lease_ms == 0 {
        errors.push("lease_ms must be >= 1".to_string());
    }

    if config.slice_deadline_ms > LARGE_TIMEOUT_THRESHOLD_MS {
        warnings.push(ConfigWarning::LargeTimeout {
            field: "slice_deadline_ms".to_string(),
            ms: config.slice_deadline_ms,
        });
    }
    if config.logistics_authoritative_host.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "logistics_authoritative_host".to_string(),
            hint: "packaging.* fields will always resolve to missing_nix_data".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}
