//! The [`Plan`]: a research strategy derived once at the `plan` stage and
//! immutable thereafter.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The shape of a single research strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    /// A search-engine query string.
    Query,
    /// A single URL to fetch directly.
    Url,
    /// Crawl a domain from its root with a small depth allowance.
    DomainCrawl,
    /// Search scoped to one domain.
    DomainMap,
}

/// One line of a [`Plan`]: what to look for and how.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Strategy {
    /// Human-readable label, carried into frontier task metadata.
    pub name: String,
    /// What kind of frontier task this strategy expands into.
    pub strategy_type: StrategyType,
    /// The query string, URL, or domain this strategy targets.
    pub value: String,
    /// Restricts a `DomainMap`/`DomainCrawl` strategy to one host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_domain: Option<String>,
    /// Extraction schema hint passed through to `ExtractSchema`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

/// Suggested execution envelope for the slice scheduler, derived at planning
/// time from the job's [`crate::JobMode`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct SuggestedBudget {
    /// Mirrors the job's requested mode.
    pub mode: crate::JobMode,
    /// Suggested `MAX_CONCURRENCY`.
    pub concurrency: u32,
    /// Suggested depth cap for frontier expansion.
    pub depth: u32,
}

/// The research strategy for one job: a set of strategies plus optional
/// shortcuts discovered at planning time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// The strategies to seed into the frontier.
    pub strategies: Vec<Strategy>,
    /// Manufacturer part number, if recognized during planning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpn: Option<String>,
    /// Canonical product name, if known before any search occurs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_name: Option<String>,
    /// Scheduler hints derived from the job's mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_budget: Option<SuggestedBudget>,
    /// Pre-known facts that shortcut part of the search (e.g. from a
    /// previous job's result).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<serde_json::Value>,
}

impl Plan {
    /// A plan with a single `url` strategy, used by the orchestrator's
    /// "direct guess" short-circuit when `input_raw` matches a known MPN
    /// pattern and resolves to a canonical manufacturer URL.
    #[must_use]
    pub fn direct_guess(mpn: impl Into<String>, canonical_url: impl Into<String>) -> Self {
        Self {
            strategies: vec![Strategy {
                name: "direct_guess".to_string(),
                strategy_type: StrategyType::Url,
                value: canonical_url.into(),
                target_domain: None,
                schema: None,
            }],
            mpn: Some(mpn.into()),
            canonical_name: None,
            suggested_budget: None,
            evidence: None,
        }
    }
}
