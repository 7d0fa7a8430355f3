// SPDX-License-Identifier: MIT OR Apache-2.0
//! External adapter interfaces (spec §4.E): Search, Scrape, ScrapeBatch,
//! ExtractSchema, LLMJSON, ImageQC, FallbackSearch. The core depends only on
//! these traits; concrete providers live outside this workspace. A `mock`
//! submodule ships deterministic scripted fakes for tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use scout_error::ErrorCode;
use serde_json::Value;

/// The adapter failure taxonomy (spec §4.E / §7). Only `Transient` is
/// retried by the core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    /// Safe to retry (network hiccup, 5xx).
    #[error("transient adapter failure: {0}")]
    Transient(String),
    /// Retrying will not fix this.
    #[error("permanent adapter failure: {0}")]
    Permanent(String),
    /// The provider reports exhausted usage credits.
    #[error("adapter credits exhausted: {0}")]
    CreditsExhausted(String),
    /// The requested resource does not exist upstream.
    #[error("not found: {0}")]
    NotFound(String),
    /// The adapter returned a payload that failed schema validation.
    #[error("validation error: {0}")]
    ValidationError(String),
    /// The call exceeded its configured timeout.
    #[error("adapter call timed out after {0}ms")]
    Timeout(u64),
}

impl AdapterError {
    /// The stable error code this variant maps to.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            AdapterError::Transient(_) => ErrorCode::AdapterTransient,
            AdapterError::Permanent(_) => ErrorCode::AdapterPermanent,
            AdapterError::CreditsExhausted(_) => ErrorCode::AdapterCreditsExhausted,
            AdapterError::NotFound(_) => ErrorCode::AdapterNotFound,
            AdapterError::ValidationError(_) => ErrorCode::AdapterValidationError,
            AdapterError::Timeout(_) => ErrorCode::AdapterTimeout,
        }
    }

    /// Whether the core is permitted to retry this failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdapterError::Transient(_))
    }
}

/// One organic search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Result URL.
    pub url: String,
    /// Result title.
    pub title: String,
    /// Short excerpt.
    pub snippet: String,
}

/// Options accepted by [`Search::search`].
#[derive(Debug, Clone, Copy)]
pub struct SearchOpts {
    /// Maximum number of results to return.
    pub limit: usize,
}

impl Default for SearchOpts {
    fn default() -> Self {
        Self { limit: 10 }
    }
}

/// Runs a search-engine query.
#[async_trait]
pub trait Search: Send + Sync {
    /// Execute `query`, returning up to `opts.limit` results.
    async fn search(&self, query: &str, opts: SearchOpts) -> Result<Vec<SearchResult>, AdapterError>;
}

/// The body and extraction-time metadata of one fetched page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeResult {
    /// Page content, markdown or plain text.
    pub markdown: String,
    /// Page title, if detected.
    pub title: Option<String>,
    /// Sub-document URLs discovered while crawling (`domain_crawl` tasks
    /// only; empty for a plain single-page scrape).
    pub discovered_urls: Vec<String>,
}

/// Options accepted by [`Scrape::scrape`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrapeOpts {
    /// Follow a small depth allowance for `domain_crawl` tasks.
    pub depth: u32,
}

/// Fetches one page's content.
#[async_trait]
pub trait Scrape: Send + Sync {
    /// Fetch `url`.
    async fn scrape(&self, url: &str, opts: ScrapeOpts) -> Result<ScrapeResult, AdapterError>;
}

/// One entry of a [`ScrapeBatch::scrape_batch`] response.
#[derive(Debug, Clone)]
pub struct BatchScrapeEntry {
    /// The requested URL.
    pub url: String,
    /// The outcome for this URL.
    pub result: Result<ScrapeResult, AdapterError>,
}

/// Fetches several pages in one call.
#[async_trait]
pub trait ScrapeBatch: Send + Sync {
    /// Fetch every URL in `urls`, one outcome per input in the same order.
    async fn scrape_batch(&self, urls: &[String], opts: ScrapeOpts) -> Result<Vec<BatchScrapeEntry>, AdapterError>;
}

/// Performs structured extraction against a caller-supplied JSON schema.
#[async_trait]
pub trait ExtractSchema: Send + Sync {
    /// Extract structured JSON from `url` conforming to `schema`.
    async fn extract_schema(&self, url: &str, schema: &Value) -> Result<Value, AdapterError>;
}

/// Hints passed alongside an [`LlmJson::llm_json`] prompt.
#[derive(Debug, Clone, Default)]
pub struct LlmHints {
    /// Free-form extra context (e.g. already-known canonical name).
    pub context: std::collections::BTreeMap<String, String>,
}

/// Produces JSON conforming to a schema from a free-form prompt.
#[async_trait]
pub trait LlmJson: Send + Sync {
    /// Run `prompt` against `schema`, returning the parsed JSON response.
    async fn llm_json(&self, prompt: &str, schema: &Value, hints: &LlmHints) -> Result<Value, AdapterError>;
}

/// Outcome of an image quality check.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageQcResult {
    /// Whether the image passed all checks.
    pub passes: bool,
    /// Reasons for failure, empty when `passes` is `true`.
    pub reasons: Vec<String>,
}

/// Validates a product image.
#[async_trait]
pub trait ImageQc: Send + Sync {
    /// Check `image_url`.
    async fn image_qc(&self, image_url: &str) -> Result<ImageQcResult, AdapterError>;
}

/// One result from a [`FallbackSearch::fallback_search`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackResult {
    /// Result URL.
    pub url: String,
    /// Result title.
    pub title: String,
    /// Content already rendered as markdown (no separate scrape needed).
    pub markdown: String,
}

/// Search provider used only when the primary scraper is `CreditsExhausted`
/// or yields zero results; returns content directly so no further `Scrape`
/// call is required.
#[async_trait]
pub trait FallbackSearch: Send + Sync {
    /// Execute `query` via the fallback provider.
    async fn fallback_search(&self, query: &str) -> Result<Vec<FallbackResult>, AdapterError>;
}

/// Bundles every adapter collaborator as an explicit value threaded through
/// constructors (spec §9 "global singletons become an explicit value"),
/// rather than referenced through ambient statics.
#[derive(Clone)]
pub struct Deps {
    /// Search provider.
    pub search: Arc<dyn Search>,
    /// Scrape provider.
    pub scrape: Arc<dyn Scrape>,
    /// Batch scrape provider.
    pub scrape_batch: Arc<dyn ScrapeBatch>,
    /// Structured extraction provider.
    pub extract_schema: Arc<dyn ExtractSchema>,
    /// LLM JSON provider.
    pub llm_json: Arc<dyn LlmJson>,
    /// Image QC provider.
    pub image_qc: Arc<dyn ImageQc>,
    /// Fallback search provider.
    pub fallback_search: Arc<dyn FallbackSearch>,
}
