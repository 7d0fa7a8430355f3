//! Deterministic scripted fakes for every adapter trait, replaying canned
//! responses from a `Vec` rather than calling a real provider. Used by
//! executor/scheduler/orchestrator tests so the rest of the system can be
//! exercised without network access.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    AdapterError, BatchScrapeEntry, ExtractSchema, FallbackResult, FallbackSearch, ImageQc,
    ImageQcResult, LlmHints, LlmJson, Scrape, ScrapeBatch, ScrapeOpts, ScrapeResult, Search,
    SearchOpts, SearchResult,
};

struct Script<T> {
    responses: Mutex<Vec<Result<T, AdapterError>>>,
}

impl<T> Script<T> {
    fn new(responses: Vec<Result<T, AdapterError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }

    fn next(&self) -> Result<T, AdapterError> {
        let mut guard = self.responses.lock().expect("mock script mutex poisoned");
        if guard.is_empty() {
            return Err(AdapterError::Permanent("mock script exhausted".to_string()));
        }
        guard.remove(0)
    }
}

/// Replays a fixed sequence of [`Search`] responses.
pub struct ScriptedSearch {
    script: Script<Vec<SearchResult>>,
}

impl ScriptedSearch {
    /// Build a fake that returns each response in order, one per call.
    #[must_use]
    pub fn new(responses: Vec<Result<Vec<SearchResult>, AdapterError>>) -> Self {
        Self {
            script: Script::new(responses),
        }
    }
}

#[async_trait]
impl Search for ScriptedSearch {
    async fn search(&self, _query: &str, opts: SearchOpts) -> Result<Vec<SearchResult>, AdapterError> {
        self.script.next().map(|mut results| {
            results.truncate(opts.limit);
            results
        })
    }
}

/// Replays a fixed sequence of [`Scrape`] responses.
pub struct ScriptedScrape {
    script: Script<ScrapeResult>,
}

impl ScriptedScrape {
    /// Build a fake that returns each response in order, one per call.
    #[must_use]
    pub fn new(responses: Vec<Result<ScrapeResult, AdapterError>>) -> Self {
        Self {
            script: Script::new(responses),
        }
    }
}

#[async_trait]
impl Scrape for ScriptedScrape {
    async fn scrape(&self, _url: &str, _opts: ScrapeOpts) -> Result<ScrapeResult, AdapterError> {
        self.script.next()
    }
}

/// Delegates batch scrapes to a wrapped [`Scrape`] fake, one call per URL;
/// mirrors how a real provider without native batching would be adapted.
pub struct ScriptedScrapeBatch {
    inner: ScriptedScrape,
}

impl ScriptedScrapeBatch {
    /// Build a fake backed by the given per-URL scrape responses.
    #[must_use]
    pub fn new(responses: Vec<Result<ScrapeResult, AdapterError>>) -> Self {
        Self {
            inner: ScriptedScrape::new(responses),
        }
    }
}

#[async_trait]
impl ScrapeBatch for ScriptedScrapeBatch {
    async fn scrape_batch(&self, urls: &[String], opts: ScrapeOpts) -> Result<Vec<BatchScrapeEntry>, AdapterError> {
        let mut out = Vec::with_capacity(urls.len());
        for url in urls {
            let result = self.inner.scrape(url, opts).await;
            out.push(BatchScrapeEntry {
                url: url.clone(),
                result,
            });
        }
        Ok(out)
    }
}

/// Replays a fixed sequence of [`ExtractSchema`] responses.
pub struct ScriptedExtractSchema {
    script: Script<Value>,
}

impl ScriptedExtractSchema {
    /// Build a fake that returns each response in order, one per call.
    #[must_use]
    pub fn new(responses: Vec<Result<Value, AdapterError>>) -> Self {
        Self {
            script: Script::new(responses),
        }
    }
}

#[async_trait]
impl ExtractSchema for ScriptedExtractSchema {
    async fn extract_schema(&self, _url: &str, _schema: &Value) -> Result<Value, AdapterError> {
        self.script.next()
    }
}

/// Replays a fixed sequence of [`LlmJson`] responses.
pub struct ScriptedLlmJson {
    script: Script<Value>,
}

impl ScriptedLlmJson {
    /// Build a fake that returns each response in order, one per call.
    #[must_use]
    pub fn new(responses: Vec<Result<Value, AdapterError>>) -> Self {
        Self {
            script: Script::new(responses),
        }
    }
}

#[async_trait]
impl LlmJson for ScriptedLlmJson {
    async fn llm_json(&self, _prompt: &str, _schema: &Value, _hints: &LlmHints) -> Result<Value, AdapterError> {
        self.script.next()
    }
}

/// Replays a fixed sequence of [`ImageQc`] responses.
pub struct ScriptedImageQc {
    script: Script<ImageQcResult>,
}

impl ScriptedImageQc {
    /// Build a fake that returns each response in order, one per call.
    #[must_use]
    pub fn new(responses: Vec<Result<ImageQcResult, AdapterError>>) -> Self {
        Self {
            script: Script::new(responses),
        }
    }
}

#[async_trait]
impl ImageQc for ScriptedImageQc {
    async fn image_qc(&self, _image_url: &str) -> Result<ImageQcResult, AdapterError> {
        self.script.next()
    }
}

/// Replays a fixed sequence of [`FallbackSearch`] responses.
pub struct ScriptedFallbackSearch {
    script: Script<Vec<FallbackResult>>,
}

impl ScriptedFallbackSearch {
    /// Build a fake that returns each response in order, one per call.
    #[must_use]
    pub fn new(responses: Vec<Result<Vec<FallbackResult>, AdapterError>>) -> Self {
        Self {
            script: Script::new(responses),
        }
    }
}

#[async_trait]
impl FallbackSearch for ScriptedFallbackSearch {
    async fn fallback_search(&self, _query: &str) -> Result<Vec<FallbackResult>, AdapterError> {
        self.script.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_search_replays_in_order_then_truncates_to_limit() {
        let fake = ScriptedSearch::new(vec![Ok(vec![
            SearchResult {
                url: "https://a.example.com".to_string(),
                title: "a".to_string(),
                snippet: "".to_string(),
            },
            SearchResult {
                url: "https://b.example.com".to_string(),
                title: "b".to_string(),
                snippet: "".to_string(),
            },
        ])]);
        let results = fake.search("q", SearchOpts { limit: 1 }).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://a.example.com");
    }

    #[tokio::test]
    async fn scripted_script_errors_once_exhausted() {
        let fake = ScriptedScrape::new(vec![Ok(ScrapeResult::default())]);
        fake.scrape("https://a.example.com", ScrapeOpts::default()).await.unwrap();
        let err = fake.scrape("https://a.example.com", ScrapeOpts::default()).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn scrape_batch_delegates_per_url_in_order() {
        let fake = ScriptedScrapeBatch::new(vec![
            Ok(ScrapeResult {
                markdown: "one".to_string(),
                title: None,
                discovered_urls: Vec::new(),
            }),
            Err(AdapterError::NotFound("missing".to_string())),
        ]);
        let urls = vec!["https://a.example.com".to_string(), "https://b.example.com".to_string()];
        let entries = fake.scrape_batch(&urls, ScrapeOpts::default()).await.unwrap();
        assert!(entries[0].result.is_ok());
        assert!(entries[1].result.is_err());
    }
}
