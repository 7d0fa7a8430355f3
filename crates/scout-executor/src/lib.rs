// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Task Executor (spec §4.F): turns one [`FrontierTask`] into source
//! documents and claims, reading/writing through the Evidence Store and
//! calling out to [`Deps`]'s adapters. Pure with respect to Frontier state:
//! expansions are returned, never enqueued directly.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod retry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use scout_adapters::{AdapterError, Deps, LlmHints, ScrapeOpts, ScrapeResult, SearchOpts};
use scout_core::{
    Clock, DocumentMetadata, DocumentStatus, FrontierTask, IdGen, SourceDocument, TaskMeta,
    TaskType,
};
use scout_evidence::EvidenceStore;
use serde_json::{json, Value};
use uuid::Uuid;

/// A follow-up unit of work discovered while processing a task. The caller
/// (the Slice Scheduler / Orchestrator) is responsible for enqueuing these
/// into the Frontier; the Executor never mutates Frontier state itself.
#[derive(Debug, Clone)]
pub struct Expansion {
    /// What kind of task this expansion should become.
    pub task_type: TaskType,
    /// Query string, URL, or domain.
    pub value: String,
    /// Suggested priority.
    pub priority: i32,
    /// Expansion depth, one deeper than the originating task.
    pub depth: i32,
    /// Provenance carried into the new task.
    pub meta: TaskMeta,
}

/// Everything produced by running one task (spec §4.F output shape).
#[derive(Debug, Clone, Default)]
pub struct TaskOutput {
    /// Source documents fetched or reused from cache.
    pub docs: Vec<SourceDocument>,
    /// Claims extracted from `docs`.
    pub claims: Vec<scout_core::Claim>,
    /// Follow-up tasks discovered during processing.
    pub expansions: Vec<Expansion>,
    /// Whether this task observed a `CreditsExhausted` adapter failure.
    pub exhausted_flag: bool,
    /// Whether the task should be reported to the Frontier as failed
    /// (a permanent adapter failure occurred and nothing could be salvaged).
    pub failed: bool,
}

/// Tunable behavior independent of the task's own fields.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    /// Results kept after the relevance filter for `query`/`domain_map`.
    pub relevance_k: usize,
    /// Whether follow-up queries should be requested (`query` tasks only).
    pub expand: bool,
    /// Cache freshness window passed to the Evidence Store.
    pub source_cache_ttl: ChronoDuration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            relevance_k: 5,
            expand: true,
            source_cache_ttl: ChronoDuration::hours(24),
        }
    }
}

const CLAIM_SCHEMA_NAME: &str = "scout.generic_claim_list.v1";

fn claim_extraction_schema() -> Value {
    json!({
        "name": CLAIM_SCHEMA_NAME,
        "type": "object",
        "properties": {
            "claims": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "field": {"type": "string"},
                        "value": {"type": "string"},
                        "confidence": {"type": "integer", "minimum": 0, "maximum": 100}
                    },
                    "required": ["field", "value", "confidence"]
                }
            }
        },
        "required": ["claims"]
    })
}

fn parse_claims(raw: &Value) -> Vec<(String, String, u8)> {
    raw.get("claims")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let field = entry.get("field")?.as_str()?.to_string();
                    let value = entry.get("value")?.as_str()?.to_string();
                    let confidence = entry.get("confidence")?.as_u64()?.min(100) as u8;
                    Some((field, value, confidence))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Processes Frontier tasks into source documents and claims.
pub struct TaskExecutor {
    deps: Deps,
    evidence: Arc<dyn EvidenceStore>,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGen>,
    /// Set once any adapter call in this job reports `CreditsExhausted`
    /// (spec §4.F "subsequent Scrape calls in the same job are skipped").
    credits_exhausted: AtomicBool,
}

impl TaskExecutor {
    /// Build an executor scoped to one job's `Deps` bundle.
    #[must_use]
    pub fn new(deps: Deps, evidence: Arc<dyn EvidenceStore>, clock: Arc<dyn Clock>, id_gen: Arc<dyn IdGen>) -> Self {
        Self {
            deps,
            evidence,
            clock,
            id_gen,
            credits_exhausted: AtomicBool::new(false),
        }
    }

    /// Whether this job has observed a credits-exhausted adapter failure.
    #[must_use]
    pub fn is_credits_exhausted(&self) -> bool {
        self.credits_exhausted.load(Ordering::SeqCst)
    }

    /// Run `task` against the item it contributes to.
    pub async fn execute(&self, task: &FrontierTask, item_id: Uuid, opts: ExecuteOptions) -> TaskOutput {
        match task.task_type {
            TaskType::Query => self.execute_query(task, item_id, &task.value, opts).await,
            TaskType::Url => self.execute_url(task, item_id, &task.value, opts).await,
            TaskType::DomainCrawl => self.execute_domain_crawl(task, item_id, &task.value, opts).await,
            TaskType::DomainMap => self.execute_domain_map(task, item_id, opts).await,
        }
    }

    async fn fetch_with_cache(&self, job_id: Uuid, url: &str, opts: ScrapeOpts, now: chrono::DateTime<Utc>, ttl: ChronoDuration) -> Result<SourceDocument, AdapterError> {
        if let Ok(Some(cached)) = self.evidence.find_source_by_url(url, now, ttl) {
            return Ok(cached);
        }

        let scraped = self.deps.scrape.scrape(url, opts).await?;
        let doc_id = self.id_gen.new_uuid();
        let metadata = DocumentMetadata {
            title: scraped.title.clone(),
            source_type: Some("scrape".to_string()),
        };
        let doc_id = self
            .evidence
            .upsert_source(doc_id, job_id, url, &scraped.markdown, metadata, DocumentStatus::Success, now)
            .map_err(|e| AdapterError::Permanent(e.to_string()))?;
        self.evidence
            .find_source_by_url(url, now, ttl)
            .ok()
            .flatten()
            .filter(|d| d.doc_id == doc_id)
            .ok_or_else(|| AdapterError::Permanent("document vanished after upsert".to_string()))
    }

    async fn extract_claims(&self, item_id: Uuid, doc: &SourceDocument) -> Vec<scout_core::Claim> {
        let prompt = format!("Extract structured product claims from the following document.\n\n{}", doc.raw_content);
        let schema = claim_extraction_schema();
        let hints = LlmHints::default();
        let response = match self.deps.llm_json.llm_json(&prompt, &schema, &hints).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(target: "scout.executor", doc_id = %doc.doc_id, error = %err, "claim extraction failed");
                return Vec::new();
            }
        };

        let now = self.clock.now();
        let claims: Vec<scout_core::Claim> = parse_claims(&response)
            .into_iter()
            .map(|(field, value, confidence)| scout_core::Claim {
                claim_id: self.id_gen.new_uuid(),
                item_id,
                source_doc_id: doc.doc_id,
                field,
                value,
                confidence,
                extracted_at: now,
            })
            .collect();

        if !claims.is_empty() {
            if let Err(err) = self.evidence.insert_claims_batch(claims.clone()) {
                tracing::warn!(target: "scout.executor", doc_id = %doc.doc_id, error = %err, "claim persist failed");
            }
        }

        claims
    }

    async fn process_url_for_claims(&self, job_id: Uuid, item_id: Uuid, url: &str, opts: &ExecuteOptions) -> (Option<SourceDocument>, Vec<scout_core::Claim>, bool) {
        let now = self.clock.now();
        match self
            .fetch_with_cache(job_id, url, ScrapeOpts::default(), now, opts.source_cache_ttl)
            .await
        {
            Ok(doc) => {
                let claims = self.extract_claims(item_id, &doc).await;
                (Some(doc), claims, false)
            }
            Err(AdapterError::CreditsExhausted(_)) => {
                self.credits_exhausted.store(true, Ordering::SeqCst);
                (None, Vec::new(), true)
            }
            Err(err) => {
                tracing::warn!(target: "scout.executor", url, error = %err, "scrape failed");
                (None, Vec::new(), false)
            }
        }
    }

    async fn execute_query(&self, task: &FrontierTask, item_id: Uuid, query: &str, opts: ExecuteOptions) -> TaskOutput {
        let job_id = task.job_id;
        let mut output = TaskOutput::default();

        if self.is_credits_exhausted() {
            return self.execute_query_via_fallback(job_id, item_id, query).await;
        }

        let results = match self.deps.search.search(query, SearchOpts { limit: opts.relevance_k.max(1) * 2 }).await {
            Ok(r) => r,
            Err(AdapterError::CreditsExhausted(_)) => {
                self.credits_exhausted.store(true, Ordering::SeqCst);
                return self.execute_query_via_fallback(job_id, item_id, query).await;
            }
            Err(err) => {
                tracing::warn!(target: "scout.executor", query, error = %err, "search failed");
                output.failed = !matches!(err, AdapterError::Transient(_));
                return output;
            }
        };

        if results.is_empty() {
            return self.execute_query_via_fallback(job_id, item_id, query).await;
        }

        let relevant = results.into_iter().take(opts.relevance_k);
        for result in relevant {
            let (doc, claims, exhausted) = self.process_url_for_claims(job_id, item_id, &result.url, &opts).await;
            output.exhausted_flag |= exhausted;
            if let Some(doc) = doc {
                output.docs.push(doc);
            }
            output.claims.extend(claims);
        }

        if output.exhausted_flag && output.docs.is_empty() {
            return self.execute_query_via_fallback(job_id, item_id, query).await;
        }

        if opts.expand && !output.docs.is_empty() {
            output.expansions.push(Expansion {
                task_type: TaskType::Query,
                value: format!("{query} specifications"),
                priority: task.priority - 5,
                depth: task.depth + 1,
                meta: TaskMeta {
                    discovered_from: Some(task.task_id),
                    ..TaskMeta::default()
                },
            });
        }

        output
    }

    async fn execute_query_via_fallback(&self, job_id: Uuid, item_id: Uuid, query: &str) -> TaskOutput {
        let mut output = TaskOutput {
            exhausted_flag: true,
            ..TaskOutput::default()
        };
        let now = self.clock.now();
        let fallback_results = match self.deps.fallback_search.fallback_search(query).await {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(target: "scout.executor", query, error = %err, "fallback search failed");
                output.failed = true;
                return output;
            }
        };

        for result in fallback_results {
            let doc_id = self.id_gen.new_uuid();
            let metadata = DocumentMetadata {
                title: Some(result.title.clone()),
                source_type: Some("fallback_search".to_string()),
            };
            let doc_id = match self.evidence.upsert_source(doc_id, job_id, &result.url, &result.markdown, metadata, DocumentStatus::Success, now) {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!(target: "scout.executor", url = %result.url, error = %err, "fallback doc persist failed");
                    continue;
                }
            };
            if let Ok(Some(doc)) = self.evidence.find_source_by_url(&result.url, now, ChronoDuration::hours(24)) {
                if doc.doc_id == doc_id {
                    let claims = self.extract_claims(item_id, &doc).await;
                    output.claims.extend(claims);
                    output.docs.push(doc);
                }
            }
        }
        output
    }

    async fn execute_url(&self, task: &FrontierTask, item_id: Uuid, url: &str, opts: ExecuteOptions) -> TaskOutput {
        let mut output = TaskOutput::default();
        if self.is_credits_exhausted() {
            output.exhausted_flag = true;
            return output;
        }
        let (doc, claims, exhausted) = self.process_url_for_claims(task.job_id, item_id, url, &opts).await;
        output.exhausted_flag = exhausted;
        output.failed = doc.is_none() && !exhausted;
        if let Some(doc) = doc {
            output.docs.push(doc);
        }
        output.claims = claims;
        output
    }

    async fn execute_domain_crawl(&self, task: &FrontierTask, item_id: Uuid, root: &str, opts: ExecuteOptions) -> TaskOutput {
        let mut output = TaskOutput::default();
        if self.is_credits_exhausted() {
            output.exhausted_flag = true;
            return output;
        }
        let now = self.clock.now();
        let scrape_opts = ScrapeOpts { depth: 1 };
        let root_result = match self.deps.scrape.scrape(root, scrape_opts).await {
            Ok(r) => r,
            Err(AdapterError::CreditsExhausted(_)) => {
                self.credits_exhausted.store(true, Ordering::SeqCst);
                output.exhausted_flag = true;
                return output;
            }
            Err(err) => {
                tracing::warn!(target: "scout.executor", root, error = %err, "domain crawl root scrape failed");
                output.failed = !matches!(err, AdapterError::Transient(_));
                return output;
            }
        };

        self.persist_and_extract(task.job_id, item_id, root, &root_result, now, &mut output).await;

        for sub_url in root_result.discovered_urls.iter().take(opts.relevance_k) {
            let (doc, claims, exhausted) = self.process_url_for_claims(task.job_id, item_id, sub_url, &opts).await;
            output.exhausted_flag |= exhausted;
            if let Some(doc) = doc {
                output.docs.push(doc);
            }
            output.claims.extend(claims);
        }

        output
    }

    async fn persist_and_extract(
        &self,
        job_id: Uuid,
        item_id: Uuid,
        url: &str,
        scraped: &ScrapeResult,
        now: chrono::DateTime<Utc>,
        output: &mut TaskOutput,
    ) {
        let doc_id = self.id_gen.new_uuid();
        let metadata = DocumentMetadata {
            title: scraped.title.clone(),
            source_type: Some("scrape".to_string()),
        };
        let Ok(doc_id) = self
            .evidence
            .upsert_source(doc_id, job_id, url, &scraped.markdown, metadata, DocumentStatus::Success, now)
        else {
            return;
        };
        if let Ok(Some(doc)) = self.evidence.find_source_by_url(url, now, ChronoDuration::hours(24)) {
            if doc.doc_id == doc_id {
                let claims = self.extract_claims(item_id, &doc).await;
                output.claims.extend(claims);
                output.docs.push(doc);
            }
        }
    }

    /// Process several `url` tasks together via [`scout_adapters::ScrapeBatch`]
    /// (spec §4.F "if more than one consecutive `url` task is pulled
    /// together, the Executor calls `ScrapeBatch`"). Falls back to per-URL
    /// `Scrape` if the batch call fails entirely.
    pub async fn execute_url_batch(&self, tasks: &[FrontierTask], item_id: Uuid, opts: ExecuteOptions) -> Vec<(Uuid, TaskOutput)> {
        if self.is_credits_exhausted() {
            return tasks
                .iter()
                .map(|t| {
                    (
                        t.task_id,
                        TaskOutput {
                            exhausted_flag: true,
                            ..TaskOutput::default()
                        },
                    )
                })
                .collect();
        }

        let urls: Vec<String> = tasks.iter().map(|t| t.value.clone()).collect();
        let now = self.clock.now();
        match self.deps.scrape_batch.scrape_batch(&urls, ScrapeOpts::default()).await {
            Ok(entries) => {
                let mut out = Vec::with_capacity(tasks.len());
                for (task, entry) in tasks.iter().zip(entries) {
                    let mut output = TaskOutput::default();
                    match entry.result {
                        Ok(scraped) => {
                            self.persist_and_extract(task.job_id, item_id, &entry.url, &scraped, now, &mut output).await;
                        }
                        Err(AdapterError::CreditsExhausted(_)) => {
                            self.credits_exhausted.store(true, Ordering::SeqCst);
                            output.exhausted_flag = true;
                        }
                        Err(err) => {
                            tracing::warn!(target: "scout.executor", url = %entry.url, error = %err, "batch scrape entry failed");
                            output.failed = !matches!(err, AdapterError::Transient(_));
                        }
                    }
                    out.push((task.task_id, output));
                }
                out
            }
            Err(err) => {
                tracing::warn!(target: "scout.executor", error = %err, tasks = tasks.len(), "scrape batch failed entirely, falling back to per-url scrape");
                let mut out = Vec::with_capacity(tasks.len());
                for task in tasks {
                    let output = self.execute_url(task, item_id, &task.value, opts).await;
                    out.push((task.task_id, output));
                }
                out
            }
        }
    }

    async fn execute_domain_map(&self, task: &FrontierTask, item_id: Uuid, opts: ExecuteOptions) -> TaskOutput {
        let Some(domain) = task.meta.target_domain.clone() else {
            return TaskOutput {
                failed: true,
                ..TaskOutput::default()
            };
        };
        let scoped_query = format!("site:{domain} {}", task.value);
        self.execute_query(task, item_id, &scoped_query, opts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_adapters::mock::{ScriptedFallbackSearch, ScriptedLlmJson, ScriptedScrape, ScriptedSearch};
    use scout_adapters::{FallbackResult, ImageQcResult, SearchResult};
    use scout_core::{FixedClock, SequentialIdGen};
    use scout_evidence::InMemoryEvidenceStore;

    fn deps_with(
        search: Vec<Result<Vec<SearchResult>, AdapterError>>,
        scrape: Vec<Result<ScrapeResult, AdapterError>>,
        llm: Vec<Result<Value, AdapterError>>,
        fallback: Vec<Result<Vec<FallbackResult>, AdapterError>>,
    ) -> Deps {
        Deps {
            search: Arc::new(ScriptedSearch::new(search)),
            scrape: Arc::new(ScriptedScrape::new(scrape)),
            scrape_batch: Arc::new(scout_adapters::mock::ScriptedScrapeBatch::new(Vec::new())),
            extract_schema: Arc::new(scout_adapters::mock::ScriptedExtractSchema::new(Vec::new())),
            llm_json: Arc::new(ScriptedLlmJson::new(llm)),
            image_qc: Arc::new(scout_adapters::mock::ScriptedImageQc::new(vec![Ok(ImageQcResult {
                passes: true,
                reasons: Vec::new(),
            })])),
            fallback_search: Arc::new(ScriptedFallbackSearch::new(fallback)),
        }
    }

    fn claims_response(field: &str, value: &str, confidence: u8) -> Value {
        json!({"claims": [{"field": field, "value": value, "confidence": confidence}]})
    }

    #[tokio::test]
    async fn url_task_persists_one_doc_and_its_claims() {
        let evidence: Arc<dyn EvidenceStore> = Arc::new(InMemoryEvidenceStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
        let id_gen: Arc<dyn IdGen> = Arc::new(SequentialIdGen::new());
        let deps = deps_with(
            Vec::new(),
            vec![Ok(ScrapeResult {
                markdown: "HP CF217A toner".to_string(),
                title: Some("CF217A".to_string()),
                discovered_urls: Vec::new(),
            })],
            vec![Ok(claims_response("brand", "HP", 90))],
            Vec::new(),
        );
        let executor = TaskExecutor::new(deps, evidence, clock, id_gen);
        let task = FrontierTask::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            TaskType::Url,
            "https://example.com/cf217a",
            10,
            0,
            TaskMeta::default(),
            Utc::now(),
        );
        let output = executor.execute(&task, Uuid::new_v4(), ExecuteOptions::default()).await;
        assert_eq!(output.docs.len(), 1);
        assert_eq!(output.claims.len(), 1);
        assert_eq!(output.claims[0].field, "brand");
        assert!(!output.failed);
    }

    #[tokio::test]
    async fn url_task_caches_second_fetch_of_same_url() {
        let evidence: Arc<dyn EvidenceStore> = Arc::new(InMemoryEvidenceStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
        let id_gen: Arc<dyn IdGen> = Arc::new(SequentialIdGen::new());
        let deps = deps_with(
            Vec::new(),
            vec![Ok(ScrapeResult {
                markdown: "content".to_string(),
                title: None,
                discovered_urls: Vec::new(),
            })],
            vec![Ok(claims_response("brand", "HP", 90)), Ok(claims_response("brand", "HP", 90))],
            Vec::new(),
        );
        let executor = TaskExecutor::new(deps, evidence, clock, id_gen);
        let job_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let task1 = FrontierTask::new(Uuid::new_v4(), job_id, TaskType::Url, "https://example.com/a", 10, 0, TaskMeta::default(), Utc::now());
        let task2 = FrontierTask::new(Uuid::new_v4(), job_id, TaskType::Url, "https://example.com/a", 10, 0, TaskMeta::default(), Utc::now());
        let out1 = executor.execute(&task1, item_id, ExecuteOptions::default()).await;
        let out2 = executor.execute(&task2, item_id, ExecuteOptions::default()).await;
        assert_eq!(out1.docs[0].doc_id, out2.docs[0].doc_id);
    }

    #[tokio::test]
    async fn credits_exhausted_on_scrape_routes_query_through_fallback() {
        let evidence: Arc<dyn EvidenceStore> = Arc::new(InMemoryEvidenceStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
        let id_gen: Arc<dyn IdGen> = Arc::new(SequentialIdGen::new());
        let deps = deps_with(
            vec![Ok(vec![SearchResult {
                url: "https://example.com/a".to_string(),
                title: "a".to_string(),
                snippet: "".to_string(),
            }])],
            vec![Err(AdapterError::CreditsExhausted("out of credits".to_string()))],
            vec![Ok(claims_response("brand", "HP", 80))],
            vec![Ok(vec![FallbackResult {
                url: "https://fallback.example.com/a".to_string(),
                title: "fallback a".to_string(),
                markdown: "fallback content".to_string(),
            }])],
        );
        let executor = TaskExecutor::new(deps, evidence, clock, id_gen);
        let task = FrontierTask::new(Uuid::new_v4(), Uuid::new_v4(), TaskType::Query, "hp cf217a", 10, 0, TaskMeta::default(), Utc::now());
        let output = executor.execute(&task, Uuid::new_v4(), ExecuteOptions::default()).await;
        assert!(executor.is_credits_exhausted());
        assert!(output.exhausted_flag);
        assert_eq!(output.docs.len(), 1);
        assert_eq!(output.docs[0].url, "https://fallback.example.com/a");
    }

    #[tokio::test]
    async fn url_batch_returns_one_output_per_task() {
        let evidence: Arc<dyn EvidenceStore> = Arc::new(InMemoryEvidenceStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
        let id_gen: Arc<dyn IdGen> = Arc::new(SequentialIdGen::new());
        let mut deps = deps_with(Vec::new(), Vec::new(), vec![Ok(claims_response("brand", "HP", 80)), Ok(claims_response("brand", "HP", 80))], Vec::new());
        deps.scrape_batch = Arc::new(scout_adapters::mock::ScriptedScrapeBatch::new(vec![
            Ok(ScrapeResult {
                markdown: "one".to_string(),
                title: None,
                discovered_urls: Vec::new(),
            }),
            Ok(ScrapeResult {
                markdown: "two".to_string(),
                title: None,
                discovered_urls: Vec::new(),
            }),
        ]));
        let executor = TaskExecutor::new(deps, evidence, clock, id_gen);
        let job_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let tasks = vec![
            FrontierTask::new(Uuid::new_v4(), job_id, TaskType::Url, "https://example.com/a", 10, 0, TaskMeta::default(), Utc::now()),
            FrontierTask::new(Uuid::new_v4(), job_id, TaskType::Url, "https://example.com/b", 10, 0, TaskMeta::default(), Utc::now()),
        ];
        let results = executor.execute_url_batch(&tasks, item_id, ExecuteOptions::default()).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1.docs.len(), 1);
        assert_eq!(results[1].1.docs.len(), 1);
    }
}
