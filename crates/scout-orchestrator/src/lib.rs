// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Orchestrator (spec §4.I): the stage machine that turns a [`Job`]
//! into a finished [`Item`] by driving every other component through
//! `plan`, `seed_frontier`, `search_loop`, `resolve`, `polish`,
//! `gate_check`, `finalize`. Each stage reads its inputs from persistent
//! state only (`JobStore`, `Frontier`, `EvidenceStore`) so a crash between
//! any two stages resumes cleanly from the last committed one (P6).

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use scout_adapters::{Deps, LlmHints};
use scout_config::JobConfig;
use scout_core::{
    Claim, Clock, FieldEvidence, IdGen, Item, ItemStatus, Job, JobMode, JobStatus, Plan, Strategy,
    StrategyType, SuggestedBudget, TaskMeta,
};
use scout_error::ErrorCode;
use scout_evidence::EvidenceStore;
use scout_executor::{ExecuteOptions, TaskExecutor};
use scout_frontier::Frontier;
use scout_gatekeeper::{GateContext, ImageCheck};
use scout_reflection::RequiredField;
use scout_scheduler::{run_slice, CancellationToken, JobBudget, JobBudgetLimit, SliceConfig};
use scout_store::{AuditEntry, JobStore};
use scout_telemetry::{JobMetrics, MetricsCollector, TelemetrySpan};
use scout_trust::{FieldPolicy, TrustClaim};
use serde_json::json;
use uuid::Uuid;

pub use scout_protocol::{JobTrigger, JobTriggerAck, ResultRecord, StatusQuery, StatusResponse, StepEntry};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while triggering, driving, or querying a job.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A domain-model invariant was violated.
    #[error(transparent)]
    Core(#[from] scout_core::CoreError),
    /// The persistence layer failed.
    #[error(transparent)]
    Store(#[from] scout_store::StoreError),
    /// The frontier queue failed.
    #[error(transparent)]
    Frontier(#[from] scout_frontier::FrontierError),
    /// The evidence store failed.
    #[error(transparent)]
    Evidence(#[from] scout_evidence::EvidenceError),
    /// The requested job does not exist.
    #[error("job {job_id} not found")]
    JobNotFound {
        /// The id that was looked up.
        job_id: Uuid,
    },
}

impl OrchestratorError {
    /// The stable error code this variant maps to.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Core(e) => e.code(),
            Self::Store(e) => e.code(),
            Self::Frontier(e) => e.code(),
            Self::Evidence(e) => e.code(),
            Self::JobNotFound { .. } => ErrorCode::OrchestratorInvalidTransition,
        }
    }
}

// ---------------------------------------------------------------------------
// Planning: the "direct guess" MPN short-circuit (spec §4.I)
// ---------------------------------------------------------------------------

/// Manufacturer hosts the "direct guess" heuristic knows how to target.
/// Data-driven on purpose — adding a manufacturer is a table edit, not a
/// code change.
const KNOWN_MANUFACTURER_DOMAINS: &[(&str, &str)] = &[
    ("HP", "hp.com"),
    ("CANON", "canon.com"),
    ("EPSON", "epson.com"),
    ("BROTHER", "brother.com"),
    ("LEXMARK", "lexmark.com"),
];

/// A token looks like an MPN when, stripped of punctuation, it mixes
/// letters and digits and is long enough not to be a stray word.
fn looks_like_mpn(token: &str) -> bool {
    let alnum: String = token.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    alnum.len() >= 5
        && alnum.chars().any(|c| c.is_ascii_digit())
        && alnum.chars().any(|c| c.is_ascii_alphabetic())
}

/// Try the "direct guess" short-circuit: if `input_raw` names a known
/// manufacturer and contains an MPN-shaped token, skip search planning
/// entirely and go straight to that manufacturer's product page.
fn try_direct_guess(input_raw: &str) -> Option<Plan> {
    let upper = input_raw.to_uppercase();
    let (_, domain) = KNOWN_MANUFACTURER_DOMAINS
        .iter()
        .find(|(name, _)| upper.contains(name))?;
    let mpn = input_raw.split_whitespace().find(|t| looks_like_mpn(t))?;
    let canonical_url = format!("https://www.{domain}/products/{}", mpn.to_lowercase());
    Some(Plan::direct_guess(mpn, canonical_url))
}

fn suggested_budget(mode: JobMode) -> SuggestedBudget {
    let (concurrency, depth) = match mode {
        JobMode::Fast => (3, 1),
        JobMode::Balanced => (5, 2),
        JobMode::Deep => (8, 3),
    };
    SuggestedBudget { mode, concurrency, depth }
}

fn default_plan(job: &Job) -> Plan {
    Plan {
        strategies: vec![Strategy {
            name: "primary_query".to_string(),
            strategy_type: StrategyType::Query,
            value: job.input_raw.clone(),
            target_domain: None,
            schema: None,
        }],
        mpn: None,
        canonical_name: None,
        suggested_budget: Some(suggested_budget(job.mode)),
        evidence: None,
    }
}

fn build_plan(job: &Job) -> Plan {
    try_direct_guess(&job.input_raw).unwrap_or_else(|| default_plan(job))
}

// ---------------------------------------------------------------------------
// Required fields / gate context (spec §4.J)
// ---------------------------------------------------------------------------

/// Logistics fields (`packaging.*`) are required only for modes that budget
/// enough search depth to actually find them.
fn required_fields_for(mode: JobMode) -> Vec<RequiredField> {
    let mut fields = vec![
        RequiredField {
            field: "brand".to_string(),
            min_confidence: 0.6,
            query_hint: "brand name".to_string(),
        },
        RequiredField {
            field: "canonical_model".to_string(),
            min_confidence: 0.6,
            query_hint: "canonical model number".to_string(),
        },
    ];
    if !matches!(mode, JobMode::Fast) {
        fields.push(RequiredField {
            field: "packaging.weight_g".to_string(),
            min_confidence: 0.6,
            query_hint: "package weight in grams".to_string(),
        });
    }
    fields
}

fn field_policy_for(field: &str, config: &JobConfig) -> FieldPolicy {
    if field.starts_with("packaging") {
        FieldPolicy::Logistics {
            authoritative_host: config.logistics_authoritative_host.clone().unwrap_or_default(),
        }
    } else if field == "compatible_printers" {
        FieldPolicy::Compatibility
    } else {
        FieldPolicy::Standard { case_insensitive: true }
    }
}

// ---------------------------------------------------------------------------
// Misc helpers
// ---------------------------------------------------------------------------

const RULESET_VERSION: &str = "scout.gatekeeper.v1";
const PARSER_VERSION: &str = "scout.claims.v1";
const SYNTHESIS_CONFIDENCE: f64 = 0.65;
const COMPATIBILITY_FIELD: &str = "compatible_printers";

fn mode_tag(mode: JobMode) -> String {
    serde_json::to_value(mode).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default()
}

fn status_tag(status: JobStatus) -> String {
    serde_json::to_value(status).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default()
}

fn item_status_tag(status: ItemStatus) -> String {
    serde_json::to_value(status).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default()
}

fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    end.signed_duration_since(start).num_milliseconds().max(0) as u64
}

// ---------------------------------------------------------------------------
// JobOrchestrator
// ---------------------------------------------------------------------------

/// Wires every other crate together behind one stage machine. Holds no
/// per-job state itself — everything it needs is reloaded from `store`,
/// `frontier`, and `evidence` at the start of each call.
pub struct JobOrchestrator {
    deps: Deps,
    store: Arc<dyn JobStore>,
    frontier: Arc<dyn Frontier>,
    evidence: Arc<dyn EvidenceStore>,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGen>,
    config: JobConfig,
    metrics: MetricsCollector,
}

impl JobOrchestrator {
    /// Build an orchestrator from its collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        deps: Deps,
        store: Arc<dyn JobStore>,
        frontier: Arc<dyn Frontier>,
        evidence: Arc<dyn EvidenceStore>,
        clock: Arc<dyn Clock>,
        id_gen: Arc<dyn IdGen>,
        config: JobConfig,
        metrics: MetricsCollector,
    ) -> Self {
        Self { deps, store, frontier, evidence, clock, id_gen, config, metrics }
    }

    /// The metrics collector this orchestrator records completed runs into.
    #[must_use]
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    // -- triggering / status --------------------------------------------

    /// Start a new job, or hand back an existing one sharing
    /// `(tenant_id, input_hash)` unless `force_refresh` opted out (spec §3
    /// cache-sharing invariant).
    pub fn trigger(&self, trigger: &JobTrigger) -> Result<JobTriggerAck, OrchestratorError> {
        let now = self.clock.now();
        if !trigger.force_refresh {
            let input_hash = scout_core::input_hash(&trigger.input_raw);
            if let Some(existing) = self.store.find_cached_job(&trigger.tenant_id, &input_hash)? {
                return Ok(JobTriggerAck { job_id: existing.job_id });
            }
        }
        let job_id = self.id_gen.new_uuid();
        let job = Job::new(job_id, trigger.tenant_id.clone(), trigger.input_raw.clone(), trigger.mode, trigger.force_refresh, now);
        self.store.save_job(&job)?;
        self.audit(&job, "job_created", "trigger")?;
        Ok(JobTriggerAck { job_id })
    }

    /// Poll a job's current status, surfacing the finished [`ResultRecord`]
    /// once it reaches a terminal status.
    pub fn status(&self, query: &StatusQuery) -> Result<StatusResponse, OrchestratorError> {
        let job = self.load_job(query.job_id)?;
        let steps = self
            .store
            .audit_log_for(job.job_id)?
            .into_iter()
            .map(|e| StepEntry { stage: e.action, at: e.timestamp, detail: Some(e.reason) })
            .collect();
        let result = if job.status.is_terminal() {
            self.store
                .load_item_for_job(job.job_id)?
                .map(|item| self.build_result_record(&job, &item, 0))
        } else {
            None
        };
        Ok(StatusResponse { status: status_tag(job.status), steps, result })
    }

    // -- driving ----------------------------------------------------------

    /// Drive `job_id` from whatever stage it is currently in through to
    /// `done` or `failed`, persisting after every stage transition.
    pub async fn run_job(&self, job_id: Uuid) -> Result<ResultRecord, OrchestratorError> {
        let start = self.clock.now();
        let mut job = self.load_job(job_id)?;
        let mut item = self.load_or_create_item(&job)?;
        let executor = TaskExecutor::new(self.deps.clone(), self.evidence.clone(), self.clock.clone(), self.id_gen.clone());
        let budget = JobBudget::new(JobBudgetLimit {
            max_wallclock: Some(StdDuration::from_millis(self.config.job_budget_wallclock_ms)),
            max_adapter_calls: Some(self.config.job_budget_adapter_calls),
        });
        let cancel = CancellationToken::new();
        let mut metrics = JobMetrics { mode: mode_tag(job.mode), ..JobMetrics::default() };

        if let Err(err) = self.drive(&mut job, &mut item, &executor, &budget, &cancel, &mut metrics).await {
            self.fail_job(&mut job, &err)?;
            metrics.final_status = status_tag(JobStatus::Failed);
            metrics.duration_ms = elapsed_ms(start, self.clock.now());
            self.metrics.record(metrics);
            return Err(err);
        }

        metrics.duration_ms = elapsed_ms(start, self.clock.now());
        metrics.final_status = status_tag(job.status);
        self.metrics.record(metrics);

        Ok(self.build_result_record(&job, &item, metrics.duration_ms))
    }

    async fn drive(
        &self,
        job: &mut Job,
        item: &mut Item,
        executor: &TaskExecutor,
        budget: &JobBudget,
        cancel: &CancellationToken,
        metrics: &mut JobMetrics,
    ) -> Result<(), OrchestratorError> {
        loop {
            match job.status {
                JobStatus::Pending => self.stage_plan(job)?,
                JobStatus::Planning => self.stage_seed_frontier(job)?,
                JobStatus::Searching => {
                    self.stage_search_loop(job, executor, item.item_id, budget, cancel, metrics).await?;
                }
                JobStatus::Enrichment => {
                    self.stage_resolve(job, item, executor, budget, cancel, metrics).await?;
                }
                JobStatus::Polish => self.stage_polish(job, item)?,
                JobStatus::GateCheck => self.stage_gate_check(job, item).await?,
                JobStatus::Done | JobStatus::Failed => return Ok(()),
            }
        }
    }

    // -- stages -------------------------------------------------------------

    fn stage_plan(&self, job: &mut Job) -> Result<(), OrchestratorError> {
        TelemetrySpan::new("scout.orchestrator", "plan").with_attribute("job_id", job.job_id.to_string()).emit();
        let now = self.clock.now();
        job.transition(JobStatus::Planning, now)?;
        self.store.save_job(job)?;
        self.audit(job, "stage_transition", "plan")?;
        Ok(())
    }

    fn stage_seed_frontier(&self, job: &mut Job) -> Result<(), OrchestratorError> {
        TelemetrySpan::new("scout.orchestrator", "seed_frontier").with_attribute("job_id", job.job_id.to_string()).emit();
        let now = self.clock.now();
        let plan = build_plan(job);
        let lease = ChronoDuration::milliseconds(self.config.lease_ms as i64);
        for strategy in &plan.strategies {
            let meta = TaskMeta {
                strategy_name: Some(strategy.name.clone()),
                target_domain: strategy.target_domain.clone(),
                schema: strategy.schema.clone(),
                discovered_from: None,
                repair: false,
            };
            self.frontier.add(self.id_gen.new_uuid(), job.job_id, strategy.strategy_type, &strategy.value, 0, 0, meta, now);
        }
        let _ = lease;
        job.transition(JobStatus::Searching, now)?;
        self.store.save_job(job)?;
        self.audit(job, "stage_transition", format!("seed_frontier: {} strategies", plan.strategies.len()))?;
        Ok(())
    }

    async fn stage_search_loop(
        &self,
        job: &mut Job,
        executor: &TaskExecutor,
        item_id: Uuid,
        budget: &JobBudget,
        cancel: &CancellationToken,
        metrics: &mut JobMetrics,
    ) -> Result<(), OrchestratorError> {
        TelemetrySpan::new("scout.orchestrator", "search_loop").with_attribute("job_id", job.job_id.to_string()).emit();
        self.drain_slices(job.job_id, executor, item_id, budget, cancel, self.config.max_slices as u64, metrics)
            .await;
        let now = self.clock.now();
        job.transition(JobStatus::Enrichment, now)?;
        self.store.save_job(job)?;
        self.audit(job, "stage_transition", format!("search_loop: {} slices", metrics.slices_run))?;
        Ok(())
    }

    /// Run up to `max_slices` slices (or until the frontier is drained or
    /// the job budget is exceeded), updating `metrics` as it goes.
    async fn drain_slices(
        &self,
        job_id: Uuid,
        executor: &TaskExecutor,
        item_id: Uuid,
        budget: &JobBudget,
        cancel: &CancellationToken,
        max_slices: u64,
        metrics: &mut JobMetrics,
    ) {
        let mut previously_completed = self.frontier.stats(job_id).completed as u64;
        let mut ran = 0u64;
        while ran < max_slices && !budget.is_exceeded() && !cancel.is_cancelled() {
            let slice_config = SliceConfig {
                concurrency: self.config.max_concurrency as usize,
                slice_deadline: StdDuration::from_millis(self.config.slice_deadline_ms),
                lease: ChronoDuration::milliseconds(self.config.lease_ms as i64),
                ..SliceConfig::default()
            };
            let outcome = run_slice(
                self.frontier.as_ref(),
                executor,
                self.clock.as_ref(),
                job_id,
                item_id,
                slice_config,
                ExecuteOptions::default(),
                cancel,
            )
            .await;
            ran += 1;

            let stats = self.frontier.stats(job_id);
            let newly_completed = (stats.completed as u64).saturating_sub(previously_completed);
            budget.record_adapter_calls(newly_completed);
            metrics.adapter_calls += newly_completed;
            previously_completed = stats.completed as u64;

            self.frontier.reap_expired(self.clock.now(), self.config.max_task_attempts);

            if executor.is_credits_exhausted() {
                metrics.errors_count += 1;
            }
            if outcome.done {
                break;
            }
        }
        metrics.slices_run += ran;
    }

    async fn stage_resolve(
        &self,
        job: &mut Job,
        item: &mut Item,
        executor: &TaskExecutor,
        budget: &JobBudget,
        cancel: &CancellationToken,
        metrics: &mut JobMetrics,
    ) -> Result<(), OrchestratorError> {
        TelemetrySpan::new("scout.orchestrator", "resolve").with_attribute("job_id", job.job_id.to_string()).emit();
        let now = self.clock.now();

        let claims = self.evidence.claims_for_item(item.item_id)?;
        metrics.claims_inserted = claims.len() as u64;
        self.resolve_all_fields(item, &claims, now)?;

        if self.needs_synthesis(item) {
            self.synthesis_fallback(job, item, &claims, now).await;
        }

        let required = required_fields_for(job.mode);
        for _ in 0..self.config.max_reflection_loops {
            let goals = scout_reflection::critique(item, &required);
            if goals.is_empty() {
                break;
            }
            metrics.reflection_loops += 1;
            let subject = item.evidence.get("brand").map(|e| e.value.clone()).unwrap_or_else(|| job.input_raw.clone());
            let expansions = scout_reflection::repair_expansions(&goals, &subject, 0);
            for expansion in &expansions {
                self.frontier.add(
                    self.id_gen.new_uuid(),
                    job.job_id,
                    expansion.task_type,
                    &expansion.value,
                    expansion.priority,
                    expansion.depth,
                    expansion.meta.clone(),
                    now,
                );
            }
            self.drain_slices(job.job_id, executor, item.item_id, budget, cancel, 1, metrics).await;
            let claims = self.evidence.claims_for_item(item.item_id)?;
            self.resolve_all_fields(item, &claims, self.clock.now())?;
        }

        self.store.save_item(item)?;
        job.transition(JobStatus::Polish, self.clock.now())?;
        self.store.save_job(job)?;
        self.audit(job, "stage_transition", "resolve")?;
        Ok(())
    }

    fn resolve_all_fields(&self, item: &mut Item, claims: &[Claim], now: DateTime<Utc>) -> Result<(), OrchestratorError> {
        let mut by_field: BTreeMap<String, Vec<Claim>> = BTreeMap::new();
        for claim in claims {
            by_field.entry(claim.field.clone()).or_default().push(claim.clone());
        }
        for (field, field_claims) in by_field {
            let trust_claims = self.trust_claims_for(&field_claims)?;
            if trust_claims.is_empty() {
                continue;
            }
            let policy = field_policy_for(&field, &self.config);
            if let Ok(resolution) = scout_trust::resolve(&trust_claims, &policy, now) {
                if !resolution.unverified.is_empty() {
                    let unverified_field = format!("{field}_unverified");
                    item.evidence.insert(
                        unverified_field,
                        FieldEvidence {
                            value: resolution.unverified.join(","),
                            confidence: 0.0,
                            source_url: None,
                            is_conflict: true,
                            method: resolution.method.clone(),
                            timestamp: now,
                        },
                    );
                }
                if let Some(evidence) = scout_reflection::merge_field_resolution(item.evidence.get(&field), &resolution, now) {
                    item.evidence.insert(field, evidence);
                }
            }
        }
        Ok(())
    }

    fn trust_claims_for(&self, claims: &[Claim]) -> Result<Vec<TrustClaim>, OrchestratorError> {
        let mut out = Vec::with_capacity(claims.len());
        for claim in claims {
            let Some(doc) = self.evidence.get_source(claim.source_doc_id)? else {
                continue;
            };
            out.push(TrustClaim {
                value: claim.value.clone(),
                confidence_unit: claim.confidence_unit(),
                tier: self.config.tier_for(&doc.domain),
                source_url: doc.url.clone(),
                domain: doc.domain.clone(),
                extracted_at: claim.extracted_at,
            });
        }
        Ok(out)
    }

    fn needs_synthesis(&self, item: &Item) -> bool {
        !item.evidence.contains_key("brand") || !item.evidence.contains_key("canonical_model")
    }

    async fn synthesis_fallback(&self, job: &Job, item: &mut Item, claims: &[Claim], now: DateTime<Utc>) {
        let mut seen = HashSet::new();
        let mut context = String::new();
        for claim in claims {
            if !seen.insert(claim.source_doc_id) {
                continue;
            }
            if let Ok(Some(doc)) = self.evidence.get_source(claim.source_doc_id) {
                context.push_str(&doc.raw_content);
                context.push('\n');
            }
        }
        if context.trim().is_empty() {
            return;
        }

        let schema = json!({
            "type": "object",
            "properties": {
                "brand": {"type": "string"},
                "canonical_model": {"type": "string"},
            },
        });
        let prompt = format!(
            "Identify the brand and canonical model number for this product: {}\n\nSource material:\n{context}",
            job.input_raw
        );
        let Ok(value) = self.deps.llm_json.llm_json(&prompt, &schema, &LlmHints::default()).await else {
            return;
        };
        for field in ["brand", "canonical_model"] {
            if item.evidence.contains_key(field) {
                continue;
            }
            if let Some(extracted) = value.get(field).and_then(|v| v.as_str()) {
                item.evidence.insert(
                    field.to_string(),
                    FieldEvidence {
                        value: extracted.to_string(),
                        confidence: SYNTHESIS_CONFIDENCE,
                        source_url: None,
                        is_conflict: false,
                        method: "synthesis_fallback".to_string(),
                        timestamp: now,
                    },
                );
            }
        }
    }

    fn stage_polish(&self, job: &mut Job, item: &mut Item) -> Result<(), OrchestratorError> {
        TelemetrySpan::new("scout.orchestrator", "polish").with_attribute("job_id", job.job_id.to_string()).emit();
        let mut data = serde_json::Map::new();
        for (field, evidence) in &item.evidence {
            let value = serde_json::from_str(&evidence.value).unwrap_or_else(|_| serde_json::Value::String(evidence.value.clone()));
            data.insert(field.clone(), value);
        }
        item.data = serde_json::Value::Object(data);
        self.store.save_item(item)?;
        let now = self.clock.now();
        job.transition(JobStatus::GateCheck, now)?;
        self.store.save_job(job)?;
        self.audit(job, "stage_transition", "polish")?;
        Ok(())
    }

    async fn stage_gate_check(&self, job: &mut Job, item: &mut Item) -> Result<(), OrchestratorError> {
        TelemetrySpan::new("scout.orchestrator", "gate_check").with_attribute("job_id", job.job_id.to_string()).emit();
        let image_results = self.collect_image_checks(item).await;
        let ctx = GateContext {
            required_fields: required_fields_for(job.mode),
            require_compatibility_verified: true,
            compatibility_field: COMPATIBILITY_FIELD.to_string(),
            image_results,
        };
        scout_gatekeeper::gate_check(item, &ctx, &scout_gatekeeper::default_rules());
        self.store.save_item(item)?;
        let now = self.clock.now();
        job.transition(JobStatus::Done, now)?;
        self.store.save_job(job)?;
        self.audit(job, "stage_transition", format!("gate_check: {}", item_status_tag(item.status)))?;
        Ok(())
    }

    async fn collect_image_checks(&self, item: &Item) -> Vec<ImageCheck> {
        let urls: Vec<String> = item
            .data
            .get("images")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let mut results = Vec::with_capacity(urls.len());
        for url in urls {
            let passes = self.deps.image_qc.image_qc(&url).await.map(|r| r.passes).unwrap_or(false);
            results.push(ImageCheck { url, passes });
        }
        results
    }

    // -- shared plumbing ----------------------------------------------------

    fn load_job(&self, job_id: Uuid) -> Result<Job, OrchestratorError> {
        self.store.load_job(job_id)?.ok_or(OrchestratorError::JobNotFound { job_id })
    }

    fn load_or_create_item(&self, job: &Job) -> Result<Item, OrchestratorError> {
        if let Some(item) = self.store.load_item_for_job(job.job_id)? {
            return Ok(item);
        }
        let item = Item::new(self.id_gen.new_uuid(), job.job_id);
        self.store.save_item(&item)?;
        Ok(item)
    }

    fn fail_job(&self, job: &mut Job, err: &OrchestratorError) -> Result<(), OrchestratorError> {
        let now = self.clock.now();
        if job.status.can_transition_to(JobStatus::Failed) {
            job.transition(JobStatus::Failed, now)?;
            self.store.save_job(job)?;
        }
        self.audit(job, "job_failed", err.to_string())?;
        Ok(())
    }

    fn audit(&self, job: &Job, action: &str, reason: impl Into<String>) -> Result<(), OrchestratorError> {
        let entry = AuditEntry {
            id: self.id_gen.new_uuid(),
            tenant_id: job.tenant_id.clone(),
            entity_type: "job".to_string(),
            entity_id: job.job_id,
            action: action.to_string(),
            before: None,
            after: Some(json!({ "status": status_tag(job.status) })),
            reason: reason.into(),
            timestamp: self.clock.now(),
        };
        self.store.append_audit(entry)?;
        Ok(())
    }

    fn build_result_record(&self, job: &Job, item: &Item, duration_ms: u64) -> ResultRecord {
        ResultRecord {
            job_id: job.job_id,
            input_raw: job.input_raw.clone(),
            input_hash: job.input_hash.clone(),
            data: item.data.clone(),
            evidence: item.evidence.clone(),
            status: item_status_tag(item.status),
            validation_errors: item.validation_errors.clone(),
            processed_at: self.clock.now(),
            processing_duration_ms: duration_ms,
            ruleset_version: RULESET_VERSION.to_string(),
            parser_version: PARSER_VERSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_adapters::mock::{
        ScriptedExtractSchema, ScriptedFallbackSearch, ScriptedImageQc, ScriptedLlmJson, ScriptedScrape, ScriptedScrapeBatch,
        ScriptedSearch,
    };
    use scout_adapters::{ScrapeResult, SearchResult};
    use scout_core::{FixedClock, SequentialIdGen};
    use scout_evidence::InMemoryEvidenceStore;
    use scout_frontier::InMemoryFrontier;
    use scout_store::InMemoryJobStore;

    fn test_deps() -> Deps {
        let search_results = vec![SearchResult {
            url: "https://www.hp.com/cf217a".to_string(),
            title: "HP CF217A Toner Cartridge".to_string(),
            snippet: "Genuine HP toner".to_string(),
        }];
        let scrape = ScrapeResult {
            markdown: "HP CF217A black toner cartridge, compatible with LaserJet Pro M102".to_string(),
            title: Some("HP CF217A".to_string()),
            discovered_urls: Vec::new(),
        };
        let claims = json!({
            "claims": [
                {"field": "brand", "value": "HP", "confidence": 95},
                {"field": "canonical_model", "value": "CF217A", "confidence": 90},
            ]
        });
        Deps {
            search: Arc::new(ScriptedSearch::new(vec![Ok(search_results)])),
            scrape: Arc::new(ScriptedScrape::new(vec![Ok(scrape.clone())])),
            scrape_batch: Arc::new(ScriptedScrapeBatch::new(vec![Ok(scrape)])),
            extract_schema: Arc::new(ScriptedExtractSchema::new(vec![Ok(json!({}))])),
            llm_json: Arc::new(ScriptedLlmJson::new(vec![Ok(claims)])),
            image_qc: Arc::new(ScriptedImageQc::new(vec![])),
            fallback_search: Arc::new(ScriptedFallbackSearch::new(vec![])),
        }
    }

    fn test_orchestrator() -> JobOrchestrator {
        let mut config = JobConfig::default();
        config.max_slices = 3;
        config.max_reflection_loops = 1;
        config.logistics_authoritative_host = Some("hp.com".to_string());
        JobOrchestrator::new(
            test_deps(),
            Arc::new(InMemoryJobStore::new()),
            Arc::new(InMemoryFrontier::new()),
            Arc::new(InMemoryEvidenceStore::new()),
            Arc::new(FixedClock::new(Utc::now())),
            Arc::new(SequentialIdGen::new()),
            config,
            MetricsCollector::new(),
        )
    }

    #[test]
    fn try_direct_guess_recognizes_a_known_manufacturer_mpn() {
        let plan = try_direct_guess("HP CF217A Toner Cartridge").unwrap();
        assert_eq!(plan.mpn.as_deref(), Some("CF217A"));
        assert_eq!(plan.strategies.len(), 1);
        assert_eq!(plan.strategies[0].strategy_type, StrategyType::Url);
    }

    #[test]
    fn try_direct_guess_is_none_for_unrecognized_input() {
        assert!(try_direct_guess("some random office supply").is_none());
    }

    #[test]
    fn trigger_creates_a_pending_job() {
        let orchestrator = test_orchestrator();
        let ack = orchestrator
            .trigger(&JobTrigger {
                input_raw: "HP CF217A".to_string(),
                tenant_id: "t1".to_string(),
                mode: JobMode::Balanced,
                force_refresh: false,
                previous_job_id: None,
                api_keys_ref: None,
                budgets: None,
            })
            .unwrap();
        let status = orchestrator.status(&StatusQuery { job_id: ack.job_id }).unwrap();
        assert_eq!(status.status, "pending");
    }

    #[test]
    fn trigger_shares_cache_for_identical_input() {
        let orchestrator = test_orchestrator();
        let trigger = JobTrigger {
            input_raw: "HP CF217A".to_string(),
            tenant_id: "t1".to_string(),
            mode: JobMode::Balanced,
            force_refresh: false,
            previous_job_id: None,
            api_keys_ref: None,
            budgets: None,
        };
        let first = orchestrator.trigger(&trigger).unwrap();
        let second = orchestrator.trigger(&trigger).unwrap();
        assert_eq!(first.job_id, second.job_id);
    }

    #[tokio::test]
    async fn run_job_drives_a_direct_guess_job_to_a_terminal_status() {
        let orchestrator = test_orchestrator();
        let ack = orchestrator
            .trigger(&JobTrigger {
                input_raw: "HP CF217A".to_string(),
                tenant_id: "t1".to_string(),
                mode: JobMode::Fast,
                force_refresh: false,
                previous_job_id: None,
                api_keys_ref: None,
                budgets: None,
            })
            .unwrap();
        let record = orchestrator.run_job(ack.job_id).await.unwrap();
        assert_eq!(record.job_id, ack.job_id);
        assert!(record.status == "published" || record.status == "needs_review");
        assert!(record.evidence.contains_key("brand"));
    }

    #[tokio::test]
    async fn run_job_on_unknown_job_id_is_an_error() {
        let orchestrator = test_orchestrator();
        let result = orchestrator.run_job(Uuid::new_v4()).await;
        assert!(matches!(result, Err(OrchestratorError::JobNotFound { .. })));
    }
}
