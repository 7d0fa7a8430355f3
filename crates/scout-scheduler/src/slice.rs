//! The Slice Scheduler (spec §4.G): drains the Frontier for one job inside a
//! bounded concurrency window until either the Frontier is empty or the
//! slice's drain deadline is reached, at which point in-flight tasks are
//! awaited (not cancelled) up to a drain timeout.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration as StdDuration;

use chrono::Duration;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use scout_core::{Clock, FrontierTask, TaskType};
use scout_executor::{ExecuteOptions, TaskExecutor, TaskOutput};
use scout_frontier::{Frontier, TaskOutcome};
use uuid::Uuid;

use crate::cancel::CancellationToken;

/// Safety margin subtracted from the slice deadline before the scheduler
/// stops dispatching new work, so in-flight tasks have room to finish.
pub const DEFAULT_DRAIN_MARGIN: StdDuration = StdDuration::from_secs(5);

/// Extra time granted, past the slice deadline, for already-dispatched
/// tasks to finish before they're left for the next slice to reap.
pub const DEFAULT_DRAIN_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Tunables for one call to [`run_slice`].
#[derive(Debug, Clone, Copy)]
pub struct SliceConfig {
    /// Maximum number of tasks in flight at once.
    pub concurrency: usize,
    /// How long this slice is allowed to run before it stops dispatching.
    pub slice_deadline: StdDuration,
    /// Subtracted from `slice_deadline` to get the dispatch cutoff.
    pub drain_margin: StdDuration,
    /// Extra time allowed, past `slice_deadline`, to await in-flight tasks.
    pub drain_timeout: StdDuration,
    /// Lease duration granted to tasks pulled from the Frontier.
    pub lease: Duration,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            slice_deadline: StdDuration::from_secs(60),
            drain_margin: DEFAULT_DRAIN_MARGIN,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            lease: Duration::seconds(120),
        }
    }
}

/// How a slice ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceOutcome {
    /// The Frontier had nothing left to dispatch and nothing in flight.
    pub done: bool,
    /// The slice stopped because its deadline (or cancellation) was hit
    /// while the Frontier still had pending work.
    pub exhausted: bool,
}

type TaskFuture<'a> = Pin<Box<dyn Future<Output = (Vec<Uuid>, TaskOutput)> + Send + 'a>>;

/// Drain `job_id`'s Frontier for one bounded slice, dispatching up to
/// `config.concurrency` tasks at a time via `executor`, batching runs of
/// `url` tasks through [`TaskExecutor::execute_url_batch`]. Completed task
/// outputs' `expansions` are enqueued back into `frontier` before the next
/// dispatch round. Returns once the Frontier is drained, the deadline (or
/// `cancel`) fires and in-flight work has settled, or the drain timeout
/// elapses.
pub async fn run_slice(
    frontier: &dyn Frontier,
    executor: &TaskExecutor,
    clock: &dyn Clock,
    job_id: Uuid,
    item_id: Uuid,
    config: SliceConfig,
    exec_opts: ExecuteOptions,
    cancel: &CancellationToken,
) -> SliceOutcome {
    let start = tokio::time::Instant::now();
    let dispatch_cutoff = config
        .slice_deadline
        .checked_sub(config.drain_margin)
        .unwrap_or(StdDuration::ZERO);
    let hard_deadline = config.slice_deadline + config.drain_timeout;

    let mut in_flight: FuturesUnordered<TaskFuture<'_>> = FuturesUnordered::new();
    let mut exhausted = false;

    loop {
        let elapsed = start.elapsed();
        let past_dispatch_cutoff = elapsed >= dispatch_cutoff || cancel.is_cancelled();

        if !past_dispatch_cutoff && in_flight.len() < config.concurrency {
            let room = config.concurrency - in_flight.len();
            let now = clock.now();
            let batch = frontier.next_batch(job_id, room, now, config.lease);
            if batch.is_empty() && in_flight.is_empty() {
                return SliceOutcome { done: true, exhausted: false };
            }
            if !batch.is_empty() {
                dispatch_batch(batch, executor, item_id, exec_opts, &mut in_flight);
                continue;
            }
        } else if past_dispatch_cutoff {
            exhausted = frontier.stats(job_id).pending > 0 || !in_flight.is_empty();
        }

        if in_flight.is_empty() {
            return SliceOutcome { done: !exhausted, exhausted };
        }

        let remaining = hard_deadline.checked_sub(start.elapsed()).unwrap_or(StdDuration::ZERO);
        tokio::select! {
            next = in_flight.next() => {
                if let Some((task_ids, output)) = next {
                    settle(frontier, &task_ids, output, job_id);
                }
            }
            () = tokio::time::sleep(remaining) => {
                exhausted = true;
                break;
            }
        }

        if past_dispatch_cutoff && in_flight.is_empty() {
            break;
        }
    }

    SliceOutcome { done: !exhausted, exhausted }
}

fn dispatch_batch<'a>(
    batch: Vec<FrontierTask>,
    executor: &'a TaskExecutor,
    item_id: Uuid,
    exec_opts: ExecuteOptions,
    in_flight: &mut FuturesUnordered<TaskFuture<'a>>,
) {
    let mut singles = Vec::new();
    let mut urls = Vec::new();
    for task in batch {
        if task.task_type == TaskType::Url {
            urls.push(task);
        } else {
            singles.push(task);
        }
    }

    if urls.len() >= 2 {
        let fut: TaskFuture<'a> = Box::pin(async move {
            let results = executor.execute_url_batch(&urls, item_id, exec_opts).await;
            let ids = results.iter().map(|(id, _)| *id).collect();
            let merged = results.into_iter().map(|(_, out)| out).fold(TaskOutput::default(), merge_outputs);
            (ids, merged)
        });
        in_flight.push(fut);
    } else {
        singles.extend(urls);
    }

    for task in singles {
        let fut: TaskFuture<'a> = Box::pin(async move {
            let output = executor.execute(&task, item_id, exec_opts).await;
            (vec![task.task_id], output)
        });
        in_flight.push(fut);
    }
}

fn merge_outputs(mut acc: TaskOutput, next: TaskOutput) -> TaskOutput {
    acc.docs.extend(next.docs);
    acc.claims.extend(next.claims);
    acc.expansions.extend(next.expansions);
    acc.exhausted_flag |= next.exhausted_flag;
    acc.failed |= next.failed;
    acc
}

fn settle(frontier: &dyn Frontier, task_ids: &[Uuid], output: TaskOutput, job_id: Uuid) {
    let outcome = if output.failed { TaskOutcome::Failed } else { TaskOutcome::Completed };
    for task_id in task_ids {
        if let Err(err) = frontier.complete(*task_id, outcome) {
            tracing::warn!(target: "scout.scheduler", task_id = %task_id, error = %err, "failed to settle frontier task");
        }
    }
    for expansion in output.expansions {
        frontier.add(
            Uuid::new_v4(),
            job_id,
            expansion.task_type,
            &expansion.value,
            expansion.priority,
            expansion.depth,
            expansion.meta,
            chrono::Utc::now(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_adapters::mock::{ScriptedLlmJson, ScriptedScrape, ScriptedSearch};
    use scout_adapters::{Deps, ScrapeResult};
    use scout_core::{FixedClock, SequentialIdGen, TaskMeta};
    use scout_evidence::InMemoryEvidenceStore;
    use serde_json::json;
    use std::sync::Arc;

    fn deps_with_scrapes(scrapes: Vec<Result<ScrapeResult, scout_adapters::AdapterError>>, llm_calls: usize) -> Deps {
        let llm_responses = (0..llm_calls)
            .map(|_| Ok(json!({"claims": [{"field": "brand", "value": "HP", "confidence": 80}]})))
            .collect();
        Deps {
            search: Arc::new(ScriptedSearch::new(Vec::new())),
            scrape: Arc::new(ScriptedScrape::new(scrapes)),
            scrape_batch: Arc::new(scout_adapters::mock::ScriptedScrapeBatch::new(Vec::new())),
            extract_schema: Arc::new(scout_adapters::mock::ScriptedExtractSchema::new(Vec::new())),
            llm_json: Arc::new(ScriptedLlmJson::new(llm_responses)),
            image_qc: Arc::new(scout_adapters::mock::ScriptedImageQc::new(Vec::new())),
            fallback_search: Arc::new(scout_adapters::mock::ScriptedFallbackSearch::new(Vec::new())),
        }
    }

    #[tokio::test]
    async fn drains_a_small_frontier_to_completion() {
        let frontier = scout_frontier::InMemoryFrontier::new();
        let job_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        frontier.add(Uuid::new_v4(), job_id, TaskType::Url, "https://example.com/a", 10, 0, TaskMeta::default(), chrono::Utc::now());
        frontier.add(Uuid::new_v4(), job_id, TaskType::Url, "https://example.com/b", 10, 0, TaskMeta::default(), chrono::Utc::now());

        let deps = deps_with_scrapes(
            vec![
                Ok(ScrapeResult { markdown: "a".to_string(), title: None, discovered_urls: Vec::new() }),
                Ok(ScrapeResult { markdown: "b".to_string(), title: None, discovered_urls: Vec::new() }),
            ],
            2,
        );
        let evidence: Arc<dyn scout_evidence::EvidenceStore> = Arc::new(InMemoryEvidenceStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(chrono::Utc::now()));
        let id_gen: Arc<dyn scout_core::IdGen> = Arc::new(SequentialIdGen::new());
        let executor = TaskExecutor::new(deps, evidence, clock.clone(), id_gen);
        let cancel = CancellationToken::new();

        let outcome = run_slice(
            &frontier,
            &executor,
            clock.as_ref(),
            job_id,
            item_id,
            SliceConfig::default(),
            ExecuteOptions::default(),
            &cancel,
        )
        .await;

        assert!(outcome.done);
        assert!(!outcome.exhausted);
        let stats = frontier.stats(job_id);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn empty_frontier_is_immediately_done() {
        let frontier = scout_frontier::InMemoryFrontier::new();
        let job_id = Uuid::new_v4();
        let deps = deps_with_scrapes(Vec::new(), 0);
        let evidence: Arc<dyn scout_evidence::EvidenceStore> = Arc::new(InMemoryEvidenceStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(chrono::Utc::now()));
        let id_gen: Arc<dyn scout_core::IdGen> = Arc::new(SequentialIdGen::new());
        let executor = TaskExecutor::new(deps, evidence, clock.clone(), id_gen);
        let cancel = CancellationToken::new();

        let outcome = run_slice(
            &frontier,
            &executor,
            clock.as_ref(),
            job_id,
            Uuid::new_v4(),
            SliceConfig::default(),
            ExecuteOptions::default(),
            &cancel,
        )
        .await;

        assert!(outcome.done);
        assert!(!outcome.exhausted);
    }

    #[tokio::test]
    async fn cancellation_stops_new_dispatch_and_reports_exhausted() {
        let frontier = scout_frontier::InMemoryFrontier::new();
        let job_id = Uuid::new_v4();
        frontier.add(Uuid::new_v4(), job_id, TaskType::Url, "https://example.com/a", 10, 0, TaskMeta::default(), chrono::Utc::now());
        let deps = deps_with_scrapes(Vec::new(), 0);
        let evidence: Arc<dyn scout_evidence::EvidenceStore> = Arc::new(InMemoryEvidenceStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(chrono::Utc::now()));
        let id_gen: Arc<dyn scout_core::IdGen> = Arc::new(SequentialIdGen::new());
        let executor = TaskExecutor::new(deps, evidence, clock.clone(), id_gen);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = run_slice(
            &frontier,
            &executor,
            clock.as_ref(),
            job_id,
            Uuid::new_v4(),
            SliceConfig {
                drain_timeout: StdDuration::from_millis(50),
                ..SliceConfig::default()
            },
            ExecuteOptions::default(),
            &cancel,
        )
        .await;

        assert!(outcome.exhausted);
        assert_eq!(frontier.stats(job_id).pending, 1);
    }
}
