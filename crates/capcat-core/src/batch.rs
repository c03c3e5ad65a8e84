use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::behavior::DiscoveryOutcome;
use crate::discovery;
use crate::models::{Article, RunSummary, SourceDescriptor, SourceKind};
use crate::output::OutputLayout;
use crate::retry::SkipTracker;
use crate::runtime::Runtime;

/// Discovery is retried this many times (in addition to the first
/// attempt) by the retry/skip wrapper before a source is abandoned for
/// the run, per spec.md §4.7's `discoverWithRetrySkip` default.
const DEFAULT_DISCOVERY_RETRIES: u32 = 2;

/// Timeout for the HEAD-request liveness check update mode runs against
/// an existing specialized article's original URL. Deliberately short:
/// this is a reachability probe, not a content fetch.
const LIVENESS_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// A callback invoked as work completes: `(progress in [0,1], stage
/// description)`. Shared across every spawned task for a run, so it
/// must be `Send + Sync`.
pub type ProgressCallback = Arc<dyn Fn(f64, &str) + Send + Sync>;

/// Inputs to one batch run (§4.8 "Inputs").
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub source_ids: Vec<String>,
    pub count_per_source: u32,
    pub output_root: String,
    pub download_media: bool,
    pub update_mode: bool,
    pub quiet: bool,
    pub verbose: bool,
}

/// Outcome of one article fetch task, counted exactly once regardless
/// of whether it completed, failed, or was cancelled by a timeout (see
/// SPEC_FULL.md's Open Question resolution #1 on timeout double-counting).
enum FetchOutcome {
    Success,
    Failed,
}

/// Coordinates the five phases of one batch run: parallel discovery,
/// cross-source deduplication, per-source directory materialization,
/// parallel fetch, and summary aggregation. Constructed once per run
/// over a shared, process-lifetime `Runtime`.
pub struct BatchProcessor {
    runtime: Arc<Runtime>,
}

impl BatchProcessor {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    pub async fn run(
        &self,
        request: BatchRequest,
        date: NaiveDate,
        progress: Option<ProgressCallback>,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        let skip_tracker = Arc::new(SkipTracker::new());
        let dedup = Arc::new(crate::dedup::UrlDedupSet::new());

        let discovered_by_source = self.discover_all(&request, &skip_tracker, &mut summary).await;

        let unique_by_source = dedup_across_sources(discovered_by_source, &dedup, &mut summary);

        let report = |p: f64, stage: &str| {
            if !request.quiet {
                if let Some(cb) = &progress {
                    cb(p, stage);
                }
            }
        };

        let total_sources = unique_by_source.len().max(1);
        for (i, (source_id, articles)) in unique_by_source.into_iter().enumerate() {
            let Some(descriptor) = self.runtime.registry.get(&source_id).cloned() else {
                continue;
            };
            let descriptor = Arc::new(descriptor);

            let source_dir = OutputLayout::batch_source_dir(
                &request.output_root,
                &descriptor.display_name,
                date,
            );

            report(
                i as f64 / total_sources as f64,
                &format!("fetching {source_id} ({} articles)", articles.len()),
            );

            let (fetched, failed) = self
                .fetch_source(
                    &source_id,
                    descriptor,
                    articles,
                    source_dir,
                    request.update_mode,
                )
                .await;

            let entry = summary.entry(&source_id);
            entry.fetched = fetched;
            entry.failed = failed;
        }

        report(1.0, "done");

        summary.skip_records = skip_tracker.drain().await;
        summary
    }

    /// Phase 1: one discovery task per source, bounded to
    /// `max_discovery_workers`. A source whose discovery skips or
    /// errors contributes zero articles; other sources are unaffected.
    async fn discover_all(
        &self,
        request: &BatchRequest,
        skip_tracker: &Arc<SkipTracker>,
        summary: &mut RunSummary,
    ) -> HashMap<String, Vec<Article>> {
        let semaphore = Arc::new(Semaphore::new(self.runtime.config.max_discovery_workers));
        let mut set: JoinSet<(String, DiscoveryOutcome)> = JoinSet::new();

        for source_id in &request.source_ids {
            let Some(descriptor) = self.runtime.registry.get(source_id) else {
                warn!(source_id, "unknown source, skipping");
                continue;
            };
            let descriptor = descriptor.clone();
            let source_id = source_id.clone();
            let count = request.count_per_source;
            let runtime = self.runtime.clone();
            let semaphore = semaphore.clone();
            let skip_tracker = skip_tracker.clone();

            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let outcome = run_discovery(&runtime, &descriptor, &source_id, count, &skip_tracker).await;
                (source_id, outcome)
            });
        }

        let mut discovered = HashMap::new();
        while let Some(res) = set.join_next().await {
            let (source_id, outcome) = match res {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "discovery task panicked");
                    continue;
                }
            };

            match outcome {
                DiscoveryOutcome::Items(items) => {
                    summary.entry(&source_id).discovered = items.len() as u64;
                    discovered.insert(source_id, items);
                }
                DiscoveryOutcome::Skipped(record) => {
                    warn!(source_id = %record.source_id, reason = %record.reason, "source skipped for this run");
                    summary.entry(&source_id).skipped += 1;
                }
                DiscoveryOutcome::Error(kind, message) => {
                    warn!(source_id, %kind, message, "source discovery failed, skipping for this run");
                    summary.entry(&source_id).skipped += 1;
                }
            }
        }

        discovered
    }

    /// Phase 4 for one source: create its output directory, then fetch
    /// every article through a worker pool of size
    /// `min(max_workers, article_count)`, bounded overall by
    /// `per_article_timeout * article_count` (§5's timeouts budget).
    async fn fetch_source(
        &self,
        source_id: &str,
        descriptor: Arc<SourceDescriptor>,
        articles: Vec<Article>,
        source_dir: PathBuf,
        update_mode: bool,
    ) -> (u64, u64) {
        if let Err(e) = tokio::fs::create_dir_all(&source_dir).await {
            warn!(source_id, path = %source_dir.display(), error = %e, "failed to create source directory");
            return (0, articles.len() as u64);
        }

        let article_count = articles.len();
        let worker_count = self.runtime.config.max_workers.min(article_count).max(1);
        let semaphore = Arc::new(Semaphore::new(worker_count));
        let per_article_timeout =
            Duration::from_secs(self.runtime.config.per_article_timeout_seconds);
        let max_filename_length = self.runtime.config.max_filename_length;

        let mut set: JoinSet<FetchOutcome> = JoinSet::new();
        for (i, article) in articles.into_iter().enumerate() {
            let index = (i + 1) as u32;
            let article_dir =
                OutputLayout::batch_article_dir(&source_dir, index, &article.title, max_filename_length);
            let semaphore = semaphore.clone();
            let runtime = self.runtime.clone();
            let descriptor = descriptor.clone();
            let source_id = source_id.to_string();

            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                match tokio::time::timeout(
                    per_article_timeout,
                    fetch_one_article(runtime, source_id.clone(), descriptor, article, article_dir, update_mode),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        debug!(source_id, index, "article fetch exceeded per-article timeout");
                        FetchOutcome::Failed
                    }
                }
            });
        }

        let global_timeout = per_article_timeout.saturating_mul(article_count as u32);
        let deadline = Instant::now() + global_timeout;
        let mut fetched = 0u64;
        let mut failed = 0u64;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, set.join_next()).await {
                Ok(Some(Ok(FetchOutcome::Success))) => fetched += 1,
                Ok(Some(Ok(FetchOutcome::Failed))) => failed += 1,
                Ok(Some(Err(e))) => {
                    warn!(source_id, error = %e, "fetch task panicked");
                    failed += 1;
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }

        let abandoned = set.len();
        if abandoned > 0 {
            set.abort_all();
            failed += abandoned as u64;
        }

        (fetched, failed)
    }
}

/// Dispatches to `SourceBehavior::discover` for custom sources, or the
/// retry/skip-wrapped declarative discovery strategies otherwise.
async fn run_discovery(
    runtime: &Runtime,
    descriptor: &SourceDescriptor,
    source_id: &str,
    count: u32,
    skip_tracker: &SkipTracker,
) -> DiscoveryOutcome {
    match descriptor.kind {
        SourceKind::Custom => match runtime.registry.custom_behavior(source_id) {
            Some(behavior) => behavior.discover(count).await,
            None => DiscoveryOutcome::Error(
                crate::error::ErrorKind::Validation,
                format!("custom source '{source_id}' has no registered behavior"),
            ),
        },
        SourceKind::Declarative | SourceKind::Specialized => {
            let rate_limiter = runtime.rate_limiter(source_id);
            let circuit_breaker = runtime.circuit_breaker(source_id);
            discovery::discover_with_retry_skip(
                descriptor,
                count,
                DEFAULT_DISCOVERY_RETRIES,
                &runtime.client,
                &rate_limiter,
                &circuit_breaker,
                skip_tracker,
                discovery::default_should_skip,
            )
            .await
        }
    }
}

/// Phase 4 step 1-3 for one article: specialized handler first, then
/// the source's own fetch path (custom behavior or the default
/// `ContentFetcher`), routed through that source's rate limiter and
/// circuit breaker, then an optional best-effort comment fetch.
async fn fetch_one_article(
    runtime: Arc<Runtime>,
    source_id: String,
    descriptor: Arc<SourceDescriptor>,
    article: Article,
    article_dir: PathBuf,
    update_mode: bool,
) -> FetchOutcome {
    if let Some(handler) = runtime.specialized_handlers.find_handler(&article.url) {
        let article_md = article_dir.join("article.md");
        if update_mode && article_md.exists() {
            let alive = runtime
                .update_controller
                .check_liveness(&article.url, LIVENESS_CHECK_TIMEOUT)
                .await;
            return match crate::update::UpdateController::annotate_existing_article(&article_md, alive).await {
                Ok(()) => FetchOutcome::Success,
                Err(e) => {
                    warn!(source_id, url = %article.url, error = %e, "update annotation failed");
                    FetchOutcome::Failed
                }
            };
        }

        return match handler.write_placeholder(&article, &article_dir) {
            Ok(_) => FetchOutcome::Success,
            Err(e) => {
                warn!(source_id, url = %article.url, error = %e, "specialized handler failed");
                FetchOutcome::Failed
            }
        };
    }

    let rate_limiter = runtime.rate_limiter(&source_id);
    let circuit_breaker = runtime.circuit_breaker(&source_id);

    let result = circuit_breaker
        .call(|| async {
            rate_limiter.acquire().await;
            if descriptor.kind == SourceKind::Custom {
                match runtime.registry.custom_behavior(&source_id) {
                    Some(behavior) => behavior.fetch_article(&article, &article_dir).await,
                    None => Err(crate::error::CapcatError::Validation {
                        field: "source".to_string(),
                        requirement: format!("no custom behavior registered for {source_id}"),
                    }),
                }
            } else {
                runtime.content_fetcher.fetch_article(&article, &article_dir).await
            }
        })
        .await;

    match result {
        Ok((true, folder_path)) => {
            if descriptor.supports_comments {
                if let Some(comment_url) = &article.comment_url {
                    if let Err(e) = runtime
                        .content_fetcher
                        .fetch_comments(comment_url, &article.title, &folder_path)
                        .await
                    {
                        warn!(source_id, url = %article.url, error = %e, "comment fetch failed, article kept");
                    }
                }
            }
            FetchOutcome::Success
        }
        Ok((false, _)) => FetchOutcome::Failed,
        Err(e) => {
            info!(source_id, url = %article.url, error = %e, "article fetch failed");
            FetchOutcome::Failed
        }
    }
}

/// Phase 2: process sources in lexicographic order; within a source,
/// preserve discovery order. Each URL is checked-and-inserted against
/// the run-scoped dedup set exactly once.
fn dedup_across_sources(
    discovered_by_source: HashMap<String, Vec<Article>>,
    dedup: &crate::dedup::UrlDedupSet,
    summary: &mut RunSummary,
) -> Vec<(String, Vec<Article>)> {
    let mut source_ids: Vec<String> = discovered_by_source.keys().cloned().collect();
    source_ids.sort();

    let mut result = Vec::new();
    for source_id in source_ids {
        let articles = discovered_by_source.get(&source_id).cloned().unwrap_or_default();
        let mut unique = Vec::with_capacity(articles.len());
        for article in articles {
            if dedup.mark_if_new(&article.url) {
                unique.push(article);
            } else {
                summary.duplicates_elided += 1;
            }
        }
        if !unique.is_empty() {
            result.push((source_id, unique));
        }
    }
    result
}
