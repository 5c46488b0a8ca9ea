//! The crawl engine: a bounded worker pool draining the frontier under
//! robots policy, per-host pacing and content deduplication.
//!
//! The engine owns every collaborator as one composed value with an
//! `new -> run -> shutdown` lifecycle. Workers never let one page's
//! failure end the crawl; only setup failures are fatal.

use crate::config::{Config, RenderMode, Strategy};
use crate::dedup::{normalize_text, ContentFingerprint, Deduplicator, Observation, Verdict};
use crate::extract::{Extractor, HtmlExtractor, PageData};
use crate::fetch::{
    build_http_client, needs_render, FetchError, FetchResult, Fetcher, Renderer, StaticRenderer,
};
use crate::frontier::{Frontier, FrontierEntry, Priority};
use crate::limiter::{Outcome, RateLimiter};
use crate::robots::RobotsCache;
use crate::storage::{JsonlSink, PageRecord, SqliteStore, Storage, StorageSet};
use crate::url::{canonicalize, extract_host};
use crate::{Result, SkimmerError};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use url::Url;

/// Blocked responses whose Retry-After exceeds this are treated as a
/// permanent failure for the URL.
const MAX_RETRYABLE_BLOCK: Duration = Duration::from_secs(300);

/// Statuses worth a retry besides 5xx.
const RETRYABLE_STATUS: [u16; 1] = [408];

/// Engine counters published on demand.
#[derive(Debug, Clone)]
pub struct CrawlStats {
    pub added: u64,
    pub crawled: u64,
    pub failed: u64,
    /// Policy drops: robots-denied, shutdown mid-flight. Not failures.
    pub skipped: u64,
    /// Pages crawled but not stored because their content was a duplicate
    pub duplicates: u64,
    pub stored: u64,
    pub in_flight: u64,
    pub hosts_seen: u64,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

struct Counters {
    /// Remaining page reservations; a worker must take one before
    /// `frontier.next`, which keeps `crawled <= max_pages` exact under
    /// concurrency.
    budget: AtomicU64,
    skipped: AtomicU64,
    duplicates: AtomicU64,
    stored: AtomicU64,
}

impl Counters {
    fn new(max_pages: u64) -> Self {
        Self {
            budget: AtomicU64::new(max_pages),
            skipped: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            stored: AtomicU64::new(0),
        }
    }

    fn try_reserve_page(&self) -> bool {
        self.budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(1))
            .is_ok()
    }

    fn release_page(&self) {
        self.budget.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything a worker needs, cheaply cloneable.
#[derive(Clone)]
struct WorkerCtx {
    config: Arc<Config>,
    frontier: Arc<Frontier>,
    limiter: Arc<RateLimiter>,
    robots: Arc<RobotsCache>,
    dedup: Arc<Mutex<Deduplicator>>,
    fetcher: Arc<Fetcher>,
    renderer: Option<Arc<dyn Renderer>>,
    extractor: Arc<dyn Extractor>,
    storage: Arc<StorageSet>,
    counters: Arc<Counters>,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Triggers a graceful shutdown from outside the engine (e.g. Ctrl-C).
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.shutdown.send(true).ok();
    }
}

/// The composed crawl engine.
pub struct Engine {
    ctx: WorkerCtx,
    seeds: Vec<Url>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl Engine {
    /// Builds the engine and its collaborators from a validated config.
    ///
    /// This is the only place a failure is fatal: a client that cannot be
    /// built or a storage backend that cannot be opened aborts setup.
    pub fn new(config: Config) -> Result<Self> {
        let mut seeds = Vec::new();
        for seed in &config.seeds {
            seeds.push(canonicalize(seed, None)?);
        }

        let client = build_http_client(
            &config.user_agent.user_agent,
            &config.crawler,
            &config.politeness,
        )?;

        let robots = RobotsCache::new(
            client.clone(),
            config.user_agent.user_agent.clone(),
            &config.politeness,
        );
        let fetcher = Arc::new(Fetcher::new(client, config.user_agent.rotate_user_agents));
        let frontier = Frontier::new(&config.crawler, &config.scope, &seeds);
        // The extractor classifies links against the same scope policy
        // the frontier admits with.
        let extractor = HtmlExtractor::new(frontier.scope().clone());
        let limiter = RateLimiter::new(&config.politeness);
        let dedup = Deduplicator::new(&config.dedup);

        let mut backends: Vec<Arc<dyn Storage>> = Vec::new();
        if !config.output.jsonl_path.is_empty() {
            backends.push(Arc::new(JsonlSink::new(Path::new(&config.output.jsonl_path))?));
        }
        if !config.output.database_path.is_empty() {
            backends.push(Arc::new(SqliteStore::new(Path::new(
                &config.output.database_path,
            ))?));
        }
        if backends.is_empty() {
            return Err(SkimmerError::Setup(
                "no storage backend configured".to_string(),
            ));
        }

        let (shutdown_tx, _) = watch::channel(false);
        let max_pages = config.crawler.max_pages;

        // Javascript mode without an external backend still goes through
        // the renderer seam, via its static variant. Auto mode stays
        // static-only until a real renderer is plugged in.
        let renderer: Option<Arc<dyn Renderer>> = match config.crawler.render_mode {
            RenderMode::Javascript => Some(Arc::new(StaticRenderer::new(fetcher.clone()))),
            RenderMode::Static | RenderMode::Auto => None,
        };

        let ctx = WorkerCtx {
            config: Arc::new(config),
            frontier: Arc::new(frontier),
            limiter: Arc::new(limiter),
            robots: Arc::new(robots),
            dedup: Arc::new(Mutex::new(dedup)),
            fetcher,
            renderer,
            extractor: Arc::new(extractor),
            storage: Arc::new(StorageSet::new(backends)),
            counters: Arc::new(Counters::new(max_pages)),
            shutdown: Arc::new(shutdown_tx),
        };

        Ok(Self {
            ctx,
            seeds,
            started_at: Utc::now(),
            started: Instant::now(),
        })
    }

    /// Plugs in a JS rendering backend for `javascript`/`auto` modes.
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.ctx.renderer = Some(renderer);
        self
    }

    /// Replaces the default HTML extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.ctx.extractor = extractor;
        self
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: self.ctx.shutdown.clone(),
        }
    }

    /// Runs the crawl to quiescence, page cap, or shutdown, then flushes
    /// storage and reports stats.
    pub async fn run(&self) -> Result<CrawlStats> {
        if self.seeds.is_empty() {
            return Err(SkimmerError::Setup("no seed URLs".to_string()));
        }

        let seed_priority = match self.ctx.config.crawler.strategy {
            Strategy::Hybrid => Priority::High,
            Strategy::Bfs | Strategy::Dfs => Priority::Normal,
        };
        for seed in &self.seeds {
            let outcome = self
                .ctx
                .frontier
                .add(seed.clone(), 0, seed_priority, None)
                .await;
            tracing::debug!(seed = %seed, ?outcome, "seed admitted");
        }

        // All seeds rejected (explicit allowed-domains excluding them):
        // nothing will ever wake the workers.
        if self.ctx.frontier.is_quiescent().await {
            self.ctx.trigger_shutdown("no seeds admitted");
        }

        let workers = self.ctx.config.crawler.workers;
        tracing::info!(
            workers,
            seeds = self.seeds.len(),
            max_pages = self.ctx.config.crawler.max_pages,
            max_depth = self.ctx.config.crawler.max_depth,
            "starting crawl"
        );

        let mut tasks = JoinSet::new();
        for worker_id in 0..workers {
            let ctx = self.ctx.clone();
            let shutdown_rx = self.ctx.shutdown.subscribe();
            tasks.spawn(async move { ctx.worker_loop(worker_id, shutdown_rx).await });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "worker task failed");
            }
        }

        self.ctx.storage.flush().await;

        let stats = self.stats().await;
        tracing::info!(
            crawled = stats.crawled,
            stored = stats.stored,
            duplicates = stats.duplicates,
            failed = stats.failed,
            skipped = stats.skipped,
            hosts = stats.hosts_seen,
            duration_secs = stats.duration.as_secs_f64(),
            "crawl finished"
        );
        Ok(stats)
    }

    /// Current counters; callable at any point in the lifecycle.
    pub async fn stats(&self) -> CrawlStats {
        let frontier = self.ctx.frontier.stats().await;
        CrawlStats {
            added: frontier.added,
            crawled: frontier.crawled,
            failed: frontier.failed,
            skipped: self.ctx.counters.skipped.load(Ordering::Relaxed),
            duplicates: self.ctx.counters.duplicates.load(Ordering::Relaxed),
            stored: self.ctx.counters.stored.load(Ordering::Relaxed),
            in_flight: frontier.in_flight,
            hosts_seen: self.ctx.limiter.host_count().await as u64,
            started_at: self.started_at,
            duration: self.started.elapsed(),
        }
    }
}

impl WorkerCtx {
    fn trigger_shutdown(&self, reason: &str) {
        if !*self.shutdown.borrow() {
            tracing::info!(reason, "initiating shutdown");
        }
        self.shutdown.send(true).ok();
    }

    async fn worker_loop(&self, worker_id: usize, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::debug!(worker_id, "worker started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            // The page budget is reserved before pulling work so the
            // crawled-pages cap holds exactly under concurrency. A worker
            // that cannot reserve bows out alone; workers still holding a
            // reservation are entitled to finish their page.
            if !self.counters.try_reserve_page() {
                tracing::debug!(worker_id, "page budget exhausted");
                break;
            }

            let Some(entry) = self.frontier.next(&mut shutdown_rx).await else {
                self.counters.release_page();
                break;
            };

            self.process(entry, &mut shutdown_rx).await;

            if self.frontier.is_quiescent().await {
                self.trigger_shutdown("frontier quiescent");
                break;
            }
        }

        tracing::debug!(worker_id, "worker stopped");
    }

    /// One full pass over a frontier entry: robots gate, pacing, fetch,
    /// dedup, extraction, persistence, link harvest.
    async fn process(&self, entry: FrontierEntry, shutdown_rx: &mut watch::Receiver<bool>) {
        let url = entry.url.clone();
        let Some(host) = extract_host(&url) else {
            // Canonical URLs always have a host; treat anything else as a
            // permanent admission mistake.
            self.frontier.fail(&url, false).await;
            self.counters.release_page();
            return;
        };

        if self.config.politeness.respect_robots {
            let cached = self.robots.policy_for(&url).await;
            let ua = &self.config.user_agent.user_agent;
            if !cached.policy.is_allowed(url.as_str(), ua) {
                tracing::debug!(url = %url, "disallowed by robots.txt");
                self.frontier.skip(&url).await;
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                self.counters.release_page();
                return;
            }
            if let Some(delay) = cached.policy.crawl_delay(ua) {
                self.limiter.set_crawl_delay(&host, delay).await;
            }
        }

        if !self.limiter.acquire(&host, shutdown_rx).await {
            // Shutdown while waiting for a permit; the URL stays seen but
            // is neither crawled nor failed.
            self.frontier.skip(&url).await;
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            self.counters.release_page();
            return;
        }

        let result = match self.fetch_page(&url).await {
            Ok(result) => result,
            Err(e) => {
                // Deadline elapses and transport errors back the host off
                // like a server error would.
                self.limiter.report(&host, Outcome::ServerError).await;
                tracing::debug!(url = %url, error = %e, "fetch failed");
                self.frontier.fail(&url, e.is_transient()).await;
                self.counters.release_page();
                return;
            }
        };

        self.limiter.report(&host, outcome_of(&result)).await;

        if result.blocked {
            let transient = result
                .retry_after()
                .is_some_and(|wait| wait <= MAX_RETRYABLE_BLOCK);
            tracing::debug!(url = %url, status = result.status, transient, "blocked response");
            self.frontier.fail(&url, transient).await;
            self.counters.release_page();
            return;
        }

        if !result.is_success() {
            let transient =
                result.status >= 500 || RETRYABLE_STATUS.contains(&result.status);
            self.frontier.fail(&url, transient).await;
            self.counters.release_page();
            return;
        }

        // Everything downstream keys on the canonical final URL.
        let final_url =
            canonicalize(result.final_url.as_str(), None).unwrap_or_else(|_| url.clone());
        if final_url != url {
            self.frontier.mark_seen(&final_url).await;
        }

        let page = self.extractor.extract(&result.body, &final_url);
        let observation = self.observe(&final_url, &page).await;

        let harvest_links = !observation.verdict.is_duplicate()
            || self.config.dedup.harvest_duplicate_links;
        if harvest_links {
            self.harvest(&entry, &final_url, &page).await;
        }

        match &observation.verdict {
            Verdict::New => {
                let record = self.make_record(&entry, &result, &final_url, &page, &observation);
                self.storage.save(&record).await;
                self.counters.stored.fetch_add(1, Ordering::Relaxed);
            }
            Verdict::ExactDuplicate => {
                tracing::debug!(url = %final_url, "exact duplicate, not stored");
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            }
            Verdict::NearDuplicate { of_url, similarity } => {
                tracing::debug!(url = %final_url, of_url = %of_url, similarity, "near duplicate, not stored");
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.frontier.complete(&url).await;
    }

    async fn fetch_page(&self, url: &Url) -> std::result::Result<FetchResult, FetchError> {
        let session = &self.config.session;
        match self.config.crawler.render_mode {
            RenderMode::Static => self.fetcher.fetch(url, session).await,
            RenderMode::Javascript => match &self.renderer {
                Some(renderer) => renderer.render(url, session).await,
                None => self.fetcher.fetch(url, session).await,
            },
            RenderMode::Auto => {
                let result = self.fetcher.fetch(url, session).await?;
                let Some(renderer) = &self.renderer else {
                    return Ok(result);
                };
                if !needs_render(&result) {
                    return Ok(result);
                }
                tracing::debug!(url = %url, "static body looks empty, rendering");
                match renderer.render(url, session).await {
                    Ok(rendered) => Ok(rendered),
                    Err(e) => {
                        // Keep the static body rather than failing the
                        // page outright.
                        tracing::warn!(url = %url, error = %e, "renderer failed");
                        Ok(result)
                    }
                }
            }
        }
    }

    async fn observe(&self, final_url: &Url, page: &PageData) -> Observation {
        if self.config.dedup.enable {
            self.dedup
                .lock()
                .await
                .observe(final_url.as_str(), &page.text)
        } else {
            Observation {
                verdict: Verdict::New,
                fingerprint: ContentFingerprint::compute(&normalize_text(&page.text)),
            }
        }
    }

    async fn harvest(&self, entry: &FrontierEntry, final_url: &Url, page: &PageData) {
        let depth = entry.depth + 1;
        for link in &page.links {
            if link.nofollow && !self.config.scope.follow_nofollow_links {
                continue;
            }
            let priority = child_priority(self.config.crawler.strategy, depth, link.is_internal);
            self.frontier
                .add(link.url.clone(), depth, priority, Some(final_url.clone()))
                .await;
        }
    }

    fn make_record(
        &self,
        entry: &FrontierEntry,
        result: &FetchResult,
        final_url: &Url,
        page: &PageData,
        observation: &Observation,
    ) -> PageRecord {
        PageRecord {
            url: entry.url.to_string(),
            final_url: final_url.to_string(),
            domain: extract_host(final_url).unwrap_or_default(),
            depth: entry.depth,
            parent_url: entry.parent.as_ref().map(|p| p.to_string()),
            fetched_at: Utc::now(),
            status: result.status,
            rendered: result.rendered,
            fingerprint: observation.fingerprint.exact_hex(),
            title: page.title.clone(),
            payload: page.payload.clone(),
        }
    }
}

fn outcome_of(result: &FetchResult) -> Outcome {
    match result.status {
        429 => Outcome::RateLimited {
            retry_after: result.retry_after(),
        },
        status if status >= 500 => Outcome::ServerError,
        status if status >= 400 => Outcome::ClientError,
        // A captcha wall behind a 200 is not a success the host should be
        // rewarded for.
        _ if result.blocked => Outcome::ClientError,
        _ => Outcome::Success {
            latency: result.latency,
        },
    }
}

fn child_priority(strategy: Strategy, depth: u32, is_internal: bool) -> Priority {
    match strategy {
        Strategy::Bfs => Priority::Normal,
        // Depth-first enough: deeper discoveries pop before their
        // ancestors' siblings.
        Strategy::Dfs => match depth {
            0 | 1 => Priority::Normal,
            2 => Priority::High,
            _ => Priority::Critical,
        },
        Strategy::Hybrid => {
            if is_internal {
                Priority::Normal
            } else {
                Priority::Low
            }
        }
    }
}
