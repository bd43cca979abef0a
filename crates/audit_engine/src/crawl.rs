use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Arc;

use audit_core::{
    normalize_url_for_dedupe, parse_http_url, update, Aggregator, CrawlPhase, CrawlReport,
    CrawlSession, CrawlState, CrawlTask, Depth, Effect, FetchError, FetchResult, InvalidUrl,
    LinkScope, MergeOutcome, Msg, ReportContext, SiteFindings, Take,
};
use audit_logging::{audit_debug, audit_error, audit_info, audit_warn};
use chrono::SecondsFormat;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::analyze::{PageAnalyzer, SeoAnalyzer};
use crate::fetch::{FetchSettings, Fetcher, ReqwestFetcher};
use crate::filename::domain_label;
use crate::robots::load_robots;
use crate::sitemap::audit_sitemap;

/// Produces the `crawl_timestamp` written into the reports.
pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub max_depth: Depth,
    pub workers: usize,
    pub check_external_links: bool,
    /// Skip queueing internal links that robots.txt disallows.
    pub respect_robots: bool,
    pub fetch: FetchSettings,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_depth: 3,
            workers: 2 * num_cpus::get(),
            check_external_links: true,
            respect_robots: false,
            fetch: FetchSettings::default(),
        }
    }
}

/// Problems that abort a crawl before any worker starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid seed url: {0}")]
    InvalidSeed(#[from] InvalidUrl),
    #[error("seed {url} is unreachable: {source}")]
    SeedUnreachable {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("cannot build http client: {0}")]
    Client(#[source] FetchError),
}

pub struct Crawler {
    settings: CrawlSettings,
    fetcher: Option<Arc<dyn Fetcher>>,
    clock: Clock,
}

impl Crawler {
    /// Crawler over HTTP, built for the seed's scope when [`Crawler::run`] starts.
    pub fn new(settings: CrawlSettings) -> Self {
        Self {
            settings,
            fetcher: None,
            clock: system_clock(),
        }
    }

    /// Crawler over a caller-supplied fetcher, e.g. a browser-backed one.
    pub fn with_fetcher(settings: CrawlSettings, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            settings,
            fetcher: Some(fetcher),
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Crawls from `seed` until the frontier is exhausted or `stop` is cancelled.
    ///
    /// A stopped crawl still returns the report of everything merged so far.
    pub async fn run(&self, seed: &str, stop: CancellationToken) -> Result<CrawlReport, ConfigError> {
        let seed_url = parse_http_url(seed)?;
        let scope = LinkScope::from_seed(&seed_url)
            .ok_or_else(|| InvalidUrl::MissingHost(seed.trim().to_string()))?;
        let fetcher: Arc<dyn Fetcher> = match &self.fetcher {
            Some(fetcher) => fetcher.clone(),
            None => Arc::new(
                ReqwestFetcher::new(self.settings.fetch.clone(), scope.clone())
                    .map_err(ConfigError::Client)?,
            ),
        };
        audit_info!(
            "Crawl of {} starting: max_depth={} workers={}",
            seed_url,
            self.settings.max_depth,
            self.settings.workers
        );

        let (robots, robots_summary) =
            load_robots(fetcher.as_ref(), &seed_url, &self.settings.fetch.user_agent).await;
        let robots = Arc::new(robots);
        let sitemap = audit_sitemap(fetcher.as_ref(), &seed_url, robots.sitemaps(), &scope).await;

        let seed_str = seed_url.to_string();
        let seed_fetch = fetcher
            .fetch(&seed_str)
            .await
            .map_err(|source| ConfigError::SeedUnreachable {
                url: seed_str.clone(),
                source,
            })?;

        let aggregator = if self.settings.respect_robots {
            let rules = robots.clone();
            Aggregator::with_link_filter(Box::new(move |url: &str| rules.allowed(url)))
        } else {
            Aggregator::new()
        };
        let ctx = Arc::new(WorkerContext {
            state: CrawlState::new(self.settings.max_depth, aggregator),
            fetcher,
            analyzer: Arc::new(SeoAnalyzer::with_robots(robots)),
            work_available: Notify::new(),
            stop: CancellationToken::new(),
            check_external_links: self.settings.check_external_links,
        });

        let seed_task = CrawlTask {
            url: seed_str.clone(),
            depth: 0,
            origin_referrer: None,
        };
        // The seed is claimed rather than offered; it must never be fetched twice.
        if let Err(err) = ctx.state.frontier.claim(&seed_str, 0) {
            audit_warn!("Seed {} not claimable: {}", seed_str, err);
        }
        ctx.process_fetched(&seed_task, seed_fetch).await;

        let session = self.drive(&ctx, stop).await;
        audit_info!(
            "Crawl of {} finished: pages={} tasks={}/{} frontier_exhausted={} stopped_early={}",
            seed_str,
            ctx.state.aggregator.pages_merged(),
            session.tasks_finished(),
            ctx.state.frontier.dispatched_count(),
            ctx.state.frontier.is_exhausted(),
            session.stopped_early()
        );

        let findings = SiteFindings {
            robots: robots_summary,
            sitemap,
        };
        let context = ReportContext {
            domain: domain_label(&seed_url),
            seed: seed_str,
            crawl_timestamp: (self.clock)(),
        };
        Ok(ctx
            .state
            .aggregator
            .finish(&ctx.state.frontier, findings, context))
    }

    /// Runs the worker pool under the coordinator state machine until `Done`.
    async fn drive(&self, ctx: &Arc<WorkerContext>, stop: CancellationToken) -> CrawlSession {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = CrawlSession::new();
        let mut workers = JoinSet::new();
        let mut inbox = VecDeque::from([Msg::Start {
            workers: self.settings.workers,
        }]);
        let mut stop_seen = false;
        let mut joined = false;

        loop {
            while let Some(msg) = inbox.pop_front() {
                let (next, effects) = update(session, msg);
                session = next;
                for effect in effects {
                    match effect {
                        Effect::DispatchWorkers { count } => {
                            audit_debug!("Dispatching {} worker(s)", count);
                            for id in 0..count {
                                workers.spawn(run_worker(ctx.clone(), id, tx.clone()));
                            }
                        }
                        Effect::CancelWorkers => {
                            audit_info!("Stop requested, draining in-flight tasks");
                            ctx.stop.cancel();
                            ctx.work_available.notify_waiters();
                        }
                        Effect::EmitReport => {}
                    }
                }
            }
            if session.phase() == CrawlPhase::Done {
                return session;
            }

            tokio::select! {
                Some(msg) = rx.recv() => inbox.push_back(msg),
                _ = stop.cancelled(), if !stop_seen => {
                    stop_seen = true;
                    inbox.push_back(Msg::StopRequested);
                }
                result = workers.join_next(), if !joined => match result {
                    Some(Ok(())) => {}
                    Some(Err(err)) => audit_error!("Worker terminated abnormally: {}", err),
                    None => {
                        joined = true;
                        // Messages sent before the last worker exited come first.
                        while let Ok(msg) = rx.try_recv() {
                            inbox.push_back(msg);
                        }
                        inbox.push_back(Msg::WorkersJoined);
                    }
                },
            }
        }
    }
}

struct WorkerContext {
    state: CrawlState,
    fetcher: Arc<dyn Fetcher>,
    analyzer: Arc<dyn PageAnalyzer>,
    work_available: Notify,
    stop: CancellationToken,
    check_external_links: bool,
}

impl WorkerContext {
    async fn process(&self, task: CrawlTask) {
        let frontier = &self.state.frontier;
        let own_key = normalize_url_for_dedupe(&task.url).ok();
        // Redirects stop at pages the crawl already owns.
        let gate = |hop: &str| {
            normalize_url_for_dedupe(hop).ok() == own_key || frontier.depth_of(hop).is_none()
        };
        match self.fetcher.fetch_guarded(&task.url, &gate).await {
            Ok(fetched) => self.process_fetched(&task, fetched).await,
            Err(err) => {
                audit_debug!("Recording failure of {}: {}", task.url, err);
                self.state.aggregator.record_failure(&task, &err);
            }
        }
    }

    async fn process_fetched(&self, task: &CrawlTask, fetched: FetchResult) {
        let moved = normalize_url_for_dedupe(&fetched.final_url).ok()
            != normalize_url_for_dedupe(&task.url).ok();
        if moved {
            let claimed = self.state.frontier.claim(&fetched.final_url, task.depth);
            if matches!(claimed, Ok(false)) {
                self.state.aggregator.record_redirect_to_known(task, &fetched);
                return;
            }
        }

        let analysis = self.analyzer.analyze(&fetched, task.depth);
        let outcome = self
            .state
            .aggregator
            .merge(task, &fetched, analysis, &self.state.frontier);
        self.work_available.notify_waiters();

        // Nothing else fetches internal targets below max_depth.
        if let MergeOutcome::Merged { beyond_depth, .. } = &outcome {
            self.check_links(beyond_depth.iter().map(String::as_str)).await;
        }
        if self.check_external_links {
            let external = fetched
                .discovered_links
                .iter()
                .filter(|link| !link.is_internal)
                .map(|link| link.url.as_str());
            self.check_links(external).await;
        }
    }

    /// Status-checks each target once per crawl; skipped once stop is requested.
    async fn check_links<'a>(&self, targets: impl Iterator<Item = &'a str> + Send) {
        for url in targets {
            if self.stop.is_cancelled() {
                return;
            }
            if !self.state.aggregator.claim_link_check(url) {
                continue;
            }
            let result = self.fetcher.check_status(url).await;
            if let Err(err) = &result {
                audit_debug!("Link {} failed: {}", url, err);
            }
            self.state.aggregator.record_link_check(url, result);
        }
    }
}

/// Marks a taken task complete when dropped, including when processing panics,
/// so the remaining workers still see the frontier drain.
struct InFlight<'a> {
    ctx: &'a WorkerContext,
    tx: &'a mpsc::UnboundedSender<Msg>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.ctx.state.frontier.complete();
        self.ctx.work_available.notify_waiters();
        let _ = self.tx.send(Msg::TaskFinished);
    }
}

/// Worker loop: take, fetch, analyze, merge, complete.
async fn run_worker(ctx: Arc<WorkerContext>, id: usize, tx: mpsc::UnboundedSender<Msg>) {
    audit_debug!("Worker {} started", id);
    loop {
        // Registered before inspecting the frontier so a wake-up between the
        // check and the wait is not lost.
        let mut notified = pin!(ctx.work_available.notified());
        notified.as_mut().enable();

        if ctx.stop.is_cancelled() {
            break;
        }
        match ctx.state.frontier.take() {
            Take::Task(task) => {
                let _in_flight = InFlight { ctx: &ctx, tx: &tx };
                ctx.process(task).await;
            }
            Take::Pending => {
                tokio::select! {
                    _ = notified => {}
                    _ = ctx.stop.cancelled() => break,
                }
            }
            Take::Exhausted => {
                ctx.work_available.notify_waiters();
                let _ = tx.send(Msg::FrontierExhausted);
                break;
            }
        }
    }
    audit_debug!("Worker {} exiting", id);
}
