//! Mirror coordinator - main run orchestration logic
//!
//! A run moves through `Seeding → Draining → Publishing → Done`:
//!
//! - **Seeding** builds the modification index and queues the entry routes
//! - **Draining** processes the entry routes one by one in configured order,
//!   then hands the rest of the frontier to a pool of workers
//! - **Publishing** swaps the staging area in as the new live generation
//! - **Done** reports the run totals
//!
//! Processing the entry routes serially makes the layout probe land on the
//! first entry route that qualifies, rather than on whichever route a
//! worker happens to pick.

use crate::config::{Config, OutputMode};
use crate::crawler::cache::{CacheLookup, CacheStore};
use crate::crawler::extractor::{LinkExtractor, LinkPatterns};
use crate::crawler::frontier::Frontier;
use crate::crawler::policy::RedownloadPolicy;
use crate::crawler::rewriter::{LinkRewriter, RewriteRules};
use crate::crawler::Fetcher;
use crate::index::build_index;
use crate::output::RunSummary;
use crate::state::{RouteFailure, RouteState, RunContext};
use crate::storage::layout::{file_path_for, file_url};
use crate::storage::{FsStore, Store};
use crate::url::{PathNormalizer, ResourceKind, Route};
use crate::{MirrorError, Result};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// Routes between two progress lines
const PROGRESS_INTERVAL: usize = 50;

/// Main mirror coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    store: Arc<FsStore>,
    fetcher: Arc<Fetcher>,
    engine: Arc<Engine>,
    entries: Vec<String>,
}

/// Everything a worker needs to process one route
struct Engine {
    frontier: Frontier,
    context: RunContext,
    cache: CacheStore,
    extractor: LinkExtractor,
    rewriter: LinkRewriter,
    normalizer: PathNormalizer,
    strict: bool,
    processed: AtomicUsize,
    started: Instant,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Opens the output root (recovering from an interrupted publish and
    /// discarding stale staging leftovers) and builds the modification index.
    ///
    /// # Arguments
    ///
    /// * `config` - The validated run configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(MirrorError)` - Storage, client or index setup failed
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(FsStore::open(Path::new(&config.output.root))?);
        let fetcher = Arc::new(Fetcher::new(&config)?);

        let file_root = file_url(store.live_root())?;
        let mut normalizer = PathNormalizer::new(&config.site.hostnames);
        if config.output.mode == OutputMode::Offline {
            // Cached offline documents link through file URLs of the live root
            normalizer = normalizer.with_prefix(file_root.clone());
        }

        let index = build_index(
            &fetcher,
            &config.index,
            &normalizer,
            config.crawler.strict,
        )
        .await?;

        let patterns = Arc::new(LinkPatterns::new(
            &config.site.authoring_hostname,
            &config.policy.restricted_prefix,
            &config.rewrite.literal_passthrough,
        )?);
        let rewriter = LinkRewriter::new(
            Arc::clone(&patterns),
            normalizer.clone(),
            RewriteRules {
                mode: config.output.mode,
                file_root,
                restricted_prefix: config.policy.restricted_prefix.clone(),
                rel_allow: config.rewrite.rel_allow.clone(),
                rel_deny: config.rewrite.rel_deny.clone(),
                authoring_hostname: config.site.authoring_hostname.clone(),
                public_hostname: config.site.public_hostname.clone(),
            },
        );

        let policy = RedownloadPolicy::new(&config.policy, Arc::new(index));
        let cache = CacheStore::new(store.clone(), Arc::clone(&fetcher), policy);

        // Entry routes go through the same normalization as discovered links
        let entries: Vec<String> = config
            .crawler
            .entry_routes
            .iter()
            .map(|entry| {
                normalizer
                    .normalize("/", entry)
                    .map(|link| link.path)
                    .unwrap_or_else(|| entry.clone())
            })
            .collect();
        let frontier = Frontier::new(entries.iter().map(|path| Route::seed(path)));

        let engine = Engine {
            frontier,
            context: RunContext::new(),
            cache,
            extractor: LinkExtractor::new(patterns),
            rewriter,
            normalizer,
            strict: config.crawler.strict,
            processed: AtomicUsize::new(0),
            started: Instant::now(),
        };

        Ok(Self {
            config: Arc::new(config),
            store,
            fetcher,
            engine: Arc::new(engine),
            entries,
        })
    }

    /// Runs the mirror to completion and publishes the new generation
    ///
    /// Nothing is published when the run aborts: on a fatal condition, on
    /// a route failure in strict mode, or when a worker panics.
    pub async fn run(self) -> Result<RunSummary> {
        let started = Instant::now();
        tracing::info!(
            "Mirroring {} into {} ({:?} mode, {} workers)",
            self.config.site.origin,
            self.config.output.root,
            self.config.output.mode,
            self.config.crawler.workers
        );

        for entry in &self.entries {
            if let Some(route) = self.engine.frontier.take(entry) {
                if let Err(e) = self.engine.handle(route).await {
                    tracing::error!("Aborting run without publishing: {}", e);
                    return Err(e);
                }
            }
        }

        let mut workers = JoinSet::new();
        for id in 0..self.config.crawler.workers {
            let engine = Arc::clone(&self.engine);
            workers.spawn(async move { engine.work(id).await });
        }

        while let Some(joined) = workers.join_next().await {
            let outcome = joined
                .map_err(|e| MirrorError::WorkerPanic(e.to_string()))
                .and_then(|result| result);
            if let Err(e) = outcome {
                self.engine.frontier.close();
                workers.abort_all();
                tracing::error!("Aborting run without publishing: {}", e);
                return Err(e);
            }
        }

        let removed: Vec<String> = self
            .store
            .live_paths()?
            .into_iter()
            .filter(|path| !file_path_for(self.store.staging_root(), path).exists())
            .collect();
        for path in &removed {
            tracing::debug!("{} is not part of the new generation", path);
        }

        self.store.publish()?;
        tracing::info!(
            "Published new generation at {}",
            self.store.live_root().display()
        );

        let context = &self.engine.context;
        let summary = RunSummary {
            fetched: context.fetch_count(),
            reused: context.reuse_count(),
            visited: self.engine.frontier.visited_count(),
            requests: self.fetcher.request_count(),
            cascade_fired: context.cascade_fired(),
            failures: context.failures(),
            removed,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            "Mirror completed: {} fetched, {} reused, {} failed in {:?}",
            summary.fetched,
            summary.reused,
            summary.failures.len(),
            summary.elapsed
        );
        Ok(summary)
    }
}

impl Engine {
    /// Processes routes until the frontier is drained
    async fn work(&self, id: u32) -> Result<()> {
        tracing::debug!("Worker {} started", id);
        while let Some(route) = self.frontier.next().await {
            self.handle(route).await?;
        }
        tracing::debug!("Worker {} finished", id);
        Ok(())
    }

    /// Processes one route and records the outcome
    ///
    /// A failure is recorded and swallowed unless it is fatal or the run is
    /// strict; either way the route stays visited.
    async fn handle(&self, route: Route) -> Result<()> {
        let outcome = self.process(&route).await;
        self.frontier.complete();
        self.report_progress();

        match outcome {
            Ok(state) => {
                tracing::debug!("{} {}", route.path, state);
                self.context.record(state);
                Ok(())
            }
            Err(e) => {
                self.context.record(RouteState::Failed);
                self.context.record_failure(RouteFailure {
                    path: route.path.clone(),
                    original: route.original.clone(),
                    referrer: route.referrer.clone(),
                    error: e.to_string(),
                });

                if e.is_fatal() || self.strict {
                    return Err(MirrorError::RouteFailed {
                        route: route.to_string(),
                        source: Box::new(e),
                    });
                }
                tracing::warn!("Failed to process {}: {}", route, e);
                Ok(())
            }
        }
    }

    async fn process(&self, route: &Route) -> Result<RouteState> {
        match self.cache.get(route, &self.context).await? {
            CacheLookup::Reused { bytes } => {
                // Already rewritten in an earlier run; only its links are needed
                if let Some(text) = self.as_text(route, &bytes) {
                    self.discover(route, text);
                }
                Ok(RouteState::Reused)
            }
            CacheLookup::Fetched { bytes } => {
                let rendered = self.render(route, bytes)?;
                self.cache.put(route, &rendered, true)?;
                Ok(RouteState::Fetched)
            }
            CacheLookup::Probe {
                bytes,
                previous,
                guard,
            } => {
                let rendered = self.render(route, bytes)?;
                let changed = rendered != previous;
                guard.resolve(changed);

                if changed {
                    tracing::info!(
                        "Layout change detected at {}; every cached document will be refetched",
                        route.path
                    );
                    self.cache.put(route, &rendered, true)?;
                    Ok(RouteState::ProbeChanged)
                } else {
                    self.cache.put(route, &previous, false)?;
                    Ok(RouteState::ProbeUnchanged)
                }
            }
        }
    }

    /// Extracts links from and rewrites freshly fetched bytes
    ///
    /// Scripts and undecodable resources are stored as they came.
    fn render(&self, route: &Route, bytes: Vec<u8>) -> Result<Vec<u8>> {
        if route.kind() == ResourceKind::Script {
            return Ok(bytes);
        }
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::trace!("{} is not text; storing it as is", route.path);
                return Ok(e.into_bytes());
            }
        };

        self.discover(route, &text);
        Ok(self.rewriter.rewrite(&text, &route.path)?.into_bytes())
    }

    fn as_text<'b>(&self, route: &Route, bytes: &'b [u8]) -> Option<&'b str> {
        if route.kind() == ResourceKind::Script {
            return None;
        }
        std::str::from_utf8(bytes).ok()
    }

    fn discover(&self, route: &Route, text: &str) {
        let mut added = 0;
        for found in self
            .extractor
            .discover_routes(text, &route.path, &self.normalizer)
        {
            if self.frontier.add(found) {
                added += 1;
            }
        }
        if added > 0 {
            tracing::trace!("{} new routes from {}", added, route.path);
        }
    }

    fn report_progress(&self) {
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if processed % PROGRESS_INTERVAL == 0 {
            let rate = processed as f64 / self.started.elapsed().as_secs_f64();
            tracing::info!(
                "Progress: {} routes processed, {} queued, {:.2} routes/sec",
                processed,
                self.frontier.pending_count(),
                rate
            );
        }
    }
}
