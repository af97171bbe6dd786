//! Crawl controller
//!
//! Owns the crawl's shared state, seeds the frontier, spawns one task per worker and
//! runs the monitor that decides when the crawl is over. There is no global task
//! counter, so completion is detected by polling: no live worker is busy, the
//! frontier is empty, and both still hold after a second look.

use crate::config::{validate, Config};
use crate::crawler::doc_ids::DocumentIdRegistry;
use crate::crawler::fetcher::PoliteFetcher;
use crate::crawler::frontier::CrawlFrontier;
use crate::crawler::visitor::Visitor;
use crate::crawler::worker::{CrawlContext, CrawlWorker, WorkerStatus};
use crate::robots::RobotsDirectiveCache;
use crate::state::CrawlStatistics;
use crate::storage::open_store;
use crate::url::{canonicalize, WebUrl};
use crate::{ConfigError, CrawlError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;

/// File name of the document id store inside the frontier folder
pub const DOC_IDS_DB: &str = "doc_ids.db";

/// File name of the queue store inside the frontier folder
pub const QUEUE_DB: &str = "queue.db";

struct RunningWorker {
    status: Arc<WorkerStatus>,
    visitor: Arc<dyn Visitor>,
    handle: JoinHandle<()>,
}

impl RunningWorker {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished() && self.status.is_alive()
    }
}

#[derive(Default)]
struct RunState {
    started: bool,
    workers: Vec<RunningWorker>,
}

/// Entry point of a crawl
///
/// A controller runs one crawl. Its stores and fetcher are closed when the crawl
/// finishes, so starting it a second time fails with `AlreadyRunning`.
pub struct CrawlController {
    context: Arc<CrawlContext>,
    statistics: Arc<CrawlStatistics>,
    run: Mutex<RunState>,
    shutting_down: AtomicBool,
    wake_monitor: Notify,
    finished: watch::Sender<bool>,
}

impl CrawlController {
    /// Validates the configuration and opens the crawl's durable state
    ///
    /// The frontier folder under `crawl-storage-folder` is created if missing. Unless
    /// `resumable-crawling` is set, whatever a previous run left there is deleted
    /// first.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlController)` - Ready to be seeded and started
    /// * `Err(CrawlError)` - Invalid configuration, unusable storage folder or
    ///   HTTP client setup failure
    pub fn new(config: Config) -> Result<Self, CrawlError> {
        validate(&config)?;

        let crawler = &config.crawler;
        let storage_folder = &crawler.crawl_storage_folder;
        std::fs::create_dir_all(storage_folder).map_err(|e| {
            ConfigError::Validation(format!(
                "Couldn't create the storage folder {}: {}",
                storage_folder.display(),
                e
            ))
        })?;

        let frontier_folder = crawler.frontier_folder();
        if frontier_folder.exists() && !crawler.resumable_crawling {
            tracing::info!(
                "Deleting content of {} from a previous crawl",
                frontier_folder.display()
            );
            std::fs::remove_dir_all(&frontier_folder)?;
        }
        std::fs::create_dir_all(&frontier_folder)?;

        let statistics = Arc::new(CrawlStatistics::new());
        let doc_ids = DocumentIdRegistry::new(Box::new(open_store(
            &frontier_folder.join(DOC_IDS_DB),
        )?))?;
        let frontier = CrawlFrontier::new(
            Box::new(open_store(&frontier_folder.join(QUEUE_DB))?),
            crawler.max_pages_to_fetch,
            statistics.clone(),
            crawler.resumable_crawling,
        )?;

        let fetcher = Arc::new(PoliteFetcher::new(&config)?);
        let robots = RobotsDirectiveCache::new(
            config.robots.clone(),
            fetcher.clone(),
            config.tld_list.clone(),
        );

        let context = Arc::new(CrawlContext {
            config: Arc::new(config),
            frontier: Arc::new(frontier),
            doc_ids: Arc::new(doc_ids),
            fetcher,
            robots: Arc::new(robots),
        });

        let (finished, _) = watch::channel(false);
        Ok(Self {
            context,
            statistics,
            run: Mutex::new(RunState::default()),
            shutting_down: AtomicBool::new(false),
            wake_monitor: Notify::new(),
            finished,
        })
    }

    /// Adds a seed URL at depth 0
    ///
    /// Without an explicit id the URL gets the next free id, and a URL that is
    /// already registered is skipped. With an explicit id the mapping is reserved
    /// first. A seed robots.txt disallows is skipped as well.
    ///
    /// # Arguments
    ///
    /// * `url` - Seed URL; it is canonicalized before use
    /// * `doc_id` - Id the caller wants this URL to have
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The seed was scheduled or deliberately skipped
    /// * `Err(CrawlError::IdConflict)` - The explicit id clashes with the registry
    /// * `Err(CrawlError)` - The URL is unusable or the registry failed
    pub async fn add_seed(&self, url: &str, doc_id: Option<i32>) -> Result<(), CrawlError> {
        let canonical = canonicalize(url, None).map_err(|e| {
            tracing::error!("Invalid seed URL {}: {}", url, e);
            e
        })?;
        let doc_ids = &self.context.doc_ids;

        let doc_id = match doc_id {
            Some(doc_id) => {
                doc_ids.reserve(&canonical, doc_id).await?;
                doc_id
            }
            None => {
                if doc_ids.is_seen(&canonical).await {
                    tracing::debug!("Seed {} is already seen, skipping", canonical);
                    return Ok(());
                }
                doc_ids.assign_if_absent(&canonical).await?
            }
        };

        let mut web_url = WebUrl::new(canonical, &self.context.config.tld_list);
        web_url.doc_id = doc_id;
        web_url.depth = 0;

        if !self.context.robots.is_allowed(&web_url).await {
            tracing::info!("robots.txt does not allow the seed {}", web_url);
            return Ok(());
        }

        self.context.frontier.schedule(&web_url).await;
        Ok(())
    }

    /// Registers a URL under a known id without scheduling it
    ///
    /// Used to tell a resumed or incremental crawl about pages it must not fetch.
    pub async fn add_seen_url(&self, url: &str, doc_id: i32) -> Result<(), CrawlError> {
        let canonical = canonicalize(url, None)?;
        self.context.doc_ids.reserve(&canonical, doc_id).await
    }

    /// Spawns one worker per visitor and the completion monitor
    ///
    /// Returns as soon as everything is running; use [`wait_until_finish`] to block.
    ///
    /// [`wait_until_finish`]: CrawlController::wait_until_finish
    pub async fn start(self: &Arc<Self>, visitors: Vec<Arc<dyn Visitor>>) -> Result<(), CrawlError> {
        if visitors.is_empty() {
            return Err(ConfigError::Validation("At least one visitor is required".to_string()).into());
        }

        let mut run = self.run.lock().await;
        if run.started {
            return Err(CrawlError::AlreadyRunning);
        }
        run.started = true;

        for (id, visitor) in visitors.into_iter().enumerate() {
            let worker = CrawlWorker::new(id, self.context.clone(), visitor.clone());
            let status = worker.status();
            let handle = tokio::spawn(worker.run());
            run.workers.push(RunningWorker {
                status,
                visitor,
                handle,
            });
            tracing::info!("Crawler {} started", id);
        }
        drop(run);

        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.monitor().await });
        Ok(())
    }

    /// Starts `number-of-crawlers` workers, each with a visitor built by `factory`
    pub async fn start_with<F>(self: &Arc<Self>, factory: F) -> Result<(), CrawlError>
    where
        F: Fn(usize) -> Arc<dyn Visitor>,
    {
        let count = self.context.config.crawler.number_of_crawlers;
        self.start((0..count).map(factory).collect()).await
    }

    /// Seeds the frontier with `seeds`, then starts the workers
    pub async fn start_crawling(
        self: &Arc<Self>,
        seeds: &[String],
        visitors: Vec<Arc<dyn Visitor>>,
    ) -> Result<(), CrawlError> {
        for seed in seeds {
            self.add_seed(seed, None).await?;
        }
        self.start(visitors).await
    }

    /// Blocks until the monitor has declared the crawl finished and closed everything
    pub async fn wait_until_finish(&self) {
        let mut finished = self.finished.subscribe();
        while !*finished.borrow_and_update() {
            if finished.changed().await.is_err() {
                return;
            }
        }
    }

    /// Asks the crawl to stop
    ///
    /// Workers finish the item in hand and exit; the monitor then runs the normal
    /// completion steps without waiting for the queue to drain.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down...");
        self.shutting_down.store(true, Ordering::SeqCst);
        self.context.frontier.finish();
        self.wake_monitor.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    pub fn frontier(&self) -> &Arc<CrawlFrontier> {
        &self.context.frontier
    }

    pub fn doc_ids(&self) -> &Arc<DocumentIdRegistry> {
        &self.context.doc_ids
    }

    pub fn fetcher(&self) -> &Arc<PoliteFetcher> {
        &self.context.fetcher
    }

    pub fn robots(&self) -> &Arc<RobotsDirectiveCache> {
        &self.context.robots
    }

    pub fn statistics(&self) -> &Arc<CrawlStatistics> {
        &self.statistics
    }

    /// Polls the workers until the crawl is complete, then tears it down
    async fn monitor(self: Arc<Self>) {
        let interval = self.context.config.crawler.monitor_interval();
        let frontier = &self.context.frontier;

        loop {
            self.pause(interval).await;
            if self.someone_is_working(true).await {
                continue;
            }

            tracing::info!("It looks like no worker is working, waiting to make sure...");
            self.pause(interval).await;
            if self.someone_is_working(false).await {
                continue;
            }

            if !self.is_shutting_down() {
                if frontier.queue_length().await > 0 {
                    continue;
                }
                tracing::info!(
                    "No worker is working and no more URLs are queued, waiting to make sure..."
                );
                self.pause(interval).await;
                if frontier.queue_length().await > 0 {
                    continue;
                }
            }

            break;
        }

        self.finish_crawl().await;
    }

    async fn someone_is_working(&self, report_dead: bool) -> bool {
        let run = self.run.lock().await;
        let mut working = false;
        for worker in &run.workers {
            if !worker.is_alive() {
                if report_dead && !self.is_shutting_down() {
                    tracing::info!("Worker {} is dead", worker.status.id());
                }
            } else if !worker.status.is_waiting_for_new_urls() {
                working = true;
            }
        }
        working
    }

    async fn finish_crawl(&self) {
        tracing::info!("All of the crawlers are stopped. Finishing the process...");
        self.context.frontier.finish();

        {
            let run = self.run.lock().await;
            for worker in &run.workers {
                worker.visitor.on_before_exit();
            }
        }

        let grace = self.context.config.crawler.cleanup_grace();
        tracing::info!("Waiting {:?} before final clean up...", grace);
        tokio::time::sleep(grace).await;

        if let Err(e) = self.context.frontier.close().await {
            tracing::error!("Failed to close the frontier: {}", e);
        }
        if let Err(e) = self.context.doc_ids.close().await {
            tracing::error!("Failed to close the document id registry: {}", e);
        }
        self.context.fetcher.shutdown();

        tracing::info!(
            "Crawl finished: {} pages scheduled, {} processed",
            self.context.frontier.scheduled_pages().await,
            self.context.frontier.processed_pages().await
        );
        self.finished.send_replace(true);
    }

    /// Sleeps for one monitor interval, or less if `shutdown` is called
    async fn pause(&self, interval: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = self.wake_monitor.notified() => {}
        }
    }
}
