//! Crawl worker
//!
//! A worker loops over the frontier: take one item, run it through the per-page
//! state machine, mark it processed, repeat. It leaves the loop only when the
//! frontier is finished. Failures concerning one page are logged, reported to the
//! visitor where a hook exists, and never end the loop.

use crate::config::Config;
use crate::crawler::doc_ids::DocumentIdRegistry;
use crate::crawler::fetcher::{FetchResult, FetchStatus, PoliteFetcher};
use crate::crawler::frontier::CrawlFrontier;
use crate::crawler::parser::{ExtractedLink, ParseData, Parser};
use crate::crawler::visitor::{Page, Visitor};
use crate::robots::RobotsDirectiveCache;
use crate::state::WorkerState;
use crate::url::{WebUrl, ALREADY_SEEN_DEPTH, UNASSIGNED_DOC_ID};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Collaborators shared by every worker of one crawl
pub struct CrawlContext {
    pub config: Arc<Config>,
    pub frontier: Arc<CrawlFrontier>,
    pub doc_ids: Arc<DocumentIdRegistry>,
    pub fetcher: Arc<PoliteFetcher>,
    pub robots: Arc<RobotsDirectiveCache>,
}

/// Liveness and progress of one worker, as seen by the controller's monitor
#[derive(Debug)]
pub struct WorkerStatus {
    id: usize,
    waiting: AtomicBool,
    alive: AtomicBool,
    state: Mutex<WorkerState>,
}

impl WorkerStatus {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            waiting: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            state: Mutex::new(WorkerState::Idle),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// True while the worker is blocked in the frontier waiting for work
    pub fn is_waiting_for_new_urls(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// A worker is working when it is alive and not waiting for new URLs
    pub fn is_working(&self) -> bool {
        self.is_alive() && !self.is_waiting_for_new_urls()
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.lock().await
    }

    fn set_waiting(&self, waiting: bool) {
        self.waiting.store(waiting, Ordering::SeqCst);
    }

    fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// One concurrent crawl loop with its own visitor
pub struct CrawlWorker {
    id: usize,
    context: Arc<CrawlContext>,
    visitor: Arc<dyn Visitor>,
    parser: Parser,
    status: Arc<WorkerStatus>,
}

impl CrawlWorker {
    pub fn new(id: usize, context: Arc<CrawlContext>, visitor: Arc<dyn Visitor>) -> Self {
        let parser = Parser::new(
            context.config.crawler.include_binary_content,
            context.config.crawler.max_outgoing_links_per_page,
        );
        Self {
            id,
            context,
            visitor,
            parser,
            status: Arc::new(WorkerStatus::new(id)),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn status(&self) -> Arc<WorkerStatus> {
        self.status.clone()
    }

    /// Runs until the frontier is finished
    pub async fn run(self) {
        tracing::debug!("Worker {} started", self.id);
        self.visitor.on_start();

        loop {
            self.status.set_waiting(true);
            let items = self.context.frontier.take(1).await;
            self.status.set_waiting(false);

            if items.is_empty() {
                if self.context.frontier.is_finished() {
                    break;
                }
                continue;
            }

            for mut item in items {
                self.process_page(&mut item).await;
                self.context.frontier.set_processed(&item).await;
            }
        }

        self.transition(WorkerState::Finished).await;
        self.status.mark_dead();
        tracing::debug!("Worker {} finished", self.id);
    }

    /// Runs one item through the per-page state machine
    pub async fn process_page(&self, item: &mut WebUrl) {
        self.transition(WorkerState::FetchingHeader).await;
        let mut result = self.context.fetcher.fetch_header(item).await;
        self.visitor.handle_page_status_code(
            item,
            result.status.code(),
            &result.status.description(),
        );

        if !result.status.is_ok() {
            self.handle_failed_header(item, &mut result).await;
            self.transition(WorkerState::Idle).await;
            return;
        }

        if !self.reconcile_fetched_url(item, &result).await {
            self.transition(WorkerState::Idle).await;
            return;
        }

        self.transition(WorkerState::FetchingBody).await;
        let content = match self.context.fetcher.fetch_content(&mut result).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to fetch content of {}: {}", item, e);
                self.visitor.on_content_fetch_error(item);
                self.transition(WorkerState::Idle).await;
                return;
            }
        };

        self.transition(WorkerState::Parsing).await;
        let parse_data = match self.parser.parse(&content, item.url()) {
            Ok(parse_data) => parse_data,
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", item, e);
                self.visitor.on_parse_error(item);
                self.transition(WorkerState::Idle).await;
                return;
            }
        };

        let outgoing_urls = match &parse_data {
            ParseData::Html(data) => {
                self.transition(WorkerState::SchedulingLinks).await;
                self.schedule_links(item, &data.links).await
            }
            _ => Vec::new(),
        };

        self.transition(WorkerState::Visiting).await;
        let page = Page {
            web_url: item.clone(),
            status_code: result.status.code(),
            headers: std::mem::take(&mut result.headers),
            content,
            parse_data,
            outgoing_urls,
        };
        self.visitor.visit(&page);

        self.transition(WorkerState::Idle).await;
    }

    /// Handles redirects, oversized pages and error statuses; the item is abandoned
    async fn handle_failed_header(&self, item: &WebUrl, result: &mut FetchResult) {
        match result.status {
            status if status.is_redirect() => {
                self.transition(WorkerState::ValidatingRedirect).await;
                if !self.context.config.crawler.follow_redirects {
                    tracing::debug!("Not following redirect from {}", item);
                    return;
                }
                match result.moved_to_url.take() {
                    Some(target) => self.schedule_redirect(item, target).await,
                    None => tracing::debug!("Redirect from {} has no usable location", item),
                }
            }
            FetchStatus::PageTooBig => {
                tracing::info!("Skipping a page bigger than the allowed size: {}", item);
            }
            status => {
                tracing::debug!("Abandoning {}: {}", item, status);
            }
        }
    }

    /// Schedules a redirect target as its own work item
    ///
    /// The target inherits the original item's parent, depth, anchor and priority.
    async fn schedule_redirect(&self, item: &WebUrl, target: String) {
        let doc_ids = &self.context.doc_ids;
        if doc_ids.is_seen(&target).await {
            tracing::debug!("Redirect target {} of {} already seen", target, item);
            return;
        }

        let mut redirected = WebUrl::new(target, &self.context.config.tld_list);
        redirected.parent_doc_id = item.parent_doc_id;
        redirected.parent_url = item.parent_url.clone();
        redirected.depth = item.depth;
        redirected.anchor = item.anchor.clone();
        redirected.priority = item.priority;

        if !self.admits(&redirected).await {
            return;
        }

        match doc_ids.claim(redirected.url()).await {
            Ok(Some(doc_id)) => {
                redirected.doc_id = doc_id;
                if self.context.frontier.schedule(&redirected).await {
                    tracing::debug!("Scheduled redirect {} -> {}", item, redirected);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Failed to register redirect target {}: {}", redirected, e),
        }
    }

    /// Adopts the URL the server actually served, if it differs from the requested one
    ///
    /// # Returns
    ///
    /// * `true` - Continue with the body
    /// * `false` - The effective URL was already registered on its own; abandon
    async fn reconcile_fetched_url(&self, item: &mut WebUrl, result: &FetchResult) -> bool {
        let Some(fetched) = result.fetched_url.as_deref() else {
            return true;
        };
        if fetched == item.url() {
            return true;
        }

        self.transition(WorkerState::ValidatingRedirect).await;
        let doc_ids = &self.context.doc_ids;
        if doc_ids.is_seen(fetched).await {
            tracing::debug!("{} was served as {}, which is already seen", item, fetched);
            return false;
        }

        match doc_ids.assign_if_absent(fetched).await {
            Ok(doc_id) => {
                item.set_url(fetched, &self.context.config.tld_list);
                item.doc_id = doc_id;
                true
            }
            Err(e) => {
                tracing::error!("Failed to register {}: {}", fetched, e);
                false
            }
        }
    }

    /// Attributes links to their parent and admits the unseen ones into the frontier
    ///
    /// # Returns
    ///
    /// Every link as a work item; links that were already registered carry
    /// `ALREADY_SEEN_DEPTH` and their existing id
    async fn schedule_links(&self, parent: &WebUrl, links: &[ExtractedLink]) -> Vec<WebUrl> {
        let max_depth = self.context.config.crawler.max_depth_of_crawling;
        let within_depth = max_depth == -1 || i32::from(parent.depth) < max_depth;
        let doc_ids = &self.context.doc_ids;

        let mut outgoing = Vec::with_capacity(links.len());
        let mut to_schedule = Vec::new();

        for link in links {
            let mut web_url = WebUrl::new(link.url.clone(), &self.context.config.tld_list);
            web_url.anchor = link.anchor.clone();
            web_url.parent_doc_id = parent.doc_id;
            web_url.parent_url = Some(parent.url().to_string());

            if let Some(existing) = doc_ids.lookup(&link.url).await {
                web_url.depth = ALREADY_SEEN_DEPTH;
                web_url.doc_id = existing;
                outgoing.push(web_url);
                continue;
            }

            web_url.doc_id = UNASSIGNED_DOC_ID;
            web_url.depth = parent.depth.saturating_add(1);

            if within_depth && self.admits(&web_url).await {
                match doc_ids.claim(web_url.url()).await {
                    Ok(Some(doc_id)) => {
                        web_url.doc_id = doc_id;
                        web_url.priority = self.visitor.priority(&web_url);
                        to_schedule.push(web_url.clone());
                    }
                    Ok(None) => {
                        // Another worker registered it between lookup and claim
                        web_url.depth = ALREADY_SEEN_DEPTH;
                        web_url.doc_id = doc_ids.lookup(&link.url).await.unwrap_or(UNASSIGNED_DOC_ID);
                    }
                    Err(e) => tracing::error!("Failed to register {}: {}", web_url, e),
                }
            }

            outgoing.push(web_url);
        }

        if !to_schedule.is_empty() {
            let admitted = self.context.frontier.schedule_batch(&to_schedule).await;
            tracing::debug!(
                "Worker {} scheduled {} of {} links from {}",
                self.id,
                admitted,
                links.len(),
                parent
            );
        }

        outgoing
    }

    /// Scheme, visitor and robots admission checks for a candidate URL
    async fn admits(&self, candidate: &WebUrl) -> bool {
        if candidate.is_https() && !self.context.config.crawler.include_https_pages {
            return false;
        }
        if !self.visitor.should_visit(candidate) {
            return false;
        }
        if !self.context.robots.is_allowed(candidate).await {
            tracing::debug!("robots.txt disallows {}", candidate);
            return false;
        }
        true
    }

    async fn transition(&self, next: WorkerState) {
        let mut state = self.status.state.lock().await;
        if !state.can_transition_to(next) {
            tracing::warn!(
                "Worker {} moved from {} to {} out of order",
                self.id,
                *state,
                next
            );
        }
        *state = next;
    }
}
