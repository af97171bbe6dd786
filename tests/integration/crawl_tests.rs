//! Integration tests for the crawl engine
//!
//! These tests use wiremock to create mock HTTP servers and run complete crawls
//! through the controller, from seeding to the finished state.

use nanocrawl::config::Config;
use nanocrawl::crawler::{CrawlController, Page, Visitor};
use nanocrawl::state::{PROCESSED_PAGES, SCHEDULED_PAGES};
use nanocrawl::url::ALREADY_SEEN_DEPTH;
use nanocrawl::WebUrl;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Records everything the engine reports to its visitor
#[derive(Default)]
struct CollectingVisitor {
    pages: Mutex<Vec<Page>>,
    statuses: Mutex<Vec<(String, u16)>>,
    fetch_errors: Mutex<Vec<String>>,
    exits: AtomicUsize,
}

impl CollectingVisitor {
    fn visited_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .pages
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.url().to_string())
            .collect();
        urls.sort();
        urls
    }

    fn page(&self, url: &str) -> Option<Page> {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.url() == url)
            .cloned()
    }
}

impl Visitor for CollectingVisitor {
    fn visit(&self, page: &Page) {
        self.pages.lock().unwrap().push(page.clone());
    }

    fn handle_page_status_code(&self, url: &WebUrl, status_code: u16, _description: &str) {
        self.statuses
            .lock()
            .unwrap()
            .push((url.url().to_string(), status_code));
    }

    fn on_content_fetch_error(&self, url: &WebUrl) {
        self.fetch_errors.lock().unwrap().push(url.url().to_string());
    }

    fn on_before_exit(&self) {
        self.exits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Creates a fast test configuration rooted in `dir`
fn create_test_config(dir: &TempDir) -> Config {
    let mut config = Config::with_storage_folder(dir.path());
    config.crawler.politeness_delay_ms = 0;
    config.crawler.monitor_interval_ms = 100;
    config.crawler.cleanup_grace_ms = 10;
    config.crawler.number_of_crawlers = 2;
    config
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!(
            "<html><head><title>Test</title></head><body>{}</body></html>",
            body
        ),
        "text/html",
    )
}

async fn mount_page(server: &MockServer, page: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mount_missing_robots(server: &MockServer) {
    mount_page(server, "/robots.txt", ResponseTemplate::new(404)).await;
}

/// Seeds the controller, runs it with `visitor` on every worker and waits for the end
async fn run_crawl(
    controller: &Arc<CrawlController>,
    seeds: &[String],
    visitor: &Arc<CollectingVisitor>,
) {
    let workers = controller.config().crawler.number_of_crawlers;
    let visitors: Vec<Arc<dyn Visitor>> = (0..workers)
        .map(|_| visitor.clone() as Arc<dyn Visitor>)
        .collect();

    controller.start_crawling(seeds, visitors).await.unwrap();
    tokio::time::timeout(Duration::from_secs(30), controller.wait_until_finish())
        .await
        .expect("crawl did not finish in time");
}

#[tokio::test]
async fn test_crawl_follows_links_to_max_depth() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_missing_robots(&server).await;

    mount_page(&server, "/", html(r#"<a href="/a">feed</a><a href="/b">more</a>"#)).await;
    mount_page(&server, "/a", html(r#"<a href="/c">deeper</a>"#)).await;
    mount_page(&server, "/b", html("no links")).await;
    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(html("too deep"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.max_depth_of_crawling = 1;
    let controller = Arc::new(CrawlController::new(config).unwrap());
    let visitor = Arc::new(CollectingVisitor::default());

    run_crawl(&controller, &[format!("{}/", base)], &visitor).await;

    assert_eq!(
        visitor.visited_urls(),
        vec![
            format!("{}/", base),
            format!("{}/a", base),
            format!("{}/b", base)
        ]
    );

    let a = visitor.page(&format!("{}/a", base)).unwrap();
    assert_eq!(a.web_url.depth, 1);
    assert_eq!(a.web_url.anchor, "feed");
    assert_eq!(a.web_url.parent_url.as_deref(), Some(format!("{}/", base).as_str()));

    assert!(controller.is_finished());
    assert!(controller.frontier().is_finished());
    assert_eq!(controller.frontier().processed_pages().await, 3);
    assert_eq!(controller.statistics().value(SCHEDULED_PAGES).await, 3);
    assert_eq!(controller.statistics().value(PROCESSED_PAGES).await, 3);
    assert_eq!(visitor.exits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_redirect_is_crawled_as_its_own_item() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_missing_robots(&server).await;

    mount_page(
        &server,
        "/",
        ResponseTemplate::new(301).insert_header("Location", format!("{}/home", base).as_str()),
    )
    .await;
    mount_page(&server, "/home", html("welcome")).await;

    let dir = TempDir::new().unwrap();
    let controller = Arc::new(CrawlController::new(create_test_config(&dir)).unwrap());
    let visitor = Arc::new(CollectingVisitor::default());

    run_crawl(&controller, &[format!("{}/", base)], &visitor).await;

    assert_eq!(visitor.visited_urls(), vec![format!("{}/home", base)]);
    let home = visitor.page(&format!("{}/home", base)).unwrap();
    assert_eq!(home.web_url.depth, 0);
    assert_eq!(home.web_url.doc_id, 2);

    let statuses = visitor.statuses.lock().unwrap();
    assert!(statuses.contains(&(format!("{}/", base), 301)));
}

#[tokio::test]
async fn test_seen_url_is_not_fetched_twice() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_missing_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/a">a</a><a href="/b">b</a>"#))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/a", html(r#"<a href="/">home</a><a href="/b">b</a>"#)).await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html(r#"<a href="/a">a</a>"#))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.number_of_crawlers = 3;
    let controller = Arc::new(CrawlController::new(config).unwrap());
    let visitor = Arc::new(CollectingVisitor::default());

    run_crawl(&controller, &[format!("{}/", base)], &visitor).await;

    assert_eq!(visitor.visited_urls().len(), 3);
    assert_eq!(controller.statistics().value(SCHEDULED_PAGES).await, 3);

    let a = visitor.page(&format!("{}/a", base)).unwrap();
    let back_link = a
        .outgoing_urls
        .iter()
        .find(|u| u.url() == format!("{}/", base))
        .unwrap();
    assert_eq!(back_link.depth, ALREADY_SEEN_DEPTH);
    assert_eq!(back_link.doc_id, 1);
    assert_eq!(back_link.parent_doc_id, a.web_url.doc_id);
}

#[tokio::test]
async fn test_oversized_page_is_abandoned() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_missing_robots(&server).await;

    mount_page(&server, "/", html(&"x".repeat(8192))).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.fetcher.max_download_size_bytes = 1024;
    let controller = Arc::new(CrawlController::new(config).unwrap());
    let visitor = Arc::new(CollectingVisitor::default());

    run_crawl(&controller, &[format!("{}/", base)], &visitor).await;

    assert!(visitor.visited_urls().is_empty());
    assert!(visitor.fetch_errors.lock().unwrap().is_empty());
    assert!(visitor
        .statuses
        .lock()
        .unwrap()
        .contains(&(format!("{}/", base), 1001)));
    assert_eq!(controller.statistics().value(PROCESSED_PAGES).await, 1);
}

#[tokio::test]
async fn test_page_cap_limits_admission() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_missing_robots(&server).await;

    let links: String = (1..=5)
        .map(|i| format!(r#"<a href="/p{}">p{}</a>"#, i, i))
        .collect();
    mount_page(&server, "/", html(&links)).await;
    for i in 1..=5 {
        mount_page(&server, &format!("/p{}", i), html("leaf")).await;
    }

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.max_pages_to_fetch = 3;
    let controller = Arc::new(CrawlController::new(config).unwrap());
    let visitor = Arc::new(CollectingVisitor::default());

    run_crawl(&controller, &[format!("{}/", base)], &visitor).await;

    assert_eq!(controller.frontier().scheduled_pages().await, 3);
    assert_eq!(visitor.visited_urls().len(), 3);
    assert!(visitor.page(&format!("{}/p1", base)).is_some());
    assert!(visitor.page(&format!("{}/p2", base)).is_some());
}

#[tokio::test]
async fn test_robots_disallow_is_respected() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/robots.txt",
        ResponseTemplate::new(200).set_body_raw("User-agent: *\nDisallow: /private\n", "text/plain"),
    )
    .await;
    mount_page(
        &server,
        "/",
        html(r#"<a href="/private/secret">s</a><a href="/public">p</a>"#),
    )
    .await;
    mount_page(&server, "/public", html("ok")).await;
    Mock::given(method("GET"))
        .and(path("/private/secret"))
        .respond_with(html("secret"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let controller = Arc::new(CrawlController::new(create_test_config(&dir)).unwrap());
    let visitor = Arc::new(CollectingVisitor::default());

    run_crawl(&controller, &[format!("{}/", base)], &visitor).await;

    assert_eq!(
        visitor.visited_urls(),
        vec![format!("{}/", base), format!("{}/public", base)]
    );
    assert_eq!(controller.frontier().scheduled_pages().await, 2);
}

#[tokio::test]
async fn test_resumable_crawl_picks_up_queued_items() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_missing_robots(&server).await;
    mount_page(&server, "/left-over", html("resumed")).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.resumable_crawling = true;

    {
        let controller = CrawlController::new(config.clone()).unwrap();
        controller
            .add_seed(&format!("{}/left-over", base), None)
            .await
            .unwrap();
        assert_eq!(controller.frontier().queue_length().await, 1);
    }

    let controller = Arc::new(CrawlController::new(config).unwrap());
    assert_eq!(controller.frontier().queue_length().await, 1);
    assert_eq!(controller.doc_ids().last_doc_id().await, 1);

    let visitor = Arc::new(CollectingVisitor::default());
    run_crawl(&controller, &[], &visitor).await;

    assert_eq!(visitor.visited_urls(), vec![format!("{}/left-over", base)]);
    let page = visitor.page(&format!("{}/left-over", base)).unwrap();
    assert_eq!(page.web_url.doc_id, 1);
}

#[tokio::test]
async fn test_fresh_crawl_discards_previous_state() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.robots.enabled = false;

    {
        let controller = CrawlController::new(config.clone()).unwrap();
        controller.add_seed("http://example.test/", None).await.unwrap();
    }

    let controller = CrawlController::new(config).unwrap();
    assert_eq!(controller.frontier().queue_length().await, 0);
    assert!(!controller.doc_ids().is_seen("http://example.test/").await);
}
