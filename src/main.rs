//! Nanocrawl main entry point
//!
//! This is the command-line interface for the nanocrawl crawl engine. It crawls the
//! configured seeds and stays on the sites they belong to.

use anyhow::Context;
use clap::Parser;
use nanocrawl::config::{load_config_with_hash, Config};
use nanocrawl::crawler::{CrawlController, Page, ParseData, Visitor};
use nanocrawl::state::{PROCESSED_PAGES, SCHEDULED_PAGES};
use nanocrawl::WebUrl;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// File extensions that are never worth fetching for a text crawl
const SKIPPED_EXTENSIONS: &[&str] = &[
    "css", "js", "bmp", "gif", "jpg", "jpeg", "png", "tif", "tiff", "mid", "mp2", "mp3", "mp4",
    "wav", "avi", "mov", "mpeg", "ram", "m4v", "pdf", "rm", "smil", "wmv", "swf", "wma", "zip",
    "rar", "gz", "ico", "svg",
];

/// Nanocrawl: a polite, resumable web crawler
///
/// Nanocrawl crawls breadth-first from the configured seeds while respecting
/// robots.txt and a global politeness delay, and never fetches a URL twice.
#[derive(Parser, Debug)]
#[command(name = "nanocrawl")]
#[command(version)]
#[command(about = "A polite, resumable web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Override the number of concurrent crawlers
    #[arg(long, value_name = "N")]
    crawlers: Option<usize>,

    /// Continue the crawl left in the storage folder instead of starting over
    #[arg(long)]
    resume: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if let Some(crawlers) = cli.crawlers {
        config.crawler.number_of_crawlers = crawlers;
    }
    if cli.resume {
        config.crawler.resumable_crawling = true;
    }

    if cli.dry_run {
        print_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("nanocrawl=info,warn"),
            1 => EnvFilter::new("nanocrawl=debug,info"),
            2 => EnvFilter::new("nanocrawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn print_dry_run(config: &Config) {
    let crawler = &config.crawler;
    println!("=== Nanocrawl Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Storage folder: {}", crawler.crawl_storage_folder.display());
    println!("  Crawlers: {}", crawler.number_of_crawlers);
    println!("  Max depth: {}", crawler.max_depth_of_crawling);
    println!("  Max pages: {}", crawler.max_pages_to_fetch);
    println!("  Politeness delay: {}ms", crawler.politeness_delay_ms);
    println!("  Resumable: {}", crawler.resumable_crawling);
    println!("  TLD suffixes loaded: {}", config.tld_list.len());

    println!("\nFetcher:");
    println!("  User agent: {}", config.fetcher.user_agent_string);
    println!("  Max download size: {} bytes", config.fetcher.max_download_size_bytes);
    if let Some(proxy) = &config.proxy {
        println!("  Proxy: {}:{}", proxy.host, proxy.port);
    }

    println!("\nRobots:");
    println!("  Enabled: {}", config.robots.enabled);
    println!("  Agent name: {}", config.robots.user_agent_name);

    println!("\nSeeds ({}):", crawler.seeds.len());
    for seed in &crawler.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Runs a crawl until it completes or Ctrl-C is pressed
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    if config.crawler.seeds.is_empty() {
        anyhow::bail!("No seeds configured; add `seeds` to the [crawler] section");
    }

    let seeds = config.crawler.seeds.clone();
    let site_prefixes: Arc<Vec<String>> =
        Arc::new(seeds.iter().map(|s| s.to_lowercase()).collect());
    let visited = Arc::new(AtomicU64::new(0));

    let controller = Arc::new(CrawlController::new(config).context("Failed to set up the crawl")?);
    let visitors: Vec<Arc<dyn Visitor>> = (0..controller.config().crawler.number_of_crawlers)
        .map(|_| {
            Arc::new(SameSiteVisitor {
                site_prefixes: site_prefixes.clone(),
                visited: visited.clone(),
            }) as Arc<dyn Visitor>
        })
        .collect();

    tracing::info!("Starting crawl from {} seeds", seeds.len());
    controller.start_crawling(&seeds, visitors).await?;

    tokio::select! {
        _ = controller.wait_until_finish() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, finishing the current pages...");
            controller.shutdown();
            controller.wait_until_finish().await;
        }
    }

    let stats = controller.statistics();
    println!("\n=== Crawl Statistics ===");
    println!("  Scheduled pages: {}", stats.value(SCHEDULED_PAGES).await);
    println!("  Processed pages: {}", stats.value(PROCESSED_PAGES).await);
    println!("  Visited pages:   {}", visited.load(Ordering::Relaxed));

    Ok(())
}

/// Follows links that stay under one of the seed URLs and skips binary files
struct SameSiteVisitor {
    site_prefixes: Arc<Vec<String>>,
    visited: Arc<AtomicU64>,
}

impl Visitor for SameSiteVisitor {
    fn should_visit(&self, url: &WebUrl) -> bool {
        let href = url.url().to_lowercase();
        let skipped = href
            .rsplit_once('.')
            .map(|(_, ext)| SKIPPED_EXTENSIONS.contains(&ext))
            .unwrap_or(false);
        !skipped && self.site_prefixes.iter().any(|p| href.starts_with(p.as_str()))
    }

    fn visit(&self, page: &Page) {
        self.visited.fetch_add(1, Ordering::Relaxed);
        let web_url = &page.web_url;
        tracing::info!(
            "Visited {} (doc id {}, depth {}, domain '{}', sub-domain '{}')",
            web_url,
            web_url.doc_id,
            web_url.depth,
            web_url.domain(),
            web_url.sub_domain()
        );

        if let ParseData::Html(data) = &page.parse_data {
            tracing::debug!(
                "  text length {}, html length {}, {} outgoing links, parent {:?}, anchor {:?}",
                data.text.len(),
                data.html.len(),
                page.outgoing_urls.len(),
                web_url.parent_url,
                web_url.anchor
            );
        }
    }

    fn on_before_exit(&self) {
        tracing::debug!("Visitor exiting after {} pages", self.visited.load(Ordering::Relaxed));
    }
}
