//! Top-level crawl run: forum index walk, per-thread scraping, record
//! emission. Per-thread failures are isolated; only an unreachable forum
//! index aborts the run.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::extract::SelectorSet;
use crate::fetch::FetchClient;
use crate::model::ForumRef;
use crate::pagination::{self, ForumWalkLimits};
use crate::sink::RecordSink;
use crate::thread::ThreadScraper;
use crate::users::UserResolver;

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrawlStats {
    pub threads_scraped: usize,
    pub threads_failed: usize,
    pub posts: usize,
    pub interactions: usize,
    pub users: usize,
}

/// Crawl the configured forum and stream every record into `sink`.
///
/// # Errors
///
/// Returns an error when configuration is unusable or the forum index
/// itself cannot be walked.
pub async fn run_crawl<S: RecordSink>(config: &Config, sink: &mut S) -> Result<CrawlStats> {
    config.validate().context("invalid configuration")?;

    let base = Url::parse(&config.base_url).context("invalid base URL")?;
    let selectors = Arc::new(SelectorSet::compile(&config.selectors)?);
    let client = Arc::new(FetchClient::new(config).context("failed to build HTTP client")?);
    let run_started = pagination::run_timestamp();
    let resolver = Arc::new(UserResolver::new(Arc::clone(&client), run_started));

    let forum = ForumRef {
        url: config.forum_url.clone(),
    };
    let threads = pagination::collect_thread_urls(
        &client,
        &selectors,
        &base,
        &forum,
        ForumWalkLimits {
            max_pages: config.max_forum_pages,
            thread_limit: config.thread_limit,
        },
    )
    .await
    .context("failed to walk the forum index")?;

    let scraper = ThreadScraper::new(
        Arc::clone(&client),
        Arc::clone(&resolver),
        Arc::clone(&selectors),
        base,
        run_started,
    );

    let mut stats = CrawlStats::default();

    for (i, thread) in threads.iter().enumerate() {
        info!(
            thread = i + 1,
            total = threads.len(),
            url = %thread.url,
            "scraping thread"
        );

        let scrape = match scraper
            .scrape_thread(&thread.url, Some(&forum.url), config.max_thread_pages)
            .await
        {
            Ok(scrape) => scrape,
            Err(e) => {
                warn!(url = %thread.url, error = %e, "thread failed, continuing with the next one");
                stats.threads_failed += 1;
                continue;
            }
        };

        for post in &scrape.posts {
            sink.write_post(post)?;
        }
        for interaction in &scrape.interactions {
            sink.write_interaction(interaction)?;
        }
        sink.write_thread(&scrape.summary)?;

        stats.threads_scraped += 1;
        stats.posts += scrape.posts.len();
        stats.interactions += scrape.interactions.len();
    }

    for user in resolver.export_users().await {
        sink.write_user(&user)?;
        stats.users += 1;
    }
    sink.flush()?;

    info!(
        threads = stats.threads_scraped,
        failed = stats.threads_failed,
        posts = stats.posts,
        interactions = stats.interactions,
        users = stats.users,
        "crawl finished"
    );

    Ok(stats)
}
