//! Pagination traversal: follow `rel=next` pointers until a stopping
//! condition. Two fronts share the algorithm, the forum index walk and the
//! in-thread page walk.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use url::Url;

use crate::extract::{self, SelectorSet};
use crate::fetch::{FetchClient, FetchError};
use crate::model::{ForumRef, ThreadRef};

/// Bounds for the forum index walk. `None` means unbounded; the walk then
/// terminates on next-pointer absence or a revisited page.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForumWalkLimits {
    pub max_pages: Option<u32>,
    pub thread_limit: Option<usize>,
}

/// Walk a forum section index and collect thread references in discovery
/// order, deduplicated by absolute URL.
///
/// # Errors
///
/// A fetch failure here is fatal: without the index there is nothing to
/// crawl.
pub async fn collect_thread_urls(
    client: &FetchClient,
    selectors: &SelectorSet,
    base: &Url,
    forum: &ForumRef,
    limits: ForumWalkLimits,
) -> Result<Vec<ThreadRef>, FetchError> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut threads: Vec<ThreadRef> = Vec::new();
    let mut visited_pages: HashSet<String> = HashSet::new();
    let mut page_url = forum.url.clone();
    let mut page: u32 = 0;

    loop {
        page += 1;
        if limits.max_pages.is_some_and(|max| page > max) {
            break;
        }
        if !visited_pages.insert(page_url.clone()) {
            warn!(url = %page_url, "next pointer loops back to a visited page, stopping index walk");
            break;
        }

        info!(page, url = %page_url, "fetching forum index page");
        let html = client.fetch(&page_url).await?;
        let (links, next) = extract::parse_forum_index(&html, selectors, base);

        for link in links {
            if !seen_urls.insert(link.clone()) {
                continue;
            }
            threads.push(ThreadRef::new(link));
            if limits.thread_limit.is_some_and(|limit| threads.len() >= limit) {
                info!(count = threads.len(), "thread limit reached");
                return Ok(threads);
            }
        }

        match next {
            Some(next_url) => page_url = next_url,
            None => break,
        }
    }

    info!(count = threads.len(), "collected thread URLs");
    Ok(threads)
}

/// Enumerate the page URLs of one thread, the thread URL itself first.
///
/// Every page is kept; the walk stops at `max_pages`, at next-pointer
/// absence, or when the next pointer revisits a page already listed. A
/// fetch failure past the first page ends the walk with the pages found
/// so far.
///
/// # Errors
///
/// Propagates a fetch failure on the thread URL itself; the caller treats
/// the thread as failed.
pub async fn collect_thread_pages(
    client: &FetchClient,
    selectors: &SelectorSet,
    base: &Url,
    thread_url: &str,
    max_pages: Option<u32>,
) -> Result<Vec<String>, FetchError> {
    let mut pages = vec![thread_url.to_string()];
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(thread_url.to_string());
    let mut page_url = thread_url.to_string();

    loop {
        if max_pages.is_some_and(|max| pages.len() >= max as usize) {
            break;
        }

        debug!(url = %page_url, "checking for a next thread page");
        let html = match client.fetch(&page_url).await {
            Ok(html) => html,
            Err(e) if pages.len() > 1 => {
                warn!(url = %page_url, error = %e, "page walk cut short by a fetch failure");
                break;
            }
            Err(e) => return Err(e),
        };
        let Some(next_url) = extract::find_next_url(&html, selectors, base) else {
            break;
        };
        if !visited.insert(next_url.clone()) {
            warn!(url = %next_url, "next pointer loops back to a visited page, stopping page walk");
            break;
        }
        pages.push(next_url.clone());
        page_url = next_url;
    }

    Ok(pages)
}

/// Observation timestamp shared by every record of one run.
#[must_use]
pub fn run_timestamp() -> DateTime<Utc> {
    Utc::now()
}
