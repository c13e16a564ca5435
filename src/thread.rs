//! Thread orchestration: walk a thread's pages, resolve identities,
//! assemble post records and the interaction graph.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use url::Url;

use crate::extract::{self, SelectorSet};
use crate::fetch::FetchClient;
use crate::interactions::{build_interactions, PostAuthorIndex};
use crate::model::{derive_thread_id, InteractionRecord, PostRecord, RawPostFragment, ThreadSummary};
use crate::pagination;
use crate::users::{extract_user_id, UserResolver};

/// Everything one thread produces.
#[derive(Debug)]
pub struct ThreadScrape {
    pub posts: Vec<PostRecord>,
    pub interactions: Vec<InteractionRecord>,
    pub summary: ThreadSummary,
}

/// Sequences pagination, extraction, identity resolution and graph
/// construction for one thread at a time.
pub struct ThreadScraper {
    client: Arc<FetchClient>,
    resolver: Arc<UserResolver>,
    selectors: Arc<SelectorSet>,
    base: Url,
    run_started: DateTime<Utc>,
}

impl ThreadScraper {
    #[must_use]
    pub fn new(
        client: Arc<FetchClient>,
        resolver: Arc<UserResolver>,
        selectors: Arc<SelectorSet>,
        base: Url,
        run_started: DateTime<Utc>,
    ) -> Self {
        Self {
            client,
            resolver,
            selectors,
            base,
            run_started,
        }
    }

    /// Scrape one thread end to end.
    ///
    /// Page and profile failures are logged and skipped; the affected
    /// fields stay `None`. Only failing to enumerate the thread's pages
    /// fails the thread as a whole.
    ///
    /// # Errors
    ///
    /// Returns an error when the thread's page walk cannot complete.
    pub async fn scrape_thread(
        &self,
        thread_url: &str,
        forum_url: Option<&str>,
        max_pages: Option<u32>,
    ) -> Result<ThreadScrape> {
        let thread_id = derive_thread_id(thread_url);

        let pages = pagination::collect_thread_pages(
            &self.client,
            &self.selectors,
            &self.base,
            thread_url,
            max_pages,
        )
        .await
        .with_context(|| format!("failed to enumerate pages of {thread_url}"))?;

        let mut posts: Vec<PostRecord> = Vec::new();
        let mut interactions: Vec<InteractionRecord> = Vec::new();
        let mut index = PostAuthorIndex::new();

        for page_url in &pages {
            let html = match self.client.fetch(page_url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(url = %page_url, error = %e, "skipping thread page");
                    continue;
                }
            };

            let fragments = extract::extract_post_fragments(&html, &self.selectors, &self.base);
            for fragment in fragments {
                let post = self
                    .build_post(&thread_id, thread_url, page_url, fragment.clone())
                    .await;

                interactions.extend(build_interactions(
                    &thread_id,
                    &post,
                    &fragment.quote_targets,
                    &fragment.mention_targets,
                    &index,
                ));

                if let Some(post_id) = post.post_id.clone() {
                    index.insert(post_id, post.user_id.clone(), post.username.clone());
                }
                posts.push(post);
            }
        }

        info!(
            thread_id,
            posts = posts.len(),
            interactions = interactions.len(),
            "thread scraped"
        );

        let summary = ThreadSummary {
            thread_id,
            thread_url: thread_url.to_string(),
            forum_url: forum_url.map(ToString::to_string),
            first_seen: self.run_started,
            last_seen: self.run_started,
            scraped_at: self.run_started,
        };

        Ok(ThreadScrape {
            posts,
            interactions,
            summary,
        })
    }

    /// Turn a fragment into a post record, resolving its author cache-first.
    /// Resolution failure degrades to a user-id-only stub from the URL.
    async fn build_post(
        &self,
        thread_id: &str,
        thread_url: &str,
        page_url: &str,
        fragment: RawPostFragment,
    ) -> PostRecord {
        let mut user_id = None;
        let mut username = fragment.username;

        if let Some(profile_url) = fragment.profile_url.as_deref() {
            match self.resolver.get_or_resolve(profile_url).await {
                Ok(Some(user)) => {
                    user_id = Some(user.user_id);
                    // Prefer the canonical username from the profile.
                    if user.username.is_some() {
                        username = user.username;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(url = profile_url, error = %e, "identity resolution failed, keeping id stub");
                    user_id = extract_user_id(profile_url);
                }
            }
        }

        PostRecord {
            thread_id: thread_id.to_string(),
            thread_url: thread_url.to_string(),
            page_url: page_url.to_string(),
            post_id: fragment.post_id,
            user_id,
            username,
            timestamp: fragment.timestamp,
            text: fragment.text,
            scraped_at: self.run_started,
        }
    }
}
