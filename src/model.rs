//! Record types produced by the crawl and the thread-id derivation they key on.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;

/// Length of the hash-derived fallback thread id.
const HASHED_ID_LEN: usize = 16;

static TRAILING_DOT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(\d+)$").expect("Invalid regex"));
static TRAILING_SLASH_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(\d+)$").expect("Invalid regex"));

/// A forum section to crawl, as configured.
#[derive(Debug, Clone)]
pub struct ForumRef {
    pub url: String,
}

/// A thread discovered on a forum index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRef {
    pub url: String,
    pub thread_id: String,
}

impl ThreadRef {
    #[must_use]
    pub fn new(url: String) -> Self {
        let thread_id = derive_thread_id(&url);
        Self { url, thread_id }
    }
}

/// Derive a stable thread id from a thread URL.
///
/// XenForo-style URLs end in `title.12345/`; the numeric suffix is the id.
/// URLs without one get a truncated SHA-256 of the URL so the same thread
/// still maps to the same id across runs.
#[must_use]
pub fn derive_thread_id(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let path = path.trim_end_matches('/');

    if let Some(caps) = TRAILING_DOT_ID.captures(path) {
        return caps[1].to_string();
    }
    if let Some(caps) = TRAILING_SLASH_ID.captures(path) {
        return caps[1].to_string();
    }

    let mut hasher = Sha256::new();
    hasher.update(url.trim_end_matches('/').as_bytes());
    hex::encode(hasher.finalize())[..HASHED_ID_LEN].to_string()
}

/// One post as extracted from a thread page, before identity resolution.
///
/// Everything is optional: a fragment with no `post_id` is kept as a
/// `PostRecord` but can never source an interaction.
#[derive(Debug, Clone, Default)]
pub struct RawPostFragment {
    pub post_id: Option<String>,
    pub username: Option<String>,
    pub profile_url: Option<String>,
    pub timestamp: Option<String>,
    pub text: Option<String>,
    pub quote_targets: Vec<QuoteTarget>,
    pub mention_targets: Vec<MentionTarget>,
}

/// A quoted block inside a post body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteTarget {
    /// Post id named by the quote markup, when present.
    pub post_id: Option<String>,
    /// Username named by the quote markup, when present.
    pub username: Option<String>,
}

/// A profile-style link inside a post body that looks like an @-mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionTarget {
    pub user_id: Option<String>,
    pub username: Option<String>,
}

/// A resolved forum member, keyed by the numeric id in their profile URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub user_id: String,
    pub username: Option<String>,
    pub profile_url: String,
    pub join_date: Option<String>,
    pub role: Option<String>,
    pub gender: Option<String>,
    pub country_of_birth: Option<String>,
    pub location: Option<String>,
    pub mbti_type: Option<String>,
    pub enneagram_type: Option<String>,
    pub socionics: Option<String>,
    pub occupation: Option<String>,
    pub replies: Option<i64>,
    pub discussions_created: Option<i64>,
    pub reaction_score: Option<i64>,
    pub points: Option<i64>,
    pub media_count: Option<i64>,
    pub showcase_count: Option<i64>,
    pub scraped_at: DateTime<Utc>,
}

/// One scraped post, immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct PostRecord {
    pub thread_id: String,
    pub thread_url: String,
    pub page_url: String,
    pub post_id: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub timestamp: Option<String>,
    pub text: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    Quote,
    Mention,
}

/// A directed quote/mention edge between posts and users.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionRecord {
    pub interaction_id: String,
    pub replying_post_id: String,
    pub target_post_id: Option<String>,
    pub source_user_id: Option<String>,
    pub target_user_id: Option<String>,
    pub thread_id: String,
    pub interaction_type: InteractionType,
    pub confidence: f64,
    pub scraped_at: DateTime<Utc>,
}

/// One row per fully processed thread.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub thread_url: String,
    pub forum_url: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
}
