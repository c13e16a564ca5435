//! Identity resolution: turn a member profile URL into a durable
//! [`UserRecord`], fetching each member at most once per run.
//!
//! Resolution tries three page variants in order of richness: the `/about`
//! tab (optional demographics), the full profile page, and the `/tooltip`
//! fragment the forum serves for hover cards. The about-tab side map is
//! merged into whichever tier wins.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::dom;
use crate::fetch::{FetchClient, FetchError};
use crate::model::UserRecord;

static ID_DOT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(\d+)/?$").expect("Invalid regex"));
static ID_SLASH_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(\d+)/?$").expect("Invalid regex"));
static NON_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9]").expect("Invalid regex"));
static LOCATION_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)from\s+(.*)").expect("Invalid regex"));

macro_rules! sel {
    ($name:ident, $s:expr) => {
        static $name: Lazy<Selector> =
            Lazy::new(|| Selector::parse($s).expect("Invalid selector"));
    };
}

sel!(SEL_ABOUT_ROW, ".flex-row");
sel!(SEL_ABOUT_LABEL, ".about-identifier");
sel!(SEL_ABOUT_VALUE, ".about-content, .about-custom-content");
sel!(SEL_PROFILE_TITLE, "h1.p-title-value, .memberHeader-title");
sel!(SEL_PROFILE_USERNAME, ".memberHeader-content .username");
sel!(SEL_PROFILE_ROLE, ".memberHeader-content .userTitle, .userTitle");
sel!(SEL_PROFILE_TIME, ".memberHeader-content time, time[itemprop=dateCreated]");
sel!(SEL_BLURB_LOCATION, ".memberHeader-blurb a[href*='location-info']");
sel!(SEL_BLURB, ".memberHeader-blurb");
sel!(SEL_STAT_PAIRS, "dl.pairs");
sel!(SEL_TOOLTIP, ".memberTooltip");
sel!(SEL_TOOLTIP_NAME, ".memberTooltip-name a.username");
sel!(SEL_TOOLTIP_TIME, ".memberTooltip-blurb time");
sel!(SEL_TOOLTIP_STATS, ".memberTooltip-stats dl");
sel!(SEL_DT, "dt");
sel!(SEL_DD, "dd");

/// Extract the numeric member id from a profile URL.
///
/// XenForo-style paths end in `username.12345/`; a plain `/12345/` suffix
/// is accepted as a fallback. No match means the reference is unresolvable.
#[must_use]
pub fn extract_user_id(profile_url: &str) -> Option<String> {
    let path = Url::parse(profile_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| {
            profile_url
                .split(['?', '#'])
                .next()
                .unwrap_or(profile_url)
                .to_string()
        });

    if let Some(caps) = ID_DOT_SUFFIX.captures(&path) {
        return Some(caps[1].to_string());
    }
    ID_SLASH_SUFFIX
        .captures(&path)
        .map(|caps| caps[1].to_string())
}

/// Optional demographic fields from the `/about` tab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AboutDetails {
    pub location: Option<String>,
    pub gender: Option<String>,
    pub country_of_birth: Option<String>,
    pub mbti_type: Option<String>,
    pub enneagram_type: Option<String>,
    pub socionics: Option<String>,
    pub occupation: Option<String>,
}

impl AboutDetails {
    /// Merge into a record, only overwriting with non-empty values.
    fn merge_into(&self, user: &mut UserRecord) {
        merge_field(&mut user.location, &self.location);
        merge_field(&mut user.gender, &self.gender);
        merge_field(&mut user.country_of_birth, &self.country_of_birth);
        merge_field(&mut user.mbti_type, &self.mbti_type);
        merge_field(&mut user.enneagram_type, &self.enneagram_type);
        merge_field(&mut user.socionics, &self.socionics);
        merge_field(&mut user.occupation, &self.occupation);
    }
}

fn merge_field(target: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value {
        if !v.is_empty() {
            *target = Some(v.clone());
        }
    }
}

/// Parse the About tab into a side map of demographics.
#[must_use]
pub fn parse_about_page(html: &str) -> AboutDetails {
    let document = Html::parse_document(html);
    let mut details = AboutDetails::default();

    for row in document.select(&SEL_ABOUT_ROW) {
        let Some(label_el) = dom::select_first(&row, &SEL_ABOUT_LABEL) else {
            continue;
        };
        let Some(raw_label) = dom::text_of(&label_el) else {
            continue;
        };
        let key = label_key(&raw_label);

        let Some(value) = dom::select_first(&row, &SEL_ABOUT_VALUE).and_then(|v| dom::text_of(&v))
        else {
            continue;
        };

        if key.starts_with("location") {
            details.location = Some(value);
        } else if key.starts_with("gender") {
            details.gender = Some(value);
        } else if key.contains("myers briggs") || key == "mbti" || key.contains("type indicator") {
            details.mbti_type = Some(value);
        } else if key.contains("enneagram") {
            details.enneagram_type = Some(value);
        } else if key.contains("country of birth") {
            details.country_of_birth = Some(value);
        } else if key.contains("socionics") {
            details.socionics = Some(value);
        } else if key.contains("occupation") {
            details.occupation = Some(value);
        }
    }

    details
}

fn label_key(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let spaced = lowered
        .split(|c: char| c == ':' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    spaced
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect()
}

/// dt/dd label-value pairs under the given stat blocks, labels lowercased.
fn collect_stats<'a, I>(blocks: I) -> HashMap<String, String>
where
    I: Iterator<Item = ElementRef<'a>>,
{
    let mut stats = HashMap::new();
    for block in blocks {
        let Some(dt) = dom::select_first(&block, &SEL_DT) else {
            continue;
        };
        let Some(dd) = dom::select_first(&block, &SEL_DD) else {
            continue;
        };
        if let (Some(label), Some(value)) = (dom::text_of(&dt), dom::text_of(&dd)) {
            stats.insert(label.to_lowercase(), value);
        }
    }
    stats
}

fn clean_int(value: Option<&String>) -> Option<i64> {
    let digits = NON_DIGITS.replace_all(value?, "");
    digits.parse().ok()
}

/// Last path segment of the profile URL, with any `.12345` id stripped.
fn fallback_username(profile_url: &str) -> Option<String> {
    let path = Url::parse(profile_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| profile_url.to_string());
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    let name = segment.split('.').next().unwrap_or(segment);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn build_record(
    user_id: &str,
    profile_url: &str,
    username: Option<String>,
    join_date: Option<String>,
    role: Option<String>,
    location: Option<String>,
    stats: &HashMap<String, String>,
    scraped_at: DateTime<Utc>,
) -> UserRecord {
    UserRecord {
        user_id: user_id.to_string(),
        username: username.or_else(|| fallback_username(profile_url)),
        profile_url: profile_url.to_string(),
        join_date,
        role,
        gender: None,
        country_of_birth: None,
        location,
        mbti_type: None,
        enneagram_type: None,
        socionics: None,
        occupation: None,
        replies: clean_int(stats.get("replies")),
        discussions_created: clean_int(stats.get("discussions created")),
        reaction_score: clean_int(stats.get("reaction score")),
        points: clean_int(stats.get("points")),
        media_count: clean_int(stats.get("media")),
        showcase_count: clean_int(stats.get("showcase")),
        scraped_at,
    }
}

/// A profile page with none of the activity counters, join date or role is
/// treated as insufficient and triggers the tooltip fallback.
fn has_meaningful_data(user: &UserRecord) -> bool {
    user.replies.is_some()
        || user.discussions_created.is_some()
        || user.reaction_score.is_some()
        || user.points.is_some()
        || user.media_count.is_some()
        || user.showcase_count.is_some()
        || user.join_date.is_some()
        || user.role.is_some()
}

/// Parse the full profile page; `None` when it carries no usable signal.
#[must_use]
pub fn parse_profile_page(
    html: &str,
    profile_url: &str,
    user_id: &str,
    scraped_at: DateTime<Utc>,
) -> Option<UserRecord> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let username = dom::select_first(&root, &SEL_PROFILE_TITLE)
        .and_then(|el| dom::text_of(&el))
        .or_else(|| {
            dom::select_first(&root, &SEL_PROFILE_USERNAME).and_then(|el| dom::text_of(&el))
        });

    let role = dom::select_first(&root, &SEL_PROFILE_ROLE).and_then(|el| dom::text_of(&el));

    let mut join_date = dom::select_first(&root, &SEL_PROFILE_TIME)
        .and_then(|el| dom::attr_of(&el, "datetime").or_else(|| dom::text_of(&el)));

    let location = extract_header_location(&root);

    let stats = collect_stats(document.select(&SEL_STAT_PAIRS));
    if join_date.is_none() {
        join_date = stats.get("joined").cloned();
    }

    let user = build_record(
        user_id, profile_url, username, join_date, role, location, &stats, scraped_at,
    );

    has_meaningful_data(&user).then_some(user)
}

fn extract_header_location(root: &ElementRef) -> Option<String> {
    if let Some(link) = dom::select_first(root, &SEL_BLURB_LOCATION) {
        return dom::text_of(&link);
    }
    let blurb = dom::select_first(root, &SEL_BLURB)?;
    let text = dom::text_of(&blurb)?;
    LOCATION_FROM
        .captures(&text)
        .map(|caps| caps[1].trim_matches(|c: char| c == '.' || c.is_whitespace()).to_string())
}

/// Parse the lightweight tooltip fragment. Always yields a record; fields
/// the markup lacks stay `None`.
#[must_use]
pub fn parse_tooltip_page(
    html: &str,
    profile_url: &str,
    user_id: &str,
    scraped_at: DateTime<Utc>,
) -> UserRecord {
    let document = Html::parse_document(html);
    let tooltip = document.select(&SEL_TOOLTIP).next();

    let username = tooltip
        .and_then(|t| dom::select_first(&t, &SEL_TOOLTIP_NAME))
        .and_then(|el| dom::text_of(&el));
    let role = tooltip
        .and_then(|t| dom::select_first(&t, &SEL_PROFILE_ROLE))
        .and_then(|el| dom::text_of(&el));
    let join_date = tooltip
        .and_then(|t| dom::select_first(&t, &SEL_TOOLTIP_TIME))
        .and_then(|el| dom::attr_of(&el, "datetime").or_else(|| dom::text_of(&el)));

    let stats = tooltip.map_or_else(HashMap::new, |t| collect_stats(t.select(&SEL_TOOLTIP_STATS)));

    build_record(
        user_id, profile_url, username, join_date, role, None, &stats, scraped_at,
    )
}

/// Resolver-owned memoizing cache over the tiered profile fetch.
pub struct UserResolver {
    client: Arc<FetchClient>,
    run_started: DateTime<Utc>,
    cache: Mutex<HashMap<String, UserRecord>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserResolver {
    #[must_use]
    pub fn new(client: Arc<FetchClient>, run_started: DateTime<Utc>) -> Self {
        Self {
            client,
            run_started,
            cache: Mutex::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a profile URL to a user record, cache-first.
    ///
    /// `Ok(None)` means the URL carries no extractable member id; no
    /// network call is made in that case. At most one resolution is in
    /// flight per member id even with concurrent callers.
    ///
    /// # Errors
    ///
    /// Propagates the final-tier fetch failure; the caller decides how to
    /// degrade.
    pub async fn get_or_resolve(
        &self,
        profile_url: &str,
    ) -> Result<Option<UserRecord>, FetchError> {
        let Some(user_id) = extract_user_id(profile_url) else {
            debug!(url = profile_url, "no member id in profile URL, skipping resolution");
            return Ok(None);
        };

        if let Some(user) = self.cache.lock().await.get(&user_id) {
            return Ok(Some(user.clone()));
        }

        let key_lock = self.key_lock(&user_id).await;
        let _guard = key_lock.lock().await;

        // Double-check: another caller may have resolved while we waited.
        if let Some(user) = self.cache.lock().await.get(&user_id) {
            return Ok(Some(user.clone()));
        }

        let user = self.resolve_uncached(profile_url, &user_id).await?;
        self.cache
            .lock()
            .await
            .insert(user_id.clone(), user.clone());
        Ok(Some(user))
    }

    async fn key_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        Arc::clone(
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Tiered fallback: about tab (optional) -> profile page -> tooltip.
    async fn resolve_uncached(
        &self,
        profile_url: &str,
        user_id: &str,
    ) -> Result<UserRecord, FetchError> {
        let trimmed = profile_url.trim_end_matches('/');

        let about_url = format!("{trimmed}/about");
        let about = match self.client.fetch(&about_url).await {
            Ok(html) => parse_about_page(&html),
            Err(e) => {
                warn!(url = %about_url, error = %e, "about tab fetch failed, continuing without enrichment");
                AboutDetails::default()
            }
        };

        match self.client.fetch(profile_url).await {
            Ok(html) => {
                if let Some(mut user) =
                    parse_profile_page(&html, profile_url, user_id, self.run_started)
                {
                    about.merge_into(&mut user);
                    return Ok(user);
                }
                debug!(url = profile_url, "profile page lacked usable data, trying tooltip");
            }
            Err(e) => {
                warn!(url = profile_url, error = %e, "profile page fetch failed, trying tooltip");
            }
        }

        let tooltip_url = format!("{trimmed}/tooltip");
        let html = self.client.fetch(&tooltip_url).await?;
        let mut user = parse_tooltip_page(&html, profile_url, user_id, self.run_started);
        about.merge_into(&mut user);
        Ok(user)
    }

    /// Every user resolved this run, ordered by id for stable output.
    pub async fn export_users(&self) -> Vec<UserRecord> {
        let cache = self.cache.lock().await;
        let mut users: Vec<UserRecord> = cache.values().cloned().collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.lock().await.len()
    }
}
