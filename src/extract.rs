//! Page-level extraction: thread links on index pages, next-page pointers,
//! and per-post fragments with their quote/mention targets.
//!
//! All functions here are synchronous and take raw page text, so parsed
//! documents never live across await points.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::{ConfigError, Selectors};
use crate::dom;
use crate::model::{MentionTarget, QuoteTarget, RawPostFragment};
use crate::users::extract_user_id;

static TRAILING_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)$").expect("Invalid regex"));
static QUOTE_SOURCE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").expect("Invalid regex"));
static CITE_POST_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"post-(\d+)").expect("Invalid regex"));

/// Compiled selectors for one site layout.
///
/// The configurable part comes from [`Selectors`]; the rest carry fixed
/// semantics (`rel=next` pagination, `/members/` profile links, quote
/// blocks) shared by the markup family this crawler targets.
pub struct SelectorSet {
    thread_card: Selector,
    thread_link: Selector,
    post: Selector,
    post_username: Selector,
    post_body: Selector,
    next_link: Selector,
    any_link: Selector,
    member_link: Selector,
    time: Selector,
    quote_block: Selector,
    cite_link: Selector,
}

impl SelectorSet {
    /// Compile a selector configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configured selector string is malformed.
    pub fn compile(selectors: &Selectors) -> Result<Self, ConfigError> {
        Ok(Self {
            thread_card: dom::compile("thread_card", &selectors.thread_card)?,
            thread_link: dom::compile("thread_link", &selectors.thread_link)?,
            post: dom::compile("post", &selectors.post)?,
            post_username: dom::compile("post_username", &selectors.post_username)?,
            post_body: dom::compile("post_body", &selectors.post_body)?,
            next_link: Selector::parse("a[rel=next]").expect("Invalid selector"),
            any_link: Selector::parse("a[href]").expect("Invalid selector"),
            member_link: Selector::parse("a[href*='/members/']").expect("Invalid selector"),
            time: Selector::parse("time").expect("Invalid selector"),
            quote_block: Selector::parse("blockquote").expect("Invalid selector"),
            cite_link: Selector::parse("a[href*='post-']").expect("Invalid selector"),
        })
    }
}

/// Resolve a possibly relative href against the site base.
#[must_use]
pub fn absolute_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map_or_else(|_| href.to_string(), |u| u.to_string())
}

/// Thread URLs on one forum index page, in document order, plus the
/// next-page pointer if one exists. Duplicates within the page are kept;
/// the caller deduplicates across the whole walk.
#[must_use]
pub fn parse_forum_index(
    html: &str,
    selectors: &SelectorSet,
    base: &Url,
) -> (Vec<String>, Option<String>) {
    let document = Html::parse_document(html);

    let mut threads = Vec::new();
    for card in document.select(&selectors.thread_card) {
        let Some(link) = dom::select_first(&card, &selectors.thread_link) else {
            continue;
        };
        if let Some(href) = dom::attr_of(&link, "href") {
            threads.push(absolute_url(base, &href));
        }
    }

    let next = find_next_in(&document, selectors, base);
    (threads, next)
}

/// Next-page pointer of a thread page, if any.
#[must_use]
pub fn find_next_url(html: &str, selectors: &SelectorSet, base: &Url) -> Option<String> {
    let document = Html::parse_document(html);
    find_next_in(&document, selectors, base)
}

fn find_next_in(document: &Html, selectors: &SelectorSet, base: &Url) -> Option<String> {
    document
        .select(&selectors.next_link)
        .next()
        .and_then(|el| dom::attr_of(&el, "href"))
        .map(|href| absolute_url(base, &href))
}

/// Parse every post on one thread page into a raw fragment, in document
/// order. Absent fields stay `None`; nothing here touches the network.
#[must_use]
pub fn extract_post_fragments(
    html: &str,
    selectors: &SelectorSet,
    base: &Url,
) -> Vec<RawPostFragment> {
    let document = Html::parse_document(html);

    document
        .select(&selectors.post)
        .map(|post| extract_fragment(&post, selectors, base))
        .collect()
}

fn extract_fragment(post: &ElementRef, selectors: &SelectorSet, base: &Url) -> RawPostFragment {
    let user_el = dom::select_first(post, &selectors.post_username);

    let username = user_el
        .as_ref()
        .and_then(dom::text_of)
        .or_else(|| dom::attr_of(post, "data-author"));

    // Profile link from the username block, else any member link in the post.
    let profile_url = user_el
        .as_ref()
        .and_then(|el| dom::select_first(el, &selectors.any_link))
        .and_then(|a| dom::attr_of(&a, "href"))
        .or_else(|| {
            dom::select_first(post, &selectors.member_link)
                .and_then(|a| dom::attr_of(&a, "href"))
        })
        .map(|href| absolute_url(base, &href));

    let timestamp = dom::select_first(post, &selectors.time)
        .and_then(|t| dom::attr_of(&t, "datetime").or_else(|| dom::text_of(&t)));

    let body = dom::select_first(post, &selectors.post_body);
    let text = body.as_ref().and_then(dom::block_text_of);

    let (quote_targets, mention_targets) = body
        .as_ref()
        .map_or((Vec::new(), Vec::new()), |b| extract_targets(b, selectors));

    RawPostFragment {
        post_id: extract_post_id(post),
        username,
        profile_url,
        timestamp,
        text,
        quote_targets,
        mention_targets,
    }
}

/// Stable post id from element attributes: `data-content`, else the
/// trailing digits of the element id (`js-post-123`, `post-123`).
fn extract_post_id(post: &ElementRef) -> Option<String> {
    if let Some(id) = dom::attr_of(post, "data-content") {
        return Some(id);
    }
    dom::attr_of(post, "id")
        .and_then(|id| TRAILING_DIGITS.captures(&id).map(|c| c[1].to_string()))
}

fn extract_targets(body: &ElementRef, selectors: &SelectorSet) -> (Vec<QuoteTarget>, Vec<MentionTarget>) {
    let quotes = body
        .select(&selectors.quote_block)
        .map(|block| extract_quote_target(&block, selectors))
        .collect();

    let mentions = body
        .select(&selectors.member_link)
        .filter_map(extract_mention_target)
        .collect();

    (quotes, mentions)
}

fn extract_quote_target(block: &ElementRef, selectors: &SelectorSet) -> QuoteTarget {
    let username = dom::attr_of(block, "data-quote");

    // `data-source="post: 12345"` on the block, else a cite link into the post.
    let post_id = dom::attr_of(block, "data-source")
        .and_then(|source| QUOTE_SOURCE_ID.captures(&source).map(|c| c[1].to_string()))
        .or_else(|| {
            dom::select_first(block, &selectors.cite_link)
                .and_then(|a| dom::attr_of(&a, "href"))
                .and_then(|href| CITE_POST_ID.captures(&href).map(|c| c[1].to_string()))
        });

    QuoteTarget { post_id, username }
}

/// A member link counts as a mention only when it carries a user-id data
/// attribute or a username-styled class. Both signals are heuristic; plain
/// profile links in signatures or quote headers are ignored.
fn extract_mention_target(anchor: ElementRef) -> Option<MentionTarget> {
    let has_user_attr = anchor.value().attr("data-user-id").is_some();
    let has_username_class = anchor
        .value()
        .classes()
        .any(|class| class.starts_with("username"));
    if !has_user_attr && !has_username_class {
        return None;
    }

    let user_id = dom::attr_of(&anchor, "data-user-id")
        .or_else(|| dom::attr_of(&anchor, "href").and_then(|href| extract_user_id(&href)));
    let username = dom::text_of(&anchor);

    Some(MentionTarget { user_id, username })
}
