//! Interaction graph construction: quote and mention signals from post
//! bodies become directed, confidence-weighted edges.
//!
//! Pure code: no network, no I/O. The caller feeds posts in traversal
//! order and maintains the thread-scoped [`PostAuthorIndex`], so a quote
//! can only resolve against posts seen earlier in the walk.

use std::collections::HashMap;

use uuid::Uuid;

use crate::model::{InteractionRecord, InteractionType, MentionTarget, PostRecord, QuoteTarget};

/// Quote markup names the exact post, so these edges are trusted.
pub const QUOTE_CONFIDENCE: f64 = 1.0;
/// Mention detection is heuristic; this weight is a tunable, not a
/// measured probability.
pub const MENTION_CONFIDENCE: f64 = 0.7;

/// Author of an already-processed post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorEntry {
    pub user_id: Option<String>,
    pub username: Option<String>,
}

/// Thread-scoped map from post id to its resolved author, built
/// incrementally as posts are processed.
#[derive(Debug, Default)]
pub struct PostAuthorIndex {
    entries: HashMap<String, AuthorEntry>,
}

impl PostAuthorIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, post_id: String, user_id: Option<String>, username: Option<String>) {
        self.entries.insert(post_id, AuthorEntry { user_id, username });
    }

    #[must_use]
    pub fn get(&self, post_id: &str) -> Option<&AuthorEntry> {
        self.entries.get(post_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the interaction edges sourced from one post.
///
/// A post without a `post_id` cannot source an edge and yields nothing.
/// Quote targets resolve their author through the index (forward
/// references stay unresolved); mentions with neither a target user id
/// nor a username carry no information and are dropped.
#[must_use]
pub fn build_interactions(
    thread_id: &str,
    post: &PostRecord,
    quotes: &[QuoteTarget],
    mentions: &[MentionTarget],
    index: &PostAuthorIndex,
) -> Vec<InteractionRecord> {
    let Some(replying_post_id) = post.post_id.as_deref() else {
        return Vec::new();
    };

    let mut interactions = Vec::with_capacity(quotes.len() + mentions.len());

    for quote in quotes {
        let target_user_id = quote
            .post_id
            .as_deref()
            .and_then(|id| index.get(id))
            .and_then(|author| author.user_id.clone());

        interactions.push(InteractionRecord {
            interaction_id: Uuid::new_v4().to_string(),
            replying_post_id: replying_post_id.to_string(),
            target_post_id: quote.post_id.clone(),
            source_user_id: post.user_id.clone(),
            target_user_id,
            thread_id: thread_id.to_string(),
            interaction_type: InteractionType::Quote,
            confidence: QUOTE_CONFIDENCE,
            scraped_at: post.scraped_at,
        });
    }

    for mention in mentions {
        if mention.user_id.is_none() && mention.username.is_none() {
            continue;
        }

        interactions.push(InteractionRecord {
            interaction_id: Uuid::new_v4().to_string(),
            replying_post_id: replying_post_id.to_string(),
            target_post_id: None,
            source_user_id: post.user_id.clone(),
            target_user_id: mention.user_id.clone(),
            thread_id: thread_id.to_string(),
            interaction_type: InteractionType::Mention,
            confidence: MENTION_CONFIDENCE,
            scraped_at: post.scraped_at,
        });
    }

    interactions
}
