use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One post pulled from the feed. Identity is `uri`; the engagement counters
/// are a snapshot taken at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub uri: String,
    pub cid: String,
    pub author_handle: String,
    pub author_did: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub like_count: u32,
    pub repost_count: u32,
    pub reply_count: u32,
    /// Set by the sink on the first successful write.
    pub indexed_at: Option<DateTime<Utc>>,
}

/// Allow-list of authors and required keywords. An empty set disables that
/// condition; when both are set an item has to satisfy both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub authors: BTreeSet<String>,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
}

impl FilterConfig {
    pub fn new<A, K>(authors: A, keywords: K) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        K: IntoIterator,
        K::Item: Into<String>,
    {
        Self {
            authors: authors.into_iter().map(Into::into).collect(),
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_pass_through(&self) -> bool {
        self.authors.is_empty() && self.keywords.is_empty()
    }
}

/// Outcome of a single `insert_if_absent` against a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Saved,
    Duplicate,
}

/// Read-side filter used by offline consumers of the store.
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub author_handle: Option<String>,
    pub limit: Option<u32>,
}

impl ItemQuery {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            created_after: Some(start),
            created_before: Some(end),
            ..Default::default()
        }
    }

    pub fn by_author(mut self, handle: impl Into<String>) -> Self {
        self.author_handle = Some(handle.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}
