#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use database::{ItemStore, MemoryStore};
use feed_client::FeedClient;
use skyfeed_core::{FeedError, FeedItem, FilterConfig, InsertOutcome, ItemQuery, StoreError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use streaming_service::{StreamSettings, StreamingService};

pub fn post(uri: &str, author: &str, text: &str) -> FeedItem {
    FeedItem {
        uri: uri.to_string(),
        cid: format!("cid-{uri}"),
        author_handle: author.to_string(),
        author_did: format!("did:plc:{author}"),
        text: text.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        like_count: 0,
        repost_count: 0,
        reply_count: 0,
        indexed_at: None,
    }
}

/// Feed that replays scripted fetch results, then repeats a fallback.
pub struct ScriptedFeed {
    responses: Mutex<VecDeque<Result<Vec<FeedItem>, FeedError>>>,
    fallback: Result<Vec<FeedItem>, FeedError>,
    auth_results: Mutex<VecDeque<Result<(), FeedError>>>,
    fetch_delay: Duration,
    pub fetch_calls: AtomicUsize,
    pub auth_calls: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(responses: Vec<Result<Vec<FeedItem>, FeedError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: Ok(Vec::new()),
            auth_results: Mutex::new(VecDeque::new()),
            fetch_delay: Duration::ZERO,
            fetch_calls: AtomicUsize::new(0),
            auth_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_fallback(mut self, fallback: Result<Vec<FeedItem>, FeedError>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_auth_results(self, results: Vec<Result<(), FeedError>>) -> Self {
        *self.auth_results.lock().unwrap() = results.into();
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedClient for ScriptedFeed {
    async fn authenticate(&self) -> Result<(), FeedError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        self.auth_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn fetch_recent(&self, _limit: usize) -> Result<Vec<FeedItem>, FeedError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Memory store that refuses any item whose uri contains "bad".
pub struct FlakyStore {
    inner: MemoryStore,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
        }
    }
}

#[async_trait]
impl ItemStore for FlakyStore {
    async fn insert_if_absent(&self, item: &FeedItem) -> Result<InsertOutcome, StoreError> {
        if item.uri.contains("bad") {
            return Err(StoreError::QueryFailed {
                query: format!("insert {}", item.uri),
            });
        }
        self.inner.insert_if_absent(item).await
    }

    async fn query(&self, query: &ItemQuery) -> Result<Vec<FeedItem>, StoreError> {
        self.inner.query(query).await
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_metadata(key).await
    }

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set_metadata(key, value).await
    }
}

pub fn settings(poll_interval: Duration, filters: FilterConfig) -> StreamSettings {
    StreamSettings {
        poll_interval,
        stats_interval: Duration::from_secs(60),
        max_items_per_fetch: 50,
        filters,
    }
}

/// Polls status until at least `ticks` ticks have been counted.
pub async fn wait_for_ticks(service: &StreamingService, ticks: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if service.status().await.stats.ticks >= ticks {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {ticks} ticks"));
}
