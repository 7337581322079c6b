//! In-process store with the same dedup contract as [`crate::Database`].

use crate::ItemStore;
use async_trait::async_trait;
use chrono::Utc;
use skyfeed_core::{FeedItem, InsertOutcome, ItemQuery, StoreError};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<Vec<FeedItem>>,
    metadata: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn insert_if_absent(&self, item: &FeedItem) -> Result<InsertOutcome, StoreError> {
        let mut items = self.items.write().await;
        if items.iter().any(|existing| existing.uri == item.uri) {
            return Ok(InsertOutcome::Duplicate);
        }
        let mut stored = item.clone();
        stored.indexed_at.get_or_insert_with(Utc::now);
        items.push(stored);
        Ok(InsertOutcome::Saved)
    }

    async fn query(&self, query: &ItemQuery) -> Result<Vec<FeedItem>, StoreError> {
        let items = self.items.read().await;
        let mut matched: Vec<FeedItem> = items
            .iter()
            .filter(|item| query.created_after.map_or(true, |after| item.created_at >= after))
            .filter(|item| query.created_before.map_or(true, |before| item.created_at <= before))
            .filter(|item| {
                query
                    .author_handle
                    .as_ref()
                    .map_or(true, |author| &item.author_handle == author)
            })
            .cloned()
            .collect();
        matched.sort_by_key(|item| item.created_at);
        if let Some(limit) = query.limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.metadata.read().await.get(key).cloned())
    }

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.metadata
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
