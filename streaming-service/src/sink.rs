use chrono::Utc;
use database::ItemStore;
use skyfeed_core::{ErrorExt, FeedItem, InsertOutcome, StoreError};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveResult {
    Saved,
    Duplicate,
    Error(String),
}

/// Idempotent writes on top of an [`ItemStore`]. A key conflict is a
/// duplicate, not a failure; every other store error is reported as
/// `SaveResult::Error` and left for the caller to count.
pub struct DeduplicatingSink {
    store: Arc<dyn ItemStore>,
}

impl DeduplicatingSink {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }

    pub async fn save(&self, mut item: FeedItem) -> SaveResult {
        item.indexed_at = Some(Utc::now());

        match self.store.insert_if_absent(&item).await {
            Ok(InsertOutcome::Saved) => {
                debug!("Saved {}", item.uri);
                SaveResult::Saved
            }
            Ok(InsertOutcome::Duplicate) => {
                debug!("Skipping known item {}", item.uri);
                SaveResult::Duplicate
            }
            Err(StoreError::ConstraintViolation { constraint }) => {
                debug!("Key conflict on {} ({}), treating as duplicate", item.uri, constraint);
                SaveResult::Duplicate
            }
            Err(e) => {
                e.log_warn();
                SaveResult::Error(format!("{}: {}", e.error_code(), e))
            }
        }
    }
}
