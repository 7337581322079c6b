pub mod api;

#[cfg(test)]
mod tests;

use api::{BlueskyApiClient, Session};
use async_trait::async_trait;
use skyfeed_core::{BlueskyConfig, ConfigError, CoreError, FeedError, FeedItem};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Source of recent feed items. The streaming loop only ever needs these two
/// calls; pagination and rate limits stay behind the implementation.
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn authenticate(&self) -> Result<(), FeedError>;

    /// Newest items first, at most `limit` of them.
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<FeedItem>, FeedError>;
}

#[derive(Debug)]
pub struct BlueskyClient {
    api: BlueskyApiClient,
    handle: String,
    password: String,
    session: RwLock<Option<Session>>,
}

impl BlueskyClient {
    pub fn new(config: &BlueskyConfig) -> Result<Self, CoreError> {
        let service_url = parse_service_url(&config.service_url)?;
        let api = BlueskyApiClient::new(service_url)?;

        Ok(Self {
            api,
            handle: config.handle.clone(),
            password: config.password.clone(),
            session: RwLock::new(None),
        })
    }

    pub fn service_url(&self) -> &Url {
        self.api.service_url()
    }

    async fn access_token(&self) -> Result<String, FeedError> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.access_jwt.clone());
        }
        debug!("No active session, authenticating before fetch");
        self.authenticate().await?;
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.access_jwt.clone())
            .ok_or(FeedError::InvalidToken)
    }
}

#[async_trait]
impl FeedClient for BlueskyClient {
    async fn authenticate(&self) -> Result<(), FeedError> {
        let session = self.api.create_session(&self.handle, &self.password).await?;
        info!("Successfully authenticated as {}", session.handle);
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn fetch_recent(&self, limit: usize) -> Result<Vec<FeedItem>, FeedError> {
        let token = self.access_token().await?;
        let timeline = match self.api.get_timeline(&token, limit).await {
            Ok(timeline) => timeline,
            Err(FeedError::InvalidToken) => {
                // Drop the session so the next tick logs in again
                warn!("Session rejected by server, clearing it");
                *self.session.write().await = None;
                return Err(FeedError::InvalidToken);
            }
            Err(e) => return Err(e),
        };

        Ok(into_items(timeline.feed))
    }
}

/// Converts timeline entries, skipping any the server sent malformed.
pub fn into_items(feed: Vec<api::FeedViewPost>) -> Vec<FeedItem> {
    feed.into_iter()
        .filter_map(|view| match FeedItem::try_from(view) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping malformed post: {}", e);
                None
            }
        })
        .collect()
}

fn parse_service_url(raw: &str) -> Result<Url, ConfigError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|_| ConfigError::InvalidValue {
        field: "bluesky.service_url".to_string(),
        value: raw.to_string(),
    })
}
