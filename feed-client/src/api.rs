use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use skyfeed_core::{FeedError, FeedItem};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

const CREATE_SESSION: &str = "xrpc/com.atproto.server.createSession";
const GET_TIMELINE: &str = "xrpc/app.bsky.feed.getTimeline";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER: u64 = 60;

#[derive(Debug, Clone, Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_jwt: String,
    pub refresh_jwt: String,
    pub handle: String,
    pub did: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineResponse {
    pub feed: Vec<FeedViewPost>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedViewPost {
    pub post: PostView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub uri: String,
    pub cid: String,
    pub author: ProfileView,
    pub record: PostRecord,
    pub like_count: Option<u32>,
    pub repost_count: Option<u32>,
    pub reply_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileView {
    pub did: String,
    pub handle: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(default)]
    pub text: String,
    pub created_at: String,
}

/// Thin XRPC wrapper; knows endpoints and status codes, not sessions.
#[derive(Debug)]
pub struct BlueskyApiClient {
    http_client: Client,
    service_url: Url,
}

impl BlueskyApiClient {
    pub fn new(service_url: Url) -> Result<Self, FeedError> {
        let http_client = Client::builder()
            .user_agent(concat!("skyfeed/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FeedError::Network {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http_client,
            service_url,
        })
    }

    pub fn service_url(&self) -> &Url {
        &self.service_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, FeedError> {
        self.service_url
            .join(path)
            .map_err(|e| FeedError::InvalidResponse {
                details: format!("invalid endpoint {path}: {e}"),
            })
    }

    pub async fn create_session(&self, identifier: &str, password: &str) -> Result<Session, FeedError> {
        let url = self.endpoint(CREATE_SESSION)?;
        info!("Creating Bluesky session for {}", identifier);

        let response = self
            .http_client
            .post(url)
            .json(&CreateSessionRequest {
                identifier,
                password,
            })
            .send()
            .await
            .map_err(|e| {
                error!("Network error creating session: {}", e);
                FeedError::from(e)
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::AuthenticationFailed {
                reason: format!("{status}: {body}"),
            });
        }
        let response = check_status(response)?;

        let session: Session = response.json().await.map_err(|e| {
            error!("Failed to parse session: {}", e);
            FeedError::InvalidResponse {
                details: "Failed to parse createSession response".to_string(),
            }
        })?;

        debug!("Session established for {} ({})", session.handle, session.did);
        Ok(session)
    }

    pub async fn get_timeline(&self, access_jwt: &str, limit: usize) -> Result<TimelineResponse, FeedError> {
        let url = self.endpoint(GET_TIMELINE)?;
        let limit = clamp_limit(limit).to_string();

        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_jwt)
            .query(&[("algorithm", "reverse-chronological"), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| {
                error!("Network error fetching timeline: {}", e);
                FeedError::from(e)
            })?;

        let response = check_status(response)?;
        let timeline: TimelineResponse = response.json().await.map_err(|e| {
            error!("Failed to parse timeline: {}", e);
            FeedError::InvalidResponse {
                details: "Failed to parse getTimeline response".to_string(),
            }
        })?;

        debug!("Timeline returned {} posts", timeline.feed.len());
        Ok(timeline)
    }
}

/// The timeline endpoint accepts 1..=100.
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, 100)
}

fn check_status(response: Response) -> Result<Response, FeedError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    Err(map_status(status, retry_after))
}

pub fn map_status(status: StatusCode, retry_after: Option<u64>) -> FeedError {
    match status {
        StatusCode::UNAUTHORIZED => FeedError::InvalidToken,
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = retry_after.unwrap_or(DEFAULT_RETRY_AFTER);
            warn!("Rate limited, retry after {} seconds", retry_after);
            FeedError::RateLimitExceeded { retry_after }
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => FeedError::RequestTimeout,
        s if s.is_server_error() => FeedError::ServerError {
            status_code: s.as_u16(),
        },
        s => FeedError::InvalidResponse {
            details: format!("unexpected status {s}"),
        },
    }
}

impl TryFrom<FeedViewPost> for FeedItem {
    type Error = FeedError;

    fn try_from(view: FeedViewPost) -> Result<Self, Self::Error> {
        let post = view.post;
        let created_at = DateTime::parse_from_rfc3339(&post.record.created_at)
            .map_err(|e| FeedError::InvalidResponse {
                details: format!("bad createdAt on {}: {e}", post.uri),
            })?
            .with_timezone(&Utc);

        Ok(FeedItem {
            uri: post.uri,
            cid: post.cid,
            author_handle: post.author.handle,
            author_did: post.author.did,
            text: post.record.text,
            created_at,
            like_count: post.like_count.unwrap_or(0),
            repost_count: post.repost_count.unwrap_or(0),
            reply_count: post.reply_count.unwrap_or(0),
            indexed_at: None,
        })
    }
}
