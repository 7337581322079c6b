use crate::api::{clamp_limit, map_status, FeedViewPost, Session, TimelineResponse};
use crate::{into_items, BlueskyClient};
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use skyfeed_core::{BlueskyConfig, CoreError, FeedError, FeedItem};
use tokio_test::{assert_err, assert_ok};

fn create_test_config() -> BlueskyConfig {
    BlueskyConfig {
        handle: "tester.bsky.social".to_string(),
        password: "app-password".to_string(),
        service_url: "https://bsky.example.com".to_string(),
    }
}

const TIMELINE_JSON: &str = r#"{
    "cursor": "1700000000000::abc",
    "feed": [
        {
            "post": {
                "uri": "at://did:plc:one/app.bsky.feed.post/1",
                "cid": "cid-one",
                "author": { "did": "did:plc:one", "handle": "one.bsky.social", "displayName": "One" },
                "record": { "$type": "app.bsky.feed.post", "text": "Hello AI world", "createdAt": "2024-03-01T12:00:00.000Z" },
                "likeCount": 4,
                "repostCount": 1,
                "indexedAt": "2024-03-01T12:00:01.000Z"
            }
        },
        {
            "post": {
                "uri": "at://did:plc:two/app.bsky.feed.post/2",
                "cid": "cid-two",
                "author": { "did": "did:plc:two", "handle": "two.bsky.social" },
                "record": { "createdAt": "not a date" }
            }
        },
        {
            "post": {
                "uri": "at://did:plc:three/app.bsky.feed.post/3",
                "cid": "cid-three",
                "author": { "did": "did:plc:three", "handle": "three.bsky.social" },
                "record": { "createdAt": "2024-03-01T11:00:00+02:00" }
            }
        }
    ]
}"#;

#[test]
fn test_client_creation() {
    let client = BlueskyClient::new(&create_test_config());
    assert_ok!(&client);
    let client = client.unwrap();
    assert_eq!(
        client.service_url().as_str(),
        "https://bsky.example.com/"
    );
}

#[test]
fn test_client_rejects_bad_service_url() {
    let mut config = create_test_config();
    config.service_url = "not a url".to_string();
    let result = BlueskyClient::new(&config);
    assert!(matches!(result, Err(CoreError::Config(_))));
}

#[test]
fn test_session_deserialization() {
    let session: Session = serde_json::from_str(
        r#"{"accessJwt":"a","refreshJwt":"r","handle":"me.bsky.social","did":"did:plc:me","active":true}"#,
    )
    .unwrap();
    assert_eq!(session.access_jwt, "a");
    assert_eq!(session.handle, "me.bsky.social");
}

#[test]
fn test_timeline_conversion_skips_malformed_posts() {
    let timeline: TimelineResponse = serde_json::from_str(TIMELINE_JSON).unwrap();
    assert_eq!(timeline.feed.len(), 3);

    let items = into_items(timeline.feed);
    assert_eq!(items.len(), 2);

    let first = &items[0];
    assert_eq!(first.uri, "at://did:plc:one/app.bsky.feed.post/1");
    assert_eq!(first.author_handle, "one.bsky.social");
    assert_eq!(first.text, "Hello AI world");
    assert_eq!(first.like_count, 4);
    assert_eq!(first.repost_count, 1);
    assert_eq!(first.reply_count, 0);
    assert_eq!(first.created_at, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
    assert!(first.indexed_at.is_none());

    // Missing text defaults to empty, offsets normalise to UTC
    let third = &items[1];
    assert_eq!(third.text, "");
    assert_eq!(third.created_at, Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
}

#[test]
fn test_bad_timestamp_is_invalid_response() {
    let view: FeedViewPost = serde_json::from_str(
        r#"{"post":{"uri":"at://x","cid":"c","author":{"did":"d","handle":"h"},"record":{"text":"t","createdAt":"yesterday"}}}"#,
    )
    .unwrap();
    let result = FeedItem::try_from(view);
    assert_err!(&result);
    assert!(matches!(result, Err(FeedError::InvalidResponse { .. })));
}

#[test]
fn test_status_mapping() {
    assert!(matches!(
        map_status(StatusCode::UNAUTHORIZED, None),
        FeedError::InvalidToken
    ));
    assert!(matches!(
        map_status(StatusCode::TOO_MANY_REQUESTS, Some(12)),
        FeedError::RateLimitExceeded { retry_after: 12 }
    ));
    assert!(matches!(
        map_status(StatusCode::TOO_MANY_REQUESTS, None),
        FeedError::RateLimitExceeded { retry_after: 60 }
    ));
    assert!(matches!(
        map_status(StatusCode::BAD_GATEWAY, None),
        FeedError::ServerError { status_code: 502 }
    ));
    assert!(matches!(
        map_status(StatusCode::GATEWAY_TIMEOUT, None),
        FeedError::RequestTimeout
    ));
    assert!(matches!(
        map_status(StatusCode::NOT_FOUND, None),
        FeedError::InvalidResponse { .. }
    ));
}

#[test]
fn test_limit_is_clamped() {
    assert_eq!(clamp_limit(0), 1);
    assert_eq!(clamp_limit(50), 50);
    assert_eq!(clamp_limit(500), 100);
}
