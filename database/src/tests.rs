#[cfg(test)]
mod tests {
    use crate::{Database, ItemStore, MemoryStore};
    use chrono::{Duration, TimeZone, Utc};
    use skyfeed_core::{FeedItem, InsertOutcome, ItemQuery, StoreError};
    use std::env;

    async fn setup_test_db() -> Database {
        let db_path = env::temp_dir().join(format!("test_skyfeed_{}.db", uuid::Uuid::new_v4()));
        let db_url = format!("sqlite://{}", db_path.display());

        let mut db = Database::new(db_url);
        db.connect()
            .await
            .expect("Failed to connect to test database");
        db.run_migrations().await.expect("Failed to run migrations");

        db
    }

    fn item(uri: &str, author: &str, minutes_ago: i64) -> FeedItem {
        FeedItem {
            uri: uri.to_string(),
            cid: format!("cid-{uri}"),
            author_handle: author.to_string(),
            author_did: format!("did:plc:{author}"),
            text: format!("post {uri}"),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
                - Duration::minutes(minutes_ago),
            like_count: 3,
            repost_count: 1,
            reply_count: 0,
            indexed_at: None,
        }
    }

    #[tokio::test]
    async fn test_database_connection_and_migrations() {
        let db = setup_test_db().await;
        assert_eq!(db.count_items().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_creates_missing_directory() {
        let dir = env::temp_dir().join(format!("skyfeed_dir_{}", uuid::Uuid::new_v4()));
        let db = Database::open(dir.join("nested").join("feed.db"))
            .await
            .expect("Failed to open database");
        assert!(dir.join("nested").exists());
        assert_eq!(db.count_items().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unconnected_database_reports_connection_failure() {
        let db = Database::new("sqlite::memory:".to_string());
        let result = db.count_items().await;
        assert!(matches!(result, Err(StoreError::ConnectionFailed { .. })));
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_idempotent() {
        let db = setup_test_db().await;
        let post = item("at://a/1", "alice", 0);

        assert_eq!(db.insert_if_absent(&post).await.unwrap(), InsertOutcome::Saved);
        assert_eq!(
            db.insert_if_absent(&post).await.unwrap(),
            InsertOutcome::Duplicate
        );

        // Changed counters do not make it a new item
        let mut bumped = post.clone();
        bumped.like_count = 99;
        assert_eq!(
            db.insert_if_absent(&bumped).await.unwrap(),
            InsertOutcome::Duplicate
        );

        let stored = db.query(&ItemQuery::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].like_count, 3);
        assert!(stored[0].indexed_at.is_some());
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let db = setup_test_db().await;
        for post in [
            item("at://a/1", "alice", 10),
            item("at://b/1", "bob", 30),
            item("at://a/2", "alice", 90),
        ] {
            db.save_item(&post).await.unwrap();
        }

        let all = db.get_items(&ItemQuery::default()).await.unwrap();
        let uris: Vec<_> = all.iter().map(|i| i.uri.as_str()).collect();
        assert_eq!(uris, vec!["at://a/2", "at://b/1", "at://a/1"]);

        let end = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let last_hour = db
            .get_items(&ItemQuery::between(end - Duration::hours(1), end))
            .await
            .unwrap();
        assert_eq!(last_hour.len(), 2);

        let alice = db
            .get_items(&ItemQuery::default().by_author("alice").limit(1))
            .await
            .unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].uri, "at://a/2");
    }

    #[tokio::test]
    async fn test_out_of_range_counters_saturate() {
        let db = setup_test_db().await;
        db.insert_if_absent(&item("at://a/1", "alice", 0)).await.unwrap();

        sqlx::query(
            "UPDATE items SET like_count = ?, repost_count = ?, reply_count = ? WHERE uri = ?",
        )
        .bind(i64::from(u32::MAX) + 10)
        .bind(-5_i64)
        .bind(7_i64)
        .bind("at://a/1")
        .execute(db.pool().unwrap())
        .await
        .unwrap();

        let stored = db.query(&ItemQuery::default()).await.unwrap();
        assert_eq!(stored[0].like_count, u32::MAX);
        assert_eq!(stored[0].repost_count, 0);
        assert_eq!(stored[0].reply_count, 7);
    }

    #[tokio::test]
    async fn test_prune_older_than() {
        let db = setup_test_db().await;
        db.save_item(&item("at://old", "alice", 600)).await.unwrap();
        db.save_item(&item("at://new", "alice", 1)).await.unwrap();

        let cutoff = Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap();
        assert_eq!(db.prune_older_than(cutoff).await.unwrap(), 1);
        assert_eq!(db.count_items().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_basic_functionality() {
        let db = setup_test_db().await;

        db.save_setting("test_key", "test_value")
            .await
            .expect("Failed to save setting");
        let value = db
            .get_setting("test_key")
            .await
            .expect("Failed to get setting");
        assert_eq!(value, Some("test_value".to_string()));

        db.set_metadata("test_key", "replaced").await.unwrap();
        assert_eq!(
            db.get_metadata("test_key").await.unwrap(),
            Some("replaced".to_string())
        );
        assert_eq!(db.get_metadata("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_matches_database_contract() {
        let store = MemoryStore::new();
        let post = item("at://a/1", "alice", 0);

        assert_eq!(store.insert_if_absent(&post).await.unwrap(), InsertOutcome::Saved);
        assert_eq!(
            store.insert_if_absent(&post).await.unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(store.len().await, 1);

        store.insert_if_absent(&item("at://b/1", "bob", 5)).await.unwrap();
        let bob = store
            .query(&ItemQuery::default().by_author("bob"))
            .await
            .unwrap();
        assert_eq!(bob.len(), 1);
        assert!(bob[0].indexed_at.is_some());
    }
}
