pub mod memory;
mod tests;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use skyfeed_core::{FeedItem, InsertOutcome, ItemQuery, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Persistence seam used by the streaming sink. `uri` is the primary key;
/// inserting a known uri must report `Duplicate`, never overwrite.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn insert_if_absent(&self, item: &FeedItem) -> Result<InsertOutcome, StoreError>;

    async fn query(&self, query: &ItemQuery) -> Result<Vec<FeedItem>, StoreError>;

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

pub struct Database {
    connection_string: String,
    pool: Option<SqlitePool>,
}

#[derive(Debug, FromRow)]
struct ItemRow {
    uri: String,
    cid: String,
    author_handle: String,
    author_did: String,
    text: String,
    created_at: i64,
    like_count: i64,
    repost_count: i64,
    reply_count: i64,
    indexed_at: i64,
}

impl ItemRow {
    fn into_item(self) -> Result<FeedItem, StoreError> {
        Ok(FeedItem {
            created_at: from_millis(self.created_at, "created_at")?,
            indexed_at: Some(from_millis(self.indexed_at, "indexed_at")?),
            uri: self.uri,
            cid: self.cid,
            author_handle: self.author_handle,
            author_did: self.author_did,
            text: self.text,
            like_count: to_count(self.like_count),
            repost_count: to_count(self.repost_count),
            reply_count: to_count(self.reply_count),
        })
    }
}

impl Database {
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            pool: None,
        }
    }

    /// Creates the parent directory, connects and migrates.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::ConnectionFailed {
                    reason: format!("cannot create {}: {e}", parent.display()),
                })?;
            }
        }

        let mut db = Self::new(format!("sqlite://{}", path.display()));
        db.connect().await?;
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn connect(&mut self) -> Result<(), StoreError> {
        let options = SqliteConnectOptions::from_str(&self.connection_string)
            .map_err(|e| StoreError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // Single writer: the polling task is the only one inserting
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Connected to database {}", self.connection_string);
        self.pool = Some(pool);
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(self.pool()?)
            .await
            .map_err(|e| StoreError::MigrationFailed {
                migration: e.to_string(),
            })?;
        debug!("Database migrations applied");
        Ok(())
    }

    fn pool(&self) -> Result<&SqlitePool, StoreError> {
        self.pool.as_ref().ok_or_else(|| StoreError::ConnectionFailed {
            reason: "database not connected".to_string(),
        })
    }

    pub async fn save_item(&self, item: &FeedItem) -> Result<InsertOutcome, StoreError> {
        let indexed_at = item.indexed_at.unwrap_or_else(Utc::now);
        let result = sqlx::query(
            "INSERT INTO items (uri, cid, author_handle, author_did, text, created_at, \
             like_count, repost_count, reply_count, indexed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(uri) DO NOTHING",
        )
        .bind(&item.uri)
        .bind(&item.cid)
        .bind(&item.author_handle)
        .bind(&item.author_did)
        .bind(&item.text)
        .bind(item.created_at.timestamp_millis())
        .bind(i64::from(item.like_count))
        .bind(i64::from(item.repost_count))
        .bind(i64::from(item.reply_count))
        .bind(indexed_at.timestamp_millis())
        .execute(self.pool()?)
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Saved)
        }
    }

    pub async fn get_items(&self, query: &ItemQuery) -> Result<Vec<FeedItem>, StoreError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT uri, cid, author_handle, author_did, text, created_at, \
             like_count, repost_count, reply_count, indexed_at FROM items WHERE 1 = 1",
        );
        if let Some(after) = query.created_after {
            builder
                .push(" AND created_at >= ")
                .push_bind(after.timestamp_millis());
        }
        if let Some(before) = query.created_before {
            builder
                .push(" AND created_at <= ")
                .push_bind(before.timestamp_millis());
        }
        if let Some(author) = &query.author_handle {
            builder.push(" AND author_handle = ").push_bind(author.clone());
        }
        builder.push(" ORDER BY created_at ASC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows: Vec<ItemRow> = builder
            .build_query_as()
            .fetch_all(self.pool()?)
            .await
            .map_err(classify)?;

        rows.into_iter().map(ItemRow::into_item).collect()
    }

    pub async fn count_items(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
            .fetch_one(self.pool()?)
            .await
            .map_err(classify)?;
        Ok(count)
    }

    /// Deletes items created before `before`, returning how many went.
    pub async fn prune_older_than(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM items WHERE created_at < ?")
            .bind(before.timestamp_millis())
            .execute(self.pool()?)
            .await
            .map_err(classify)?;
        info!("Pruned {} items older than {}", result.rows_affected(), before);
        Ok(result.rows_affected())
    }

    pub async fn save_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO metadata (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp_millis())
        .execute(self.pool()?)
        .await
        .map_err(classify)?;
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool()?)
            .await
            .map_err(classify)?;
        Ok(row.map(|(value,)| value))
    }
}

#[async_trait]
impl ItemStore for Database {
    async fn insert_if_absent(&self, item: &FeedItem) -> Result<InsertOutcome, StoreError> {
        self.save_item(item).await
    }

    async fn query(&self, query: &ItemQuery) -> Result<Vec<FeedItem>, StoreError> {
        self.get_items(query).await
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.get_setting(key).await
    }

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.save_setting(key, value).await
    }
}

fn classify(error: sqlx::Error) -> StoreError {
    if let Some(db_error) = error.as_database_error() {
        if db_error.is_unique_violation() {
            return StoreError::ConstraintViolation {
                constraint: db_error.message().to_string(),
            };
        }
        if db_error.message().contains("database is locked") {
            return StoreError::DatabaseLocked;
        }
    }
    StoreError::Sql(error)
}

/// Clamps a stored counter into `u32`, saturating at both ends.
fn to_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn from_millis(millis: i64, column: &str) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StoreError::QueryFailed {
            query: format!("{column} holds an out of range timestamp: {millis}"),
        })
}
