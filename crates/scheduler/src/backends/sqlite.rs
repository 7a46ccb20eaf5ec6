//! SQLite backend implementation
//!
//! Provides persistent storage using SQLite with WAL mode for concurrency.
//! Every sqlx failure is translated into a [`PersistenceFailure`] and
//! classified before it leaves this module.

use crate::{
    ContentType, PageAccount, PostFilter, PostStats, PostStatus, PostStore, ScheduledPost,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagepilot_core_resilience::{
    classify, ClassifiedError, Lifecycle, PersistenceFailure, RawFailure, Result,
};
use sqlx::error::ErrorKind as DbErrorKind;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

const POST_COLUMNS: &str = "id, user_id, facebook_account_id, content, content_type, media_urls, \
     hashtags, scheduled_for, status, published_content_id, error_message, published_at, \
     retry_count, last_retry_at, metadata, created_at, updated_at";

/// SQLite-backed post store
pub struct SqliteStore {
    pool: SqlitePool,
    url: String,
}

impl SqliteStore {
    /// Build a store without touching the database
    ///
    /// Connections are opened lazily; call [`Lifecycle::connect`] (usually
    /// through `connect_with_retry`) to create the file and run migrations.
    pub fn new(path: &str) -> Result<Self> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite://{}", path)
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| db_error(&e))?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .create_if_missing(true);

        // Every connection to `:memory:` is its own database
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy_with(options);

        Ok(Self { pool, url })
    }

    /// Open or create a SQLite database and run migrations
    pub async fn open(path: &str) -> Result<Self> {
        let store = Self::new(path)?;
        store.connect().await?;
        Ok(store)
    }

    /// Get the underlying pool (for advanced usage)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Map a sqlx failure onto the persistence taxonomy
pub fn persistence_failure(err: &sqlx::Error) -> PersistenceFailure {
    match err {
        sqlx::Error::Database(db) => match db.kind() {
            DbErrorKind::UniqueViolation => PersistenceFailure::UniqueViolation {
                fields: unique_fields(db.message()),
            },
            DbErrorKind::ForeignKeyViolation => PersistenceFailure::ForeignKeyViolation {
                constraint: db.constraint().map(str::to_string),
            },
            DbErrorKind::NotNullViolation | DbErrorKind::CheckViolation => {
                PersistenceFailure::Validation {
                    messages: vec![db.message().to_string()],
                }
            }
            _ => PersistenceFailure::Other {
                name: "DatabaseError".to_string(),
                message: db.message().to_string(),
            },
        },
        sqlx::Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            PersistenceFailure::ConnectionRefused
        }
        sqlx::Error::Io(io) => PersistenceFailure::Connection(io.to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            PersistenceFailure::Connection(err.to_string())
        }
        other => PersistenceFailure::Other {
            name: error_name(other).to_string(),
            message: other.to_string(),
        },
    }
}

/// Classify a sqlx failure
pub fn db_error(err: &sqlx::Error) -> ClassifiedError {
    classify(RawFailure::Persistence(persistence_failure(err)))
}

/// "UNIQUE constraint failed: scheduled_posts.id, scheduled_posts.user_id" -> ["id", "user_id"]
fn unique_fields(message: &str) -> Vec<String> {
    message
        .split_once(':')
        .map(|(_, cols)| {
            cols.split(',')
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(|c| c.rsplit('.').next().unwrap_or(c).to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn error_name(err: &sqlx::Error) -> &'static str {
    match err {
        sqlx::Error::Configuration(_) => "ConfigurationError",
        sqlx::Error::RowNotFound => "RowNotFound",
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => "DecodeError",
        sqlx::Error::Protocol(_) => "ProtocolError",
        sqlx::Error::Migrate(_) => "MigrateError",
        _ => "SqlxError",
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(column: &str, ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        ClassifiedError::database(format!("Invalid timestamp in column {}", column))
    })
}

fn opt_from_millis(column: &str, ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(|v| from_millis(column, v)).transpose()
}

fn decode_json<T: serde::de::DeserializeOwned>(column: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        ClassifiedError::database(format!("Corrupt JSON in column {}: {}", column, e))
    })
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| ClassifiedError::validation(format!("Unserializable value: {}", e)))
}

// Helper to convert SqliteRow to ScheduledPost
fn row_to_post(row: &SqliteRow) -> Result<ScheduledPost> {
    let get_str = |col: &str| row.try_get::<String, _>(col).map_err(|e| db_error(&e));
    let get_opt_str = |col: &str| {
        row.try_get::<Option<String>, _>(col)
            .map_err(|e| db_error(&e))
    };
    let get_i64 = |col: &str| row.try_get::<i64, _>(col).map_err(|e| db_error(&e));
    let get_opt_i64 = |col: &str| {
        row.try_get::<Option<i64>, _>(col)
            .map_err(|e| db_error(&e))
    };

    Ok(ScheduledPost {
        id: get_str("id")?,
        user_id: get_str("user_id")?,
        facebook_account_id: get_str("facebook_account_id")?,
        content: get_str("content")?,
        content_type: ContentType::from_str(&get_str("content_type")?)?,
        media_urls: decode_json("media_urls", &get_str("media_urls")?)?,
        hashtags: decode_json("hashtags", &get_str("hashtags")?)?,
        scheduled_for: from_millis("scheduled_for", get_i64("scheduled_for")?)?,
        status: PostStatus::from_str(&get_str("status")?)?,
        published_content_id: get_opt_str("published_content_id")?,
        error_message: get_opt_str("error_message")?,
        published_at: opt_from_millis("published_at", get_opt_i64("published_at")?)?,
        retry_count: get_i64("retry_count")?.max(0) as u32,
        last_retry_at: opt_from_millis("last_retry_at", get_opt_i64("last_retry_at")?)?,
        metadata: decode_json("metadata", &get_str("metadata")?)?,
        created_at: from_millis("created_at", get_i64("created_at")?)?,
        updated_at: from_millis("updated_at", get_i64("updated_at")?)?,
    })
}

fn row_to_account(row: &SqliteRow) -> Result<PageAccount> {
    let account = PageAccount {
        id: row.try_get("id").map_err(|e| db_error(&e))?,
        user_id: row.try_get("user_id").map_err(|e| db_error(&e))?,
        page_id: row.try_get("page_id").map_err(|e| db_error(&e))?,
        page_name: row.try_get("page_name").map_err(|e| db_error(&e))?,
        page_access_token: row.try_get("page_access_token").map_err(|e| db_error(&e))?,
    };
    Ok(account)
}

#[async_trait]
impl PostStore for SqliteStore {
    async fn insert(&self, post: &ScheduledPost) -> Result<()> {
        let sql = format!(
            "INSERT INTO scheduled_posts ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            POST_COLUMNS
        );

        sqlx::query(&sql)
            .bind(&post.id)
            .bind(&post.user_id)
            .bind(&post.facebook_account_id)
            .bind(&post.content)
            .bind(post.content_type.to_string())
            .bind(encode_json(&post.media_urls)?)
            .bind(encode_json(&post.hashtags)?)
            .bind(to_millis(post.scheduled_for))
            .bind(post.status.as_str())
            .bind(&post.published_content_id)
            .bind(&post.error_message)
            .bind(post.published_at.map(to_millis))
            .bind(post.retry_count as i64)
            .bind(post.last_retry_at.map(to_millis))
            .bind(encode_json(&post.metadata)?)
            .bind(to_millis(post.created_at))
            .bind(to_millis(post.updated_at))
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(&e))?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduledPost>> {
        let sql = format!("SELECT {} FROM scheduled_posts WHERE id = ?", POST_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error(&e))?;

        row.as_ref().map(row_to_post).transpose()
    }

    async fn find_due_pending(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>> {
        let sql = format!(
            "SELECT {} FROM scheduled_posts
             WHERE status = 'pending' AND scheduled_for <= ?
             ORDER BY scheduled_for ASC, created_at ASC
             LIMIT ?",
            POST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(to_millis(now))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(&e))?;

        rows.iter().map(row_to_post).collect()
    }

    async fn save(&self, post: &ScheduledPost) -> Result<()> {
        let result = sqlx::query(
            "UPDATE scheduled_posts
             SET content = ?, content_type = ?, media_urls = ?, hashtags = ?,
                 scheduled_for = ?, status = ?, published_content_id = ?,
                 error_message = ?, published_at = ?, retry_count = ?,
                 last_retry_at = ?, metadata = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&post.content)
        .bind(post.content_type.to_string())
        .bind(encode_json(&post.media_urls)?)
        .bind(encode_json(&post.hashtags)?)
        .bind(to_millis(post.scheduled_for))
        .bind(post.status.as_str())
        .bind(&post.published_content_id)
        .bind(&post.error_message)
        .bind(post.published_at.map(to_millis))
        .bind(post.retry_count as i64)
        .bind(post.last_retry_at.map(to_millis))
        .bind(encode_json(&post.metadata)?)
        .bind(to_millis(post.updated_at))
        .bind(&post.id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error(&e))?;

        if result.rows_affected() == 0 {
            return Err(ClassifiedError::not_found("Post not found"));
        }
        Ok(())
    }

    async fn try_claim(&self, id: &str, now: DateTime<Utc>) -> Result<Option<ScheduledPost>> {
        // Atomic claim: only a row still in 'pending' is updated
        let sql = format!(
            "UPDATE scheduled_posts
             SET status = 'processing',
                 retry_count = retry_count + 1,
                 last_retry_at = ?,
                 updated_at = ?
             WHERE id = ? AND status = 'pending'
             RETURNING {}",
            POST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(to_millis(now))
            .bind(to_millis(now))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error(&e))?;

        row.as_ref().map(row_to_post).transpose()
    }

    async fn cancel_pending(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scheduled_posts SET status = 'cancelled', updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(to_millis(now))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error(&e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_stale_processing(&self, before: DateTime<Utc>) -> Result<Vec<ScheduledPost>> {
        let sql = format!(
            "SELECT {} FROM scheduled_posts
             WHERE status = 'processing'
               AND (last_retry_at IS NULL OR last_retry_at < ?)
             ORDER BY scheduled_for ASC",
            POST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(to_millis(before))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(&e))?;

        rows.iter().map(row_to_post).collect()
    }

    async fn list(&self, filter: &PostFilter) -> Result<Vec<ScheduledPost>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM scheduled_posts WHERE 1 = 1", POST_COLUMNS));

        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(account_id) = &filter.account_id {
            query
                .push(" AND facebook_account_id = ")
                .push_bind(account_id.clone());
        }
        if let Some(user_id) = &filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id.clone());
        }
        query.push(" ORDER BY scheduled_for ASC, created_at ASC");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(&e))?;

        rows.iter().map(row_to_post).collect()
    }

    async fn stats(&self) -> Result<PostStats> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM scheduled_posts GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(&e))?;

        let mut stats = PostStats::default();
        for row in &rows {
            let status: String = row.try_get("status").map_err(|e| db_error(&e))?;
            let count: i64 = row.try_get("count").map_err(|e| db_error(&e))?;
            stats.record(PostStatus::from_str(&status)?, count.max(0) as u64);
        }
        Ok(stats)
    }

    async fn upsert_account(&self, account: &PageAccount) -> Result<()> {
        let now = to_millis(Utc::now());
        sqlx::query(
            "INSERT INTO page_accounts (id, user_id, page_id, page_name, page_access_token, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                 user_id = excluded.user_id,
                 page_id = excluded.page_id,
                 page_name = excluded.page_name,
                 page_access_token = excluded.page_access_token,
                 updated_at = excluded.updated_at",
        )
        .bind(&account.id)
        .bind(&account.user_id)
        .bind(&account.page_id)
        .bind(&account.page_name)
        .bind(&account.page_access_token)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error(&e))?;

        Ok(())
    }

    async fn account(&self, id: &str) -> Result<Option<PageAccount>> {
        let row = sqlx::query(
            "SELECT id, user_id, page_id, page_name, page_access_token FROM page_accounts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error(&e))?;

        row.as_ref().map(row_to_account).transpose()
    }
}

#[async_trait]
impl Lifecycle for SqliteStore {
    fn name(&self) -> &str {
        "database"
    }

    async fn connect(&self) -> Result<()> {
        debug!(url = %self.url, "Connecting to SQLite");

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(&e))?;

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ClassifiedError::database(format!("Failed to run migrations: {}", e)))?;

        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(&e))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_fields() {
        assert_eq!(
            unique_fields("UNIQUE constraint failed: scheduled_posts.id"),
            vec!["id".to_string()]
        );
        assert_eq!(
            unique_fields("UNIQUE constraint failed: page_accounts.user_id, page_accounts.page_id"),
            vec!["user_id".to_string(), "page_id".to_string()]
        );
        assert!(unique_fields("no columns here").is_empty());
    }

    #[test]
    fn test_pool_errors_are_connection_failures() {
        assert!(matches!(
            persistence_failure(&sqlx::Error::PoolTimedOut),
            PersistenceFailure::Connection(_)
        ));

        let refused = sqlx::Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert_eq!(persistence_failure(&refused), PersistenceFailure::ConnectionRefused);
        assert_eq!(db_error(&refused).message, "Database server unavailable");
    }

    #[test]
    fn test_other_errors_are_generic() {
        let err = db_error(&sqlx::Error::RowNotFound);
        assert_eq!(err.kind, pagepilot_core_resilience::ErrorKind::DatabaseError);
        assert_eq!(err.message, "Database operation failed");
    }

    #[test]
    fn test_millis_round_trip() {
        let now = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();
        assert_eq!(from_millis("t", to_millis(now)).unwrap(), now);
        assert!(from_millis("t", i64::MAX).is_err());
    }
}
