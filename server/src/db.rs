//! Postgres-backed notification store.
//!
//! Uses sqlx with compile-time-unchecked queries (runtime-checked)
//! to avoid needing a live DB at compile time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{NotificationStore, Page};
use crate::types::{NewNotification, Notification, UserId};

const COLUMNS: &str =
    "id, user_id, type AS kind, title, message, read, metadata, action_url, created_at";

/// Row returned from notifications table queries.
#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    kind: String,
    title: String,
    message: String,
    read: bool,
    metadata: Option<JsonValue>,
    action_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse()
            .map_err(|e: String| StoreError::Db(sqlx::Error::Decode(e.into())))?;
        Ok(Notification {
            id: row.id,
            user_id: UserId::new(row.user_id),
            kind,
            title: row.title,
            message: row.message,
            read: row.read,
            metadata: row.metadata,
            action_url: row.action_url,
            created_at: row.created_at,
        })
    }
}

fn convert(rows: Vec<NotificationRow>) -> Result<Vec<Notification>, StoreError> {
    rows.into_iter().map(Notification::try_from).collect()
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply the schema. Re-running on an existing schema is a no-op.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;

        info!("running migrations");
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&pool)
            .await?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn create(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let row: NotificationRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO notifications (id, user_id, type, title, message, metadata, action_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(new.user_id.as_str())
        .bind(new.kind.as_str())
        .bind(&new.title)
        .bind(&new.message)
        .bind(&new.metadata)
        .bind(&new.action_url)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Notification>, StoreError> {
        let row: Option<NotificationRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM notifications WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Notification::try_from).transpose()
    }

    async fn get_unread(&self, user_id: &UserId, limit: u32) -> Result<Vec<Notification>, StoreError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM notifications
            WHERE user_id = $1 AND NOT read
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(user_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn get_page(&self, user_id: &UserId, page: Page) -> Result<Vec<Notification>, StoreError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM notifications
            WHERE user_id = $1 AND ($2 = FALSE OR NOT read)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id.as_str())
        .bind(page.unread_only)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn count(&self, user_id: &UserId, unread_only: bool) -> Result<u64, StoreError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE user_id = $1 AND ($2 = FALSE OR NOT read)
            "#,
        )
        .bind(user_id.as_str())
        .bind(unread_only)
        .fetch_one(&self.pool)
        .await?;
        Ok(total.max(0) as u64)
    }

    async fn set_read(&self, id: &str) -> Result<Notification, StoreError> {
        let row: Option<NotificationRow> = sqlx::query_as(&format!(
            "UPDATE notifications SET read = TRUE WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| StoreError::NotFound(id.to_owned()))?
            .try_into()
    }

    async fn set_all_read(&self, user_id: &UserId) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE user_id = $1 AND NOT read")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }
}
