//! Notification store — the authoritative collaborator behind the
//! realtime layer.
//!
//! `MemoryStore` is process-local (tests, local dev without Postgres);
//! `db::PgStore` is the Postgres implementation.

use std::cmp::Reverse;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{NewNotification, Notification, UserId};

/// Hard cap on a single page, for both socket fetches and REST lists.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page selector for list queries. Results are always newest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
    pub unread_only: bool,
}

impl Page {
    /// Page from client-supplied numbers. A missing or non-positive limit
    /// means `default_limit`; limits above `MAX_PAGE_SIZE` are capped and
    /// negative offsets count as zero.
    pub fn clamped(limit: Option<i64>, offset: Option<i64>, default_limit: u32, unread_only: bool) -> Self {
        Self {
            limit: limit
                .filter(|l| *l > 0)
                .map(|l| l.min(i64::from(MAX_PAGE_SIZE)) as u32)
                .unwrap_or(default_limit),
            offset: offset.unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32,
            unread_only,
        }
    }
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, new: NewNotification) -> Result<Notification, StoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Notification>, StoreError>;

    /// Unread notifications of `user_id`, newest first, at most `limit`.
    async fn get_unread(&self, user_id: &UserId, limit: u32) -> Result<Vec<Notification>, StoreError>;

    async fn get_page(&self, user_id: &UserId, page: Page) -> Result<Vec<Notification>, StoreError>;

    async fn count(&self, user_id: &UserId, unread_only: bool) -> Result<u64, StoreError>;

    /// Set the read flag. `NotFound` if `id` does not exist.
    async fn set_read(&self, id: &str) -> Result<Notification, StoreError>;

    /// Mark every unread notification of `user_id` read; returns how many changed.
    async fn set_all_read(&self, user_id: &UserId) -> Result<u64, StoreError>;

    /// `NotFound` if `id` does not exist.
    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError>;
}

// ═══════════════════════════════════════════════════════════════
// In-memory store
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<Notification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed record (fixtures with explicit timestamps).
    pub async fn insert(&self, notification: Notification) {
        self.rows.write().await.push(notification);
    }

    fn select<'a>(
        rows: &'a [Notification],
        user_id: &'a UserId,
        unread_only: bool,
    ) -> Vec<&'a Notification> {
        let mut hits: Vec<&Notification> = rows
            .iter()
            .filter(|n| &n.user_id == user_id && (!unread_only || !n.read))
            .collect();
        hits.sort_by_key(|n| (Reverse(n.created_at), Reverse(n.id.clone())));
        hits
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            kind: new.kind,
            title: new.title,
            message: new.message,
            read: false,
            metadata: new.metadata,
            action_url: new.action_url,
            created_at: Utc::now(),
        };
        self.rows.write().await.push(notification.clone());
        Ok(notification)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Notification>, StoreError> {
        Ok(self.rows.read().await.iter().find(|n| n.id == id).cloned())
    }

    async fn get_unread(&self, user_id: &UserId, limit: u32) -> Result<Vec<Notification>, StoreError> {
        let rows = self.rows.read().await;
        Ok(Self::select(&rows, user_id, true)
            .into_iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_page(&self, user_id: &UserId, page: Page) -> Result<Vec<Notification>, StoreError> {
        let rows = self.rows.read().await;
        Ok(Self::select(&rows, user_id, page.unread_only)
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self, user_id: &UserId, unread_only: bool) -> Result<u64, StoreError> {
        let rows = self.rows.read().await;
        Ok(Self::select(&rows, user_id, unread_only).len() as u64)
    }

    async fn set_read(&self, id: &str) -> Result<Notification, StoreError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        row.read = true;
        Ok(row.clone())
    }

    async fn set_all_read(&self, user_id: &UserId) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let mut changed = 0;
        for row in rows.iter_mut().filter(|n| &n.user_id == user_id && !n.read) {
            row.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|n| n.id != id);
        if rows.len() == before {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }
}
