//! Notification repository

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

use super::RepoResult;
use crate::db::DbPool;
use crate::models::Notification;

/// Notification repository trait
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// List currently active banners, newest first.
    async fn list_active(&self) -> RepoResult<Vec<Notification>>;

    /// Create a new banner.
    async fn create(&self, notification: &Notification) -> RepoResult<Notification>;

    /// Activate or deactivate a banner. Returns whether a row changed.
    async fn set_active(&self, id: i64, active: bool) -> RepoResult<bool>;
}

/// sqlx-based notification repository.
pub struct SqlxNotificationRepository {
    pool: DbPool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn NotificationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn list_active(&self) -> RepoResult<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT id, title, body, level, active, created_at
             FROM notifications WHERE active = 1 ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list notifications")?;

        rows.iter()
            .map(row_to_notification)
            .collect::<anyhow::Result<_>>()
            .map_err(Into::into)
    }

    async fn create(&self, notification: &Notification) -> RepoResult<Notification> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (title, body, level, active, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.level)
        .bind(notification.active)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create notification")?;

        Ok(Notification {
            id: result.last_insert_rowid(),
            created_at: now,
            ..notification.clone()
        })
    }

    async fn set_active(&self, id: i64, active: bool) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE notifications SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update notification")?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_notification(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Notification> {
    Ok(Notification {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        level: row.try_get("level")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, migrations};

    async fn repo() -> SqlxNotificationRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        SqlxNotificationRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_list_deactivate() {
        let repo = repo().await;
        let banner = repo
            .create(&Notification::new(
                "Maintenance".into(),
                "Sunday downtime".into(),
                "warning".into(),
            ))
            .await
            .unwrap();

        assert_eq!(repo.list_active().await.unwrap().len(), 1);

        assert!(repo.set_active(banner.id, false).await.unwrap());
        assert_eq!(repo.list_active().await.unwrap().len(), 0);
        assert!(!repo.set_active(9999, false).await.unwrap());
    }
}
