//! License repository
//!
//! The activation write carries its precondition in the WHERE clause: a
//! license flips to active only while still inactive, so concurrent
//! redemptions of the same key cannot both succeed.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

use super::{RepoError, RepoResult};
use crate::db::DbPool;
use crate::models::{License, LicenseStatus};

/// License repository trait
#[async_trait]
pub trait LicenseRepository: Send + Sync {
    /// Insert a new license. Duplicate keys are a `UniqueViolation`.
    async fn create(&self, license: &License) -> RepoResult<License>;

    /// Get license by key
    async fn get_by_key(&self, key: &str) -> RepoResult<Option<License>>;

    /// Activate an inactive license, binding it to `user_id` and stamping
    /// `activated_at`. Returns `UniqueViolation` if the license was no
    /// longer inactive (someone redeemed it first).
    async fn activate(
        &self,
        id: i64,
        user_id: i64,
        activated_at: DateTime<Utc>,
    ) -> RepoResult<()>;
}

/// sqlx-based license repository.
pub struct SqlxLicenseRepository {
    pool: DbPool,
}

impl SqlxLicenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn LicenseRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LicenseRepository for SqlxLicenseRepository {
    async fn create(&self, license: &License) -> RepoResult<License> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO licenses (key, days, status, user_id, activated_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&license.key)
        .bind(license.days)
        .bind(license.status.to_string())
        .bind(license.user_id)
        .bind(license.activated_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::from_sqlx(e, "Failed to create license"))?;

        Ok(License {
            id: result.last_insert_rowid(),
            created_at: now,
            ..license.clone()
        })
    }

    async fn get_by_key(&self, key: &str) -> RepoResult<Option<License>> {
        let row = sqlx::query(
            "SELECT id, key, days, status, user_id, activated_at, created_at
             FROM licenses WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get license by key")?;

        row.map(|r| row_to_license(&r))
            .transpose()
            .map_err(Into::into)
    }

    async fn activate(
        &self,
        id: i64,
        user_id: i64,
        activated_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE licenses SET status = 'active', user_id = ?, activated_at = ?
             WHERE id = ? AND status = 'inactive'",
        )
        .bind(user_id)
        .bind(activated_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to activate license")?;

        if result.rows_affected() == 0 {
            // Lost the race: the license was redeemed between read and write.
            return Err(RepoError::UniqueViolation);
        }
        Ok(())
    }
}

fn row_to_license(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<License> {
    let status: String = row.try_get("status")?;
    Ok(License {
        id: row.try_get("id")?,
        key: row.try_get("key")?,
        days: row.try_get("days")?,
        status: LicenseStatus::from_str(&status)?,
        user_id: row.try_get("user_id")?,
        activated_at: row.try_get("activated_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, migrations};

    async fn repo() -> SqlxLicenseRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        SqlxLicenseRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = repo().await;
        let created = repo
            .create(&License::new("AAAA-BBBB".into(), 30))
            .await
            .unwrap();
        assert!(created.id > 0);

        let found = repo.get_by_key("AAAA-BBBB").await.unwrap().unwrap();
        assert_eq!(found.days, 30);
        assert_eq!(found.status, LicenseStatus::Inactive);
        assert!(repo.get_by_key("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activate_once() {
        use crate::db::repositories::{SqlxUserRepository, UserRepository};
        use crate::models::User;

        // Activation references the users table, so the owners must exist
        let pool = create_pool("sqlite::memory:").await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let users = SqlxUserRepository::new(pool.clone());
        let alice = users.create(&User::new("alice".into(), None)).await.unwrap();
        let bob = users.create(&User::new("bob".into(), None)).await.unwrap();

        let repo = SqlxLicenseRepository::new(pool);
        let license = repo
            .create(&License::new("AAAA-BBBB".into(), 30))
            .await
            .unwrap();

        repo.activate(license.id, alice.id, Utc::now()).await.unwrap();
        let found = repo.get_by_key("AAAA-BBBB").await.unwrap().unwrap();
        assert_eq!(found.status, LicenseStatus::Active);
        assert_eq!(found.user_id, Some(alice.id));
        assert!(found.activated_at.is_some());

        // Second activation is rejected as a conflict
        match repo.activate(license.id, bob.id, Utc::now()).await {
            Err(RepoError::UniqueViolation) => {}
            other => panic!("expected UniqueViolation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_key_is_unique_violation() {
        let repo = repo().await;
        repo.create(&License::new("AAAA".into(), 1)).await.unwrap();
        match repo.create(&License::new("AAAA".into(), 1)).await {
            Err(RepoError::UniqueViolation) => {}
            other => panic!("expected UniqueViolation, got {:?}", other.map(|l| l.id)),
        }
    }
}
