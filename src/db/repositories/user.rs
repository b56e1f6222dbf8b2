//! User repository
//!
//! Database operations for user accounts: lookup by username for login,
//! by api key for worker authentication, plus the focused writes the
//! signup and extension flows need.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

use super::{RepoError, RepoResult};
use crate::db::DbPool;
use crate::models::{User, UserStatus};

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. Duplicate usernames are a `UniqueViolation`.
    async fn create(&self, user: &User) -> RepoResult<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> RepoResult<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> RepoResult<Option<User>>;

    /// Get user by worker API key
    async fn get_by_api_key(&self, api_key: &str) -> RepoResult<Option<User>>;

    /// Persist a freshly generated API key. Collisions with another
    /// account's key are a `UniqueViolation`.
    async fn set_api_key(&self, id: i64, api_key: &str) -> RepoResult<()>;

    /// Overwrite the subscription expiry and granted days.
    async fn set_expiry(
        &self,
        id: i64,
        expires_at: Option<DateTime<Utc>>,
        day: i64,
    ) -> RepoResult<()>;

    /// Delete a user row (the signup saga's compensating action).
    async fn delete(&self, id: i64) -> RepoResult<()>;
}

/// sqlx-based user repository.
pub struct SqlxUserRepository {
    pool: DbPool,
}

impl SqlxUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> RepoResult<User> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, status, expires_at, day, api_key, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.status.to_string())
        .bind(user.expires_at)
        .bind(user.day)
        .bind(&user.api_key)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::from_sqlx(e, "Failed to create user"))?;

        Ok(User {
            id: result.last_insert_rowid(),
            created_at: now,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, status, expires_at, day, api_key, created_at
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get user by ID")?;

        row.map(|r| row_to_user(&r)).transpose().map_err(Into::into)
    }

    async fn get_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, status, expires_at, day, api_key, created_at
             FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get user by username")?;

        row.map(|r| row_to_user(&r)).transpose().map_err(Into::into)
    }

    async fn get_by_api_key(&self, api_key: &str) -> RepoResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, status, expires_at, day, api_key, created_at
             FROM users WHERE api_key = ?",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get user by API key")?;

        row.map(|r| row_to_user(&r)).transpose().map_err(Into::into)
    }

    async fn set_api_key(&self, id: i64, api_key: &str) -> RepoResult<()> {
        sqlx::query("UPDATE users SET api_key = ? WHERE id = ?")
            .bind(api_key)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::from_sqlx(e, "Failed to set API key"))?;
        Ok(())
    }

    async fn set_expiry(
        &self,
        id: i64,
        expires_at: Option<DateTime<Utc>>,
        day: i64,
    ) -> RepoResult<()> {
        sqlx::query("UPDATE users SET expires_at = ?, day = ? WHERE id = ?")
            .bind(expires_at)
            .bind(day)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to set user expiry")?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> RepoResult<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete user")?;
        Ok(())
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<User> {
    let status: String = row.try_get("status")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        status: UserStatus::from_str(&status)?,
        expires_at: row.try_get("expires_at")?,
        day: row.try_get("day")?,
        api_key: row.try_get("api_key")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, migrations};
    use chrono::Duration;

    async fn repo() -> SqlxUserRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        SqlxUserRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = repo().await;
        let mut user = User::new("alice".to_string(), Some("hash".to_string()));
        user.expires_at = Some(Utc::now() + Duration::days(30));
        user.day = 30;

        let created = repo.create(&user).await.unwrap();
        assert!(created.id > 0);

        let found = repo.get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.password_hash.as_deref(), Some("hash"));
        assert_eq!(found.day, 30);
        assert!(repo.get_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_is_unique_violation() {
        let repo = repo().await;
        let user = User::new("alice".to_string(), None);
        repo.create(&user).await.unwrap();

        match repo.create(&user).await {
            Err(RepoError::UniqueViolation) => {}
            other => panic!("expected UniqueViolation, got {:?}", other.map(|u| u.id)),
        }
    }

    #[tokio::test]
    async fn test_api_key_set_and_lookup() {
        let repo = repo().await;
        let a = repo.create(&User::new("a".into(), None)).await.unwrap();
        let b = repo.create(&User::new("b".into(), None)).await.unwrap();

        repo.set_api_key(a.id, "sk_aaaa").await.unwrap();
        let found = repo.get_by_api_key("sk_aaaa").await.unwrap().unwrap();
        assert_eq!(found.id, a.id);

        // Same key on another account violates uniqueness
        match repo.set_api_key(b.id, "sk_aaaa").await {
            Err(RepoError::UniqueViolation) => {}
            other => panic!("expected UniqueViolation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_set_expiry_and_delete() {
        let repo = repo().await;
        let user = repo.create(&User::new("a".into(), None)).await.unwrap();

        let expiry = Utc::now() + Duration::days(7);
        repo.set_expiry(user.id, Some(expiry), 7).await.unwrap();
        let found = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(found.day, 7);
        assert!(found.expires_at.is_some());

        repo.delete(user.id).await.unwrap();
        assert!(repo.get_by_id(user.id).await.unwrap().is_none());
    }
}
