//! Machine repository
//!
//! Worker machine rows, scoped to their owning user in every query so a
//! caller can never see or touch another user's machines.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

use super::{RepoError, RepoResult};
use crate::db::DbPool;
use crate::models::Machine;

/// Machine repository trait
#[async_trait]
pub trait MachineRepository: Send + Sync {
    /// Register a machine. A duplicate hwid for the same owner is a
    /// `UniqueViolation`.
    async fn create(&self, machine: &Machine) -> RepoResult<Machine>;

    /// List the owner's machines, most recently seen first.
    async fn list_by_user(&self, user_id: i64) -> RepoResult<Vec<Machine>>;

    /// Get a machine only if `user_id` owns it.
    async fn get_owned(&self, id: i64, user_id: i64) -> RepoResult<Option<Machine>>;

    /// Rename an owned machine. Returns whether a row was updated.
    async fn rename(&self, id: i64, user_id: i64, name: &str) -> RepoResult<bool>;

    /// Delete an owned machine. Returns whether a row was deleted.
    async fn delete(&self, id: i64, user_id: i64) -> RepoResult<bool>;

    /// Record a worker heartbeat by owner + hwid. Returns the machine if known.
    async fn touch(
        &self,
        user_id: i64,
        hwid: &str,
        seen_at: DateTime<Utc>,
    ) -> RepoResult<Option<Machine>>;
}

/// sqlx-based machine repository.
pub struct SqlxMachineRepository {
    pool: DbPool,
}

impl SqlxMachineRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn MachineRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl MachineRepository for SqlxMachineRepository {
    async fn create(&self, machine: &Machine) -> RepoResult<Machine> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO machines (user_id, name, hwid, last_seen, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(machine.user_id)
        .bind(&machine.name)
        .bind(&machine.hwid)
        .bind(machine.last_seen)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::from_sqlx(e, "Failed to create machine"))?;

        Ok(Machine {
            id: result.last_insert_rowid(),
            created_at: now,
            ..machine.clone()
        })
    }

    async fn list_by_user(&self, user_id: i64) -> RepoResult<Vec<Machine>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, hwid, last_seen, created_at
             FROM machines WHERE user_id = ?
             ORDER BY last_seen DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list machines")?;

        rows.iter()
            .map(row_to_machine)
            .collect::<anyhow::Result<_>>()
            .map_err(Into::into)
    }

    async fn get_owned(&self, id: i64, user_id: i64) -> RepoResult<Option<Machine>> {
        let row = sqlx::query(
            "SELECT id, user_id, name, hwid, last_seen, created_at
             FROM machines WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get machine")?;

        row.map(|r| row_to_machine(&r))
            .transpose()
            .map_err(Into::into)
    }

    async fn rename(&self, id: i64, user_id: i64, name: &str) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE machines SET name = ? WHERE id = ? AND user_id = ?")
            .bind(name)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to rename machine")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i64, user_id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM machines WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete machine")?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch(
        &self,
        user_id: i64,
        hwid: &str,
        seen_at: DateTime<Utc>,
    ) -> RepoResult<Option<Machine>> {
        sqlx::query("UPDATE machines SET last_seen = ? WHERE user_id = ? AND hwid = ?")
            .bind(seen_at)
            .bind(user_id)
            .bind(hwid)
            .execute(&self.pool)
            .await
            .context("Failed to record heartbeat")?;

        let row = sqlx::query(
            "SELECT id, user_id, name, hwid, last_seen, created_at
             FROM machines WHERE user_id = ? AND hwid = ?",
        )
        .bind(user_id)
        .bind(hwid)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load machine after heartbeat")?;

        row.map(|r| row_to_machine(&r))
            .transpose()
            .map_err(Into::into)
    }
}

fn row_to_machine(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Machine> {
    Ok(Machine {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        hwid: row.try_get("hwid")?,
        last_seen: row.try_get("last_seen")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::user::{SqlxUserRepository, UserRepository};
    use crate::db::{create_pool, migrations};
    use crate::models::User;

    async fn setup() -> (SqlxMachineRepository, i64, i64) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let users = SqlxUserRepository::new(pool.clone());
        let a = users.create(&User::new("a".into(), None)).await.unwrap();
        let b = users.create(&User::new("b".into(), None)).await.unwrap();
        (SqlxMachineRepository::new(pool), a.id, b.id)
    }

    #[tokio::test]
    async fn test_create_list_scoped_to_owner() {
        let (repo, a, b) = setup().await;
        repo.create(&Machine::new(a, "rig-1".into(), "HW1".into()))
            .await
            .unwrap();
        repo.create(&Machine::new(b, "rig-2".into(), "HW2".into()))
            .await
            .unwrap();

        assert_eq!(repo.list_by_user(a).await.unwrap().len(), 1);
        assert_eq!(repo.list_by_user(b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_hwid_per_owner_conflicts() {
        let (repo, a, b) = setup().await;
        repo.create(&Machine::new(a, "rig".into(), "HW1".into()))
            .await
            .unwrap();

        match repo
            .create(&Machine::new(a, "rig2".into(), "HW1".into()))
            .await
        {
            Err(RepoError::UniqueViolation) => {}
            other => panic!("expected UniqueViolation, got {:?}", other.map(|m| m.id)),
        }

        // Same hwid under a different owner is fine
        repo.create(&Machine::new(b, "rig".into(), "HW1".into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ownership_guards() {
        let (repo, a, b) = setup().await;
        let machine = repo
            .create(&Machine::new(a, "rig".into(), "HW1".into()))
            .await
            .unwrap();

        assert!(repo.get_owned(machine.id, b).await.unwrap().is_none());
        assert!(!repo.rename(machine.id, b, "stolen").await.unwrap());
        assert!(!repo.delete(machine.id, b).await.unwrap());

        assert!(repo.rename(machine.id, a, "renamed").await.unwrap());
        let found = repo.get_owned(machine.id, a).await.unwrap().unwrap();
        assert_eq!(found.name, "renamed");
        assert!(repo.delete(machine.id, a).await.unwrap());
    }

    #[tokio::test]
    async fn test_touch_updates_last_seen() {
        let (repo, a, _) = setup().await;
        repo.create(&Machine::new(a, "rig".into(), "HW1".into()))
            .await
            .unwrap();

        let seen = Utc::now();
        let touched = repo.touch(a, "HW1", seen).await.unwrap().unwrap();
        assert!(touched.last_seen.is_some());
        assert!(repo.touch(a, "HW9", seen).await.unwrap().is_none());
    }
}
