//! Preset and file type repository

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

use super::{RepoError, RepoResult};
use crate::db::DbPool;
use crate::models::{DumperPreset, FileType};

/// Preset repository trait
#[async_trait]
pub trait PresetRepository: Send + Sync {
    /// List all presets by name.
    async fn list(&self) -> RepoResult<Vec<DumperPreset>>;

    /// Create a preset. Duplicate names are a `UniqueViolation`.
    async fn create(&self, preset: &DumperPreset) -> RepoResult<DumperPreset>;

    /// Delete a preset. Returns whether a row was deleted.
    async fn delete(&self, id: i64) -> RepoResult<bool>;

    /// List known artifact file types.
    async fn list_file_types(&self) -> RepoResult<Vec<FileType>>;
}

/// sqlx-based preset repository.
pub struct SqlxPresetRepository {
    pool: DbPool,
}

impl SqlxPresetRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn PresetRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PresetRepository for SqlxPresetRepository {
    async fn list(&self) -> RepoResult<Vec<DumperPreset>> {
        let rows = sqlx::query(
            "SELECT id, name, config, created_at FROM dumper_presets ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list presets")?;

        rows.iter()
            .map(row_to_preset)
            .collect::<anyhow::Result<_>>()
            .map_err(Into::into)
    }

    async fn create(&self, preset: &DumperPreset) -> RepoResult<DumperPreset> {
        let now = Utc::now();
        let config = serde_json::to_string(&preset.config)
            .context("Failed to serialize preset config")?;
        let result = sqlx::query(
            "INSERT INTO dumper_presets (name, config, created_at) VALUES (?, ?, ?)",
        )
        .bind(&preset.name)
        .bind(config)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::from_sqlx(e, "Failed to create preset"))?;

        Ok(DumperPreset {
            id: result.last_insert_rowid(),
            created_at: now,
            ..preset.clone()
        })
    }

    async fn delete(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM dumper_presets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete preset")?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_file_types(&self) -> RepoResult<Vec<FileType>> {
        let rows = sqlx::query("SELECT id, extension, description FROM file_types ORDER BY extension")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list file types")?;

        rows.iter()
            .map(|r| {
                Ok(FileType {
                    id: r.try_get("id")?,
                    extension: r.try_get("extension")?,
                    description: r.try_get("description")?,
                })
            })
            .collect::<anyhow::Result<_>>()
            .map_err(Into::into)
    }
}

fn row_to_preset(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<DumperPreset> {
    let config: String = row.try_get("config")?;
    Ok(DumperPreset {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        config: serde_json::from_str(&config).context("Invalid preset config JSON")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, migrations};
    use serde_json::json;

    async fn repo() -> SqlxPresetRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        SqlxPresetRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_list_delete() {
        let repo = repo().await;
        let preset = repo
            .create(&DumperPreset::new(
                "forum-fast".into(),
                json!({"threads": 8, "retries": 2}),
            ))
            .await
            .unwrap();

        let listed = repo.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].config["threads"], 8);

        assert!(repo.delete(preset.id).await.unwrap());
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let repo = repo().await;
        repo.create(&DumperPreset::new("p".into(), json!({})))
            .await
            .unwrap();
        match repo.create(&DumperPreset::new("p".into(), json!({}))).await {
            Err(RepoError::UniqueViolation) => {}
            other => panic!("expected UniqueViolation, got {:?}", other.map(|p| p.id)),
        }
    }

    #[tokio::test]
    async fn test_file_types_empty_by_default() {
        let repo = repo().await;
        assert!(repo.list_file_types().await.unwrap().is_empty());
    }
}
