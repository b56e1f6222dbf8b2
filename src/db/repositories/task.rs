//! Task repository
//!
//! Dumper tasks with their target URLs and reported results. All reads and
//! writes are owner-scoped except result insertion, which the worker API
//! performs after authenticating by API key.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

use super::RepoResult;
use crate::db::DbPool;
use crate::models::{DumpResult, Task, TaskStatus, TaskUrl};

/// Input for creating a task together with its URLs.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub user_id: i64,
    pub name: String,
    pub machine_id: Option<i64>,
    pub preset_id: Option<i64>,
    pub urls: Vec<String>,
}

/// Task repository trait
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create a task and its URL rows.
    async fn create(&self, input: &NewTask) -> RepoResult<Task>;

    /// List the owner's tasks, newest first.
    async fn list_by_user(&self, user_id: i64) -> RepoResult<Vec<Task>>;

    /// Get a task only if `user_id` owns it.
    async fn get_owned(&self, id: i64, user_id: i64) -> RepoResult<Option<Task>>;

    /// URLs of a task.
    async fn urls(&self, task_id: i64) -> RepoResult<Vec<TaskUrl>>;

    /// Results reported for a task.
    async fn results(&self, task_id: i64) -> RepoResult<Vec<DumpResult>>;

    /// Update the status of an owned task. Returns whether a row changed.
    async fn set_status(&self, id: i64, user_id: i64, status: TaskStatus) -> RepoResult<bool>;

    /// Delete an owned task (URLs and results cascade). Returns whether a
    /// row was deleted.
    async fn delete(&self, id: i64, user_id: i64) -> RepoResult<bool>;

    /// Record a worker-reported result.
    async fn add_result(&self, result: &DumpResult) -> RepoResult<DumpResult>;
}

/// sqlx-based task repository.
pub struct SqlxTaskRepository {
    pool: DbPool,
}

impl SqlxTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn TaskRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TaskRepository for SqlxTaskRepository {
    async fn create(&self, input: &NewTask) -> RepoResult<Task> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (user_id, machine_id, name, preset_id, status, created_at)
            VALUES (?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(input.user_id)
        .bind(input.machine_id)
        .bind(&input.name)
        .bind(input.preset_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create task")?;

        let task_id = result.last_insert_rowid();

        for url in &input.urls {
            sqlx::query("INSERT INTO task_urls (task_id, url) VALUES (?, ?)")
                .bind(task_id)
                .bind(url)
                .execute(&self.pool)
                .await
                .context("Failed to insert task URL")?;
        }

        Ok(Task {
            id: task_id,
            user_id: input.user_id,
            machine_id: input.machine_id,
            name: input.name.clone(),
            preset_id: input.preset_id,
            status: TaskStatus::Pending,
            created_at: now,
        })
    }

    async fn list_by_user(&self, user_id: i64) -> RepoResult<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT id, user_id, machine_id, name, preset_id, status, created_at
             FROM tasks WHERE user_id = ? ORDER BY id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tasks")?;

        rows.iter()
            .map(row_to_task)
            .collect::<anyhow::Result<_>>()
            .map_err(Into::into)
    }

    async fn get_owned(&self, id: i64, user_id: i64) -> RepoResult<Option<Task>> {
        let row = sqlx::query(
            "SELECT id, user_id, machine_id, name, preset_id, status, created_at
             FROM tasks WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get task")?;

        row.map(|r| row_to_task(&r)).transpose().map_err(Into::into)
    }

    async fn urls(&self, task_id: i64) -> RepoResult<Vec<TaskUrl>> {
        let rows = sqlx::query("SELECT id, task_id, url FROM task_urls WHERE task_id = ?")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list task URLs")?;

        rows.iter()
            .map(|r| {
                Ok(TaskUrl {
                    id: r.try_get("id")?,
                    task_id: r.try_get("task_id")?,
                    url: r.try_get("url")?,
                })
            })
            .collect::<anyhow::Result<_>>()
            .map_err(Into::into)
    }

    async fn results(&self, task_id: i64) -> RepoResult<Vec<DumpResult>> {
        let rows = sqlx::query(
            "SELECT id, task_id, machine_id, file_path, entry_count, created_at
             FROM dump_results WHERE task_id = ? ORDER BY id DESC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list dump results")?;

        rows.iter()
            .map(row_to_result)
            .collect::<anyhow::Result<_>>()
            .map_err(Into::into)
    }

    async fn set_status(&self, id: i64, user_id: i64, status: TaskStatus) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE tasks SET status = ? WHERE id = ? AND user_id = ?")
            .bind(status.to_string())
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to update task status")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i64, user_id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete task")?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_result(&self, dump: &DumpResult) -> RepoResult<DumpResult> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO dump_results (task_id, machine_id, file_path, entry_count, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(dump.task_id)
        .bind(dump.machine_id)
        .bind(&dump.file_path)
        .bind(dump.entry_count)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to record dump result")?;

        Ok(DumpResult {
            id: result.last_insert_rowid(),
            created_at: now,
            ..dump.clone()
        })
    }
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Task> {
    let status: String = row.try_get("status")?;
    Ok(Task {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        machine_id: row.try_get("machine_id")?,
        name: row.try_get("name")?,
        preset_id: row.try_get("preset_id")?,
        status: TaskStatus::from_str(&status)?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_result(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<DumpResult> {
    Ok(DumpResult {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        machine_id: row.try_get("machine_id")?,
        file_path: row.try_get("file_path")?,
        entry_count: row.try_get("entry_count")?,
        created_at: row.try_get("created_at")?,
    })
}
