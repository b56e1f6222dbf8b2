//! Task models
//!
//! A dumper task targets a set of URLs and is optionally pinned to a preset
//! and a worker machine. Workers report dump results back against the task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dumper task entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Worker machine assigned to the task, if any
    pub machine_id: Option<i64>,
    /// Display name
    pub name: String,
    /// Dumper preset driving the run, if any
    pub preset_id: Option<i64>,
    /// Lifecycle state
    pub status: TaskStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(user_id: i64, name: String) -> Self {
        Self {
            id: 0, // assigned by the database
            user_id,
            machine_id: None,
            name,
            preset_id: None,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Queued, not yet picked up by a worker
    #[default]
    Pending,
    /// Being processed by a worker
    Running,
    /// Finished successfully
    Done,
    /// Aborted or errored
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

/// Target URL belonging to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUrl {
    pub id: i64,
    pub task_id: i64,
    pub url: String,
}

/// Result reported by a worker for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpResult {
    pub id: i64,
    pub task_id: i64,
    /// Machine that produced the result, if it identified itself
    pub machine_id: Option<i64>,
    /// Path of the uploaded dump in object storage, if any
    pub file_path: Option<String>,
    /// Number of entries extracted
    pub entry_count: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_new_defaults() {
        let task = Task::new(7, "forum dump".to_string());
        assert_eq!(task.user_id, 7);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.machine_id.is_none());
        assert!(task.preset_id.is_none());
    }

    #[test]
    fn test_task_status_roundtrip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Done,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::from_str(&status.to_string()).unwrap(), status);
        }
        assert!(TaskStatus::from_str("paused").is_err());
    }
}
