//! Task API endpoints
//!
//! Handles HTTP requests for dumper task management:
//! - GET /api/tasks - List the caller's tasks
//! - POST /api/tasks - Create a task with its target URLs
//! - GET /api/tasks/:id - Task detail with URLs and results
//! - PUT /api/tasks/:id/status - Update task status
//! - DELETE /api/tasks/:id - Delete a task

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::db::repositories::NewTask;
use crate::models::TaskStatus;

/// Request body for creating a task
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    #[serde(default)]
    pub machine_id: Option<i64>,
    #[serde(default)]
    pub preset_id: Option<i64>,
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Request body for a status update
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Response for a single task
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: i64,
    pub name: String,
    pub machine_id: Option<i64>,
    pub preset_id: Option<i64>,
    pub status: String,
    pub created_at: String,
}

impl From<crate::models::Task> for TaskResponse {
    fn from(task: crate::models::Task) -> Self {
        Self {
            id: task.id,
            name: task.name,
            machine_id: task.machine_id,
            preset_id: task.preset_id,
            status: task.status.to_string(),
            created_at: task.created_at.to_rfc3339(),
        }
    }
}

/// Response for a reported result
#[derive(Debug, Serialize)]
pub struct DumpResultResponse {
    pub id: i64,
    pub machine_id: Option<i64>,
    pub file_path: Option<String>,
    pub entry_count: i64,
    pub created_at: String,
}

impl From<crate::models::DumpResult> for DumpResultResponse {
    fn from(result: crate::models::DumpResult) -> Self {
        Self {
            id: result.id,
            machine_id: result.machine_id,
            file_path: result.file_path,
            entry_count: result.entry_count,
            created_at: result.created_at.to_rfc3339(),
        }
    }
}

/// Response for task detail
#[derive(Debug, Serialize)]
pub struct TaskDetailResponse {
    #[serde(flatten)]
    pub task: TaskResponse,
    pub urls: Vec<String>,
    pub results: Vec<DumpResultResponse>,
}

/// Build the tasks router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/{id}", get(get_task).delete(delete_task))
        .route("/{id}/status", put(update_status))
}

/// GET /api/tasks - List the caller's tasks
async fn list_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let tasks = state.tasks.list_by_user(user.0.id).await?;
    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

/// POST /api/tasks - Create a task with its target URLs
async fn create_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::invalid_input("Task name is required"));
    }
    if body.urls.iter().any(|url| url.trim().is_empty()) {
        return Err(ApiError::invalid_input("Task URLs must not be blank"));
    }

    // Referenced machine and preset must exist and be visible to the caller
    if let Some(machine_id) = body.machine_id {
        state
            .machines
            .get_owned(machine_id, user.0.id)
            .await?
            .ok_or_else(|| ApiError::not_found("Machine not found"))?;
    }
    if let Some(preset_id) = body.preset_id {
        let known = state
            .presets
            .list()
            .await?
            .iter()
            .any(|preset| preset.id == preset_id);
        if !known {
            return Err(ApiError::not_found("Preset not found"));
        }
    }

    let task = state
        .tasks
        .create(&NewTask {
            user_id: user.0.id,
            name: name.to_string(),
            machine_id: body.machine_id,
            preset_id: body.preset_id,
            urls: body.urls,
        })
        .await?;

    tracing::info!(task_id = task.id, user_id = user.0.id, "Task created");

    Ok((StatusCode::CREATED, Json(TaskResponse::from(task))))
}

/// GET /api/tasks/:id - Task detail with URLs and results
async fn get_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<TaskDetailResponse>, ApiError> {
    let task = state
        .tasks
        .get_owned(id, user.0.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    let urls = state.tasks.urls(task.id).await?;
    let results = state.tasks.results(task.id).await?;

    Ok(Json(TaskDetailResponse {
        task: task.into(),
        urls: urls.into_iter().map(|u| u.url).collect(),
        results: results.into_iter().map(DumpResultResponse::from).collect(),
    }))
}

/// PUT /api/tasks/:id/status - Update task status
async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = TaskStatus::from_str(&body.status)
        .map_err(|_| ApiError::invalid_input(format!("Unknown task status: {}", body.status)))?;

    let updated = state.tasks.set_status(id, user.0.id, status).await?;
    if !updated {
        return Err(ApiError::not_found("Task not found"));
    }

    Ok(Json(serde_json::json!({"id": id, "status": status.to_string()})))
}

/// DELETE /api/tasks/:id - Delete a task
async fn delete_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.tasks.delete(id, user.0.id).await?;
    if !deleted {
        return Err(ApiError::not_found("Task not found"));
    }

    tracing::info!(task_id = id, user_id = user.0.id, "Task deleted");

    Ok(Json(serde_json::json!({"message": "Task deleted"})))
}
