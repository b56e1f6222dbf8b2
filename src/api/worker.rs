//! Worker API endpoints
//!
//! Dumper workers authenticate with their owner's API key (X-Api-Key
//! header), not a browser session.
//!
//! - POST /api/worker/heartbeat - Report a machine as alive
//! - GET /api/worker/tasks - Pending tasks for the worker's owner
//! - POST /api/worker/results - Report a dump result

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::tasks::TaskResponse;
use crate::models::{DumpResult, TaskStatus};

/// Request body for a heartbeat
#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub hwid: String,
}

/// Request body for reporting a result
#[derive(Debug, Deserialize)]
pub struct ReportResultRequest {
    pub task_id: i64,
    #[serde(default)]
    pub hwid: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub entry_count: i64,
    /// Whether the task is finished after this result
    #[serde(default)]
    pub done: bool,
}

/// Response for a heartbeat
#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub machine_id: i64,
    pub last_seen: String,
}

/// Build the worker router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/heartbeat", post(heartbeat))
        .route("/tasks", get(pending_tasks))
        .route("/results", post(report_result))
}

/// POST /api/worker/heartbeat - Report a machine as alive
///
/// The machine must already be registered through the dashboard; unknown
/// hardware ids are not auto-enrolled.
async fn heartbeat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let hwid = body.hwid.trim();
    if hwid.is_empty() {
        return Err(ApiError::invalid_input("hwid is required"));
    }

    let now = Utc::now();
    let machine = state
        .machines
        .touch(user.0.id, hwid, now)
        .await?
        .ok_or_else(|| ApiError::not_found("Machine not registered"))?;

    Ok(Json(HeartbeatResponse {
        machine_id: machine.id,
        last_seen: now.to_rfc3339(),
    }))
}

/// GET /api/worker/tasks - Pending tasks for the worker's owner
async fn pending_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let tasks = state.tasks.list_by_user(user.0.id).await?;
    Ok(Json(
        tasks
            .into_iter()
            .filter(|task| task.status == TaskStatus::Pending)
            .map(TaskResponse::from)
            .collect(),
    ))
}

/// POST /api/worker/results - Report a dump result
async fn report_result(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<ReportResultRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // The task must belong to the key's owner
    let task = state
        .tasks
        .get_owned(body.task_id, user.0.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    if body.entry_count < 0 {
        return Err(ApiError::invalid_input("entry_count must not be negative"));
    }

    // Resolve the reporting machine if the worker identified itself
    let machine_id = match body.hwid.as_deref().map(str::trim) {
        Some(hwid) if !hwid.is_empty() => state
            .machines
            .touch(user.0.id, hwid, Utc::now())
            .await?
            .map(|m| m.id),
        _ => None,
    };

    let result = state
        .tasks
        .add_result(&DumpResult {
            id: 0, // assigned by the database
            task_id: task.id,
            machine_id,
            file_path: body.file_path,
            entry_count: body.entry_count,
            created_at: Utc::now(),
        })
        .await?;

    let status = if body.done {
        TaskStatus::Done
    } else {
        TaskStatus::Running
    };
    state.tasks.set_status(task.id, user.0.id, status).await?;

    tracing::info!(
        task_id = task.id,
        result_id = result.id,
        entry_count = result.entry_count,
        "Dump result recorded"
    );

    Ok((StatusCode::CREATED, Json(result)))
}
