//! Machine API endpoints
//!
//! Handles HTTP requests for dumper machine management:
//! - GET /api/machines - List the caller's machines
//! - POST /api/machines - Register a machine
//! - PUT /api/machines/:id - Rename a machine
//! - DELETE /api/machines/:id - Delete a machine

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::Machine;

/// Request body for registering a machine
#[derive(Debug, Deserialize)]
pub struct CreateMachineRequest {
    pub name: String,
    pub hwid: String,
}

/// Request body for renaming a machine
#[derive(Debug, Deserialize)]
pub struct RenameMachineRequest {
    pub name: String,
}

/// Response for a single machine
#[derive(Debug, Serialize)]
pub struct MachineResponse {
    pub id: i64,
    pub name: String,
    pub hwid: String,
    pub last_seen: Option<String>,
    pub created_at: String,
}

impl From<Machine> for MachineResponse {
    fn from(machine: Machine) -> Self {
        Self {
            id: machine.id,
            name: machine.name,
            hwid: machine.hwid,
            last_seen: machine.last_seen.map(|dt| dt.to_rfc3339()),
            created_at: machine.created_at.to_rfc3339(),
        }
    }
}

/// Build the machines router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_machines).post(create_machine))
        .route("/{id}", put(rename_machine).delete(delete_machine))
}

/// GET /api/machines - List the caller's machines
async fn list_machines(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<MachineResponse>>, ApiError> {
    let machines = state.machines.list_by_user(user.0.id).await?;
    Ok(Json(
        machines.into_iter().map(MachineResponse::from).collect(),
    ))
}

/// POST /api/machines - Register a machine
async fn create_machine(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<CreateMachineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = body.name.trim();
    let hwid = body.hwid.trim();
    if name.is_empty() || hwid.is_empty() {
        return Err(ApiError::invalid_input("Machine name and hwid are required"));
    }

    let machine = state
        .machines
        .create(&Machine::new(user.0.id, name.to_string(), hwid.to_string()))
        .await
        .map_err(|e| match e {
            crate::db::repositories::RepoError::UniqueViolation => {
                ApiError::conflict("A machine with that hardware id is already registered")
            }
            other => other.into(),
        })?;

    tracing::info!(machine_id = machine.id, user_id = user.0.id, "Machine registered");

    Ok((StatusCode::CREATED, Json(MachineResponse::from(machine))))
}

/// PUT /api/machines/:id - Rename a machine
async fn rename_machine(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(body): Json<RenameMachineRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::invalid_input("Machine name is required"));
    }

    let renamed = state.machines.rename(id, user.0.id, name).await?;
    if !renamed {
        return Err(ApiError::not_found("Machine not found"));
    }

    Ok(Json(serde_json::json!({"id": id, "name": name})))
}

/// DELETE /api/machines/:id - Delete a machine
async fn delete_machine(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.machines.delete(id, user.0.id).await?;
    if !deleted {
        return Err(ApiError::not_found("Machine not found"));
    }

    tracing::info!(machine_id = id, user_id = user.0.id, "Machine deleted");

    Ok(Json(serde_json::json!({"message": "Machine deleted"})))
}
