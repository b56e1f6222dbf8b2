//! Dumper preset API endpoints
//!
//! Presets are shared dumper configurations selectable when creating a
//! task. File types are the catalog of extensions the dumper recognizes.
//!
//! - GET /api/presets - List presets
//! - POST /api/presets - Create a preset
//! - DELETE /api/presets/:id - Delete a preset
//! - GET /api/file-types - List known file types

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::models::DumperPreset;

/// Request body for creating a preset
#[derive(Debug, Deserialize)]
pub struct CreatePresetRequest {
    pub name: String,
    pub config: serde_json::Value,
}

/// Response for a single preset
#[derive(Debug, Serialize)]
pub struct PresetResponse {
    pub id: i64,
    pub name: String,
    pub config: serde_json::Value,
    pub created_at: String,
}

impl From<DumperPreset> for PresetResponse {
    fn from(preset: DumperPreset) -> Self {
        Self {
            id: preset.id,
            name: preset.name,
            config: preset.config,
            created_at: preset.created_at.to_rfc3339(),
        }
    }
}

/// Response for a file type entry
#[derive(Debug, Serialize)]
pub struct FileTypeResponse {
    pub id: i64,
    pub extension: String,
    pub description: String,
}

impl From<crate::models::FileType> for FileTypeResponse {
    fn from(ft: crate::models::FileType) -> Self {
        Self {
            id: ft.id,
            extension: ft.extension,
            description: ft.description,
        }
    }
}

/// Build the presets router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_presets).post(create_preset))
        .route("/{id}", delete(delete_preset))
}

/// Build the file types router
pub fn file_types_router() -> Router<AppState> {
    Router::new().route("/", get(list_file_types))
}

/// GET /api/presets - List presets
async fn list_presets(
    State(state): State<AppState>,
) -> Result<Json<Vec<PresetResponse>>, ApiError> {
    let presets = state.presets.list().await?;
    Ok(Json(presets.into_iter().map(PresetResponse::from).collect()))
}

/// POST /api/presets - Create a preset
async fn create_preset(
    State(state): State<AppState>,
    Json(body): Json<CreatePresetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::invalid_input("Preset name is required"));
    }
    if !body.config.is_object() {
        return Err(ApiError::invalid_input("Preset config must be a JSON object"));
    }

    let preset = state
        .presets
        .create(&DumperPreset::new(name.to_string(), body.config))
        .await
        .map_err(|e| match e {
            crate::db::repositories::RepoError::UniqueViolation => {
                ApiError::conflict("A preset with that name already exists")
            }
            other => other.into(),
        })?;

    tracing::info!(preset_id = preset.id, "Preset created");

    Ok((StatusCode::CREATED, Json(PresetResponse::from(preset))))
}

/// DELETE /api/presets/:id - Delete a preset
async fn delete_preset(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.presets.delete(id).await?;
    if !deleted {
        return Err(ApiError::not_found("Preset not found"));
    }
    Ok(Json(serde_json::json!({"message": "Preset deleted"})))
}

/// GET /api/file-types - List known file types
async fn list_file_types(
    State(state): State<AppState>,
) -> Result<Json<Vec<FileTypeResponse>>, ApiError> {
    let file_types = state.presets.list_file_types().await?;
    Ok(Json(
        file_types.into_iter().map(FileTypeResponse::from).collect(),
    ))
}
