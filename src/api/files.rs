//! Dump file API endpoints
//!
//! Files are stored under a per-user prefix so one user can never list or
//! touch another's dumps. Downloads go through short-lived signed links so
//! a dump URL can be handed to a download manager without a session cookie.
//!
//! - GET /api/files - List the caller's files
//! - POST /api/files - Upload a file (multipart)
//! - DELETE /api/files/:name - Delete a file
//! - PUT /api/files/:name - Rename a file
//! - GET /api/files/:name/link - Issue a signed download link
//! - GET /api/download - Signed download (no session required)

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::services::ObjectInfo;

/// Request body for renaming a file
#[derive(Debug, Deserialize)]
pub struct RenameFileRequest {
    pub new_name: String,
}

/// Query parameters for a signed download
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub key: String,
    pub exp: i64,
    pub sig: String,
}

/// Response for a stored file
#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub name: String,
    pub size: u64,
    pub modified_at: Option<String>,
}

impl From<ObjectInfo> for FileResponse {
    fn from(info: ObjectInfo) -> Self {
        Self {
            name: info.name,
            size: info.size,
            modified_at: info.modified_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

/// Response for an issued download link
#[derive(Debug, Serialize)]
pub struct DownloadLinkResponse {
    pub url: String,
    pub expires_at: String,
}

/// Build the files router (session-protected routes)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_files).post(upload_file))
        .route("/{name}", put(rename_file).delete(delete_file))
        .route("/{name}/link", get(issue_download_link))
}

/// Build the public download router (signature-protected)
pub fn download_router() -> Router<AppState> {
    Router::new().route("/download", get(download))
}

/// Reject names that could escape the caller's prefix.
fn validate_name(name: &str) -> Result<&str, ApiError> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name == "."
        || name == ".."
    {
        return Err(ApiError::invalid_input("Invalid file name"));
    }
    Ok(name)
}

fn user_key(user_id: i64, name: &str) -> String {
    format!("{user_id}/{name}")
}

/// Check a file name against the configured extension allow-list.
/// An empty list accepts everything.
fn check_extension(name: &str, allowed: &[String]) -> Result<(), ApiError> {
    if allowed.is_empty() {
        return Ok(());
    }
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    if allowed.iter().any(|a| *a == extension) {
        Ok(())
    } else {
        Err(ApiError::invalid_input(format!(
            "File type not allowed. Accepted: {}",
            allowed.join(", ")
        )))
    }
}

/// What the download signature covers: the storage key and the expiry.
fn link_message(key: &str, exp: i64) -> Vec<u8> {
    format!("{key}|{exp}").into_bytes()
}

/// GET /api/files - List the caller's files
async fn list_files(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<FileResponse>>, ApiError> {
    let files = state.store.list(&user.0.id.to_string()).await?;
    Ok(Json(files.into_iter().map(FileResponse::from).collect()))
}

/// POST /api/files - Upload a file
///
/// Accepts multipart/form-data with a single file field named "file".
/// Uploads never overwrite: a name clash is a conflict.
async fn upload_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid_input(format!("Failed to read multipart: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        if field_name != "file" {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or_else(|| ApiError::invalid_input("File name is required"))?;
        validate_name(&filename)?;
        check_extension(&filename, &state.storage_config.allowed_extensions)?;

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::invalid_input(format!("Failed to read file: {}", e)))?;

        if data.len() as u64 > state.storage_config.max_file_size {
            return Err(ApiError::with_details(
                "INVALID_INPUT",
                "File too large",
                serde_json::json!({
                    "max_file_size": state.storage_config.max_file_size,
                    "size": data.len(),
                }),
            ));
        }

        state
            .store
            .put(&user_key(user.0.id, &filename), &data)
            .await?;

        tracing::info!(user_id = user.0.id, file = %filename, size = data.len(), "File uploaded");

        return Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({
                "name": filename,
                "size": data.len(),
            })),
        ));
    }

    Err(ApiError::invalid_input("No file provided"))
}

/// DELETE /api/files/:name - Delete a file
async fn delete_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate_name(&name)?;
    state.store.remove(&user_key(user.0.id, &name)).await?;

    tracing::info!(user_id = user.0.id, file = %name, "File deleted");

    Ok(Json(serde_json::json!({"message": "File deleted"})))
}

/// PUT /api/files/:name - Rename a file
async fn rename_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(name): Path<String>,
    Json(body): Json<RenameFileRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate_name(&name)?;
    let new_name = validate_name(body.new_name.trim())?;

    state
        .store
        .rename(&user_key(user.0.id, &name), &user_key(user.0.id, new_name))
        .await?;

    Ok(Json(serde_json::json!({"name": new_name})))
}

/// GET /api/files/:name/link - Issue a signed download link
async fn issue_download_link(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(name): Path<String>,
) -> Result<Json<DownloadLinkResponse>, ApiError> {
    validate_name(&name)?;
    let key = user_key(user.0.id, &name);

    // Only issue links for files that exist
    state.store.get(&key).await?;

    let exp = Utc::now().timestamp() + state.storage_config.link_ttl_seconds;
    let sig = state.codec.sign_detached(&link_message(&key, exp));

    let url = format!(
        "/api/download?key={}&exp={}&sig={}",
        urlencoding::encode(&key),
        exp,
        sig
    );

    Ok(Json(DownloadLinkResponse {
        url,
        expires_at: chrono::DateTime::from_timestamp(exp, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default(),
    }))
}

/// GET /api/download - Signed download
///
/// Validates the signature before touching storage; an expired or forged
/// link is indistinguishable from a missing one to the caller.
async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if Utc::now().timestamp() > query.exp {
        return Err(ApiError::forbidden("Download link has expired"));
    }
    if !state
        .codec
        .verify_detached(&link_message(&query.key, query.exp), &query.sig)
    {
        return Err(ApiError::forbidden("Invalid download link"));
    }

    let data = state.store.get(&query.key).await?;

    let filename = query.key.rsplit('/').next().unwrap_or("download");
    let disposition = format!("attachment; filename=\"{}\"", filename);

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    ))
}
