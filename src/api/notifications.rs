//! Notification API endpoints
//!
//! - GET /api/notifications - Active announcements shown in the dashboard
//! - POST /api/notifications - Publish an announcement
//! - PUT /api/notifications/:id - Activate or retire an announcement

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::models::Notification;

/// Request body for publishing a notification
#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub title: String,
    pub body: String,
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

/// Request body for toggling a notification
#[derive(Debug, Deserialize)]
pub struct UpdateNotificationRequest {
    pub active: bool,
}

/// Response for a single notification
#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub level: String,
    pub created_at: String,
}

impl From<crate::models::Notification> for NotificationResponse {
    fn from(notification: crate::models::Notification) -> Self {
        Self {
            id: notification.id,
            title: notification.title,
            body: notification.body,
            level: notification.level,
            created_at: notification.created_at.to_rfc3339(),
        }
    }
}

/// Build the notifications router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications).post(create_notification))
        .route("/{id}", put(update_notification))
}

/// GET /api/notifications - Active announcements, newest first
async fn list_notifications(
    State(state): State<AppState>,
) -> Result<Json<Vec<NotificationResponse>>, ApiError> {
    let notifications = state.notifications.list_active().await?;
    Ok(Json(
        notifications
            .into_iter()
            .map(NotificationResponse::from)
            .collect(),
    ))
}

const ALLOWED_LEVELS: &[&str] = &["info", "warning", "error"];

/// POST /api/notifications - Publish an announcement
async fn create_notification(
    State(state): State<AppState>,
    Json(body): Json<CreateNotificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = body.title.trim();
    let text = body.body.trim();
    if title.is_empty() || text.is_empty() {
        return Err(ApiError::invalid_input("Title and body are required"));
    }
    if !ALLOWED_LEVELS.contains(&body.level.as_str()) {
        return Err(ApiError::invalid_input(format!(
            "Unknown notification level: {}",
            body.level
        )));
    }

    let notification = state
        .notifications
        .create(&Notification::new(
            title.to_string(),
            text.to_string(),
            body.level,
        ))
        .await?;

    tracing::info!(notification_id = notification.id, "Notification published");

    Ok((
        StatusCode::CREATED,
        Json(NotificationResponse::from(notification)),
    ))
}

/// PUT /api/notifications/:id - Activate or retire an announcement
async fn update_notification(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateNotificationRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let changed = state.notifications.set_active(id, body.active).await?;
    if !changed {
        return Err(ApiError::not_found("Notification not found"));
    }

    Ok(Json(serde_json::json!({"id": id, "active": body.active})))
}
