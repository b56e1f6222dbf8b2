//! API middleware
//!
//! Authentication middleware for browser sessions (signed cookie or Bearer
//! token) and for dumper workers (X-Api-Key header), plus the shared error
//! envelope every handler returns.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{TokenCodec, SESSION_COOKIE};
use crate::config::{SessionConfig, StorageConfig};
use crate::db::repositories::{
    PresetRepository, MachineRepository, NotificationRepository, RepoError, TaskRepository,
    UserRepository,
};
use crate::db::DbPool;
use crate::models::User;
use crate::services::{AccountError, AccountService, LicenseError, LicenseService, ObjectStore, StoreError};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub codec: Arc<TokenCodec>,
    pub account_service: Arc<AccountService>,
    pub license_service: Arc<LicenseService>,
    pub users: Arc<dyn UserRepository>,
    pub machines: Arc<dyn MachineRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub presets: Arc<dyn PresetRepository>,
    pub store: Arc<dyn ObjectStore>,
    pub session_config: Arc<SessionConfig>,
    pub storage_config: Arc<StorageConfig>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new("INVALID_INPUT", message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new("UNAUTHENTICATED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    /// Internal failure. The cause is logged; the client sees only a
    /// generic message.
    pub fn upstream(err: anyhow::Error) -> Self {
        tracing::error!("Internal error: {err:#}");
        Self::new("UPSTREAM", "Internal server error")
    }

    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self::new("MISCONFIGURED", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "INVALID_INPUT" => StatusCode::BAD_REQUEST,
            "UNAUTHENTICATED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidInput(msg) => Self::invalid_input(msg),
            // One message for unknown user and wrong password alike
            AccountError::InvalidCredentials => Self::unauthenticated(err.to_string()),
            AccountError::Suspended | AccountError::SubscriptionExpired => {
                Self::forbidden(err.to_string())
            }
            AccountError::Internal(e) => Self::upstream(e),
        }
    }
}

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        match err {
            LicenseError::InvalidInput(msg) => Self::invalid_input(msg),
            LicenseError::NotFound => Self::not_found(err.to_string()),
            LicenseError::AlreadyActivated | LicenseError::UsernameTaken => {
                Self::conflict(err.to_string())
            }
            LicenseError::Internal(e) => Self::upstream(e),
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::UniqueViolation => Self::conflict("A record with that value already exists"),
            RepoError::Other(e) => Self::upstream(e),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists => Self::conflict(err.to_string()),
            StoreError::NotFound => Self::not_found(err.to_string()),
            StoreError::InvalidKey => Self::invalid_input(err.to_string()),
            StoreError::Io(e) => Self::upstream(e),
        }
    }
}

/// Extract session token from request (Bearer header wins over cookie)
pub fn extract_session_token(request: &Request) -> Option<String> {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = request.headers().get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(value) = cookie.strip_prefix(SESSION_COOKIE) {
                    if let Some(token) = value.strip_prefix('=') {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Resolve a session token to its live user.
async fn user_for_token(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = state
        .codec
        .verify(token)
        .map_err(|_| ApiError::unauthenticated("Invalid or expired session"))?;

    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::unauthenticated("Invalid or expired session"))?;

    state
        .users
        .get_by_id(user_id)
        .await
        .map_err(|e| ApiError::upstream(e.into()))?
        .ok_or_else(|| ApiError::unauthenticated("Invalid or expired session"))
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(&request)
        .ok_or_else(|| ApiError::unauthenticated("Missing authentication token"))?;

    let user = user_for_token(&state, &token).await?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Worker authentication middleware (X-Api-Key header)
pub async fn require_worker(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let api_key = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::unauthenticated("Missing API key"))?;

    let user = state
        .account_service
        .authenticate_api_key(&api_key)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::unauthenticated("Invalid API key"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn create_request_with_auth(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    fn create_request_with_cookie(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::COOKIE, format!("session_token={}", token))
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let request = create_request_with_auth("test-token-123");
        assert_eq!(
            extract_session_token(&request),
            Some("test-token-123".to_string())
        );
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let request = create_request_with_cookie("test-token-456");
        assert_eq!(
            extract_session_token(&request),
            Some("test-token-456".to_string())
        );
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer bearer-token")
            .header(header::COOKIE, "session_token=cookie-token")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            extract_session_token(&request),
            Some("bearer-token".to_string())
        );
    }

    #[test]
    fn test_extract_session_token_none() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        assert!(extract_session_token(&request).is_none());
    }

    #[test]
    fn test_extract_session_token_ignores_other_cookies() {
        let request = Request::builder()
            .uri("/test")
            .header(header::COOKIE, "theme=dark; other_token=x")
            .body(Body::empty())
            .unwrap();
        assert!(extract_session_token(&request).is_none());
    }

    #[test]
    fn test_api_error_status_mapping() {
        for (error, status) in [
            (ApiError::invalid_input("x"), StatusCode::BAD_REQUEST),
            (ApiError::unauthenticated("x"), StatusCode::UNAUTHORIZED),
            (ApiError::forbidden("x"), StatusCode::FORBIDDEN),
            (ApiError::not_found("x"), StatusCode::NOT_FOUND),
            (ApiError::conflict("x"), StatusCode::CONFLICT),
            (
                ApiError::misconfigured("x"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ] {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_error_details_serialized_when_present() {
        let error = ApiError::with_details(
            "INVALID_INPUT",
            "File too large",
            serde_json::json!({"max_file_size": 8}),
        );
        let body = serde_json::to_value(&error).unwrap();
        assert_eq!(body["error"]["details"]["max_file_size"], 8);

        // Plain constructors omit the field entirely
        let plain = serde_json::to_value(ApiError::invalid_input("x")).unwrap();
        assert!(plain["error"].get("details").is_none());
    }

    #[test]
    fn test_upstream_error_hides_cause() {
        let error = ApiError::upstream(anyhow::anyhow!("connection refused to 10.0.0.5"));
        assert_eq!(error.error.code, "UPSTREAM");
        assert!(!error.error.message.contains("10.0.0.5"));
    }

    #[test]
    fn test_credential_errors_map_to_401() {
        let error: ApiError = AccountError::InvalidCredentials.into();
        assert_eq!(error.error.code, "UNAUTHENTICATED");
        assert_eq!(error.error.message, "Invalid username or password");
    }

    #[test]
    fn test_suspended_maps_to_forbidden() {
        let error: ApiError = AccountError::Suspended.into();
        assert_eq!(error.error.code, "FORBIDDEN");
    }

    #[test]
    fn test_license_conflicts_map_to_409() {
        for err in [LicenseError::AlreadyActivated, LicenseError::UsernameTaken] {
            let error: ApiError = err.into();
            assert_eq!(error.error.code, "CONFLICT");
        }
    }
}
