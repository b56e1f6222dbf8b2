//! Authentication API endpoints
//!
//! Handles HTTP requests for account access:
//! - POST /api/auth/signup - Redeem a license key for a new account
//! - POST /api/auth/login - User login
//! - POST /api/auth/logout - User logout
//! - GET /api/auth/me - Get current user
//! - POST /api/license/extend - Redeem a license key to extend a subscription

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::auth::SESSION_COOKIE;
use crate::models::SessionClaims;

/// Request body for user signup
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub license_key: String,
}

/// Request body for user login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

/// Request body for subscription extension
#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub license_key: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

/// Response for user info
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub status: String,
    pub expires_at: Option<String>,
    pub day: i64,
    pub created_at: String,
}

impl From<crate::models::User> for UserResponse {
    fn from(user: crate::models::User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            status: user.status.to_string(),
            expires_at: user.expires_at.map(|dt| dt.to_rfc3339()),
            day: user.day,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(get_current_user))
        .route("/license/extend", post(extend_license))
}

/// Build the session cookie header value.
///
/// The Secure attribute is added only when the request arrived over HTTPS
/// (behind a proxy that sets x-forwarded-proto), so local development over
/// plain HTTP keeps working.
fn session_cookie(token: &str, max_age: i64, request_headers: &HeaderMap) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    let https = request_headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|proto| proto.eq_ignore_ascii_case("https"))
        .unwrap_or(false);
    if https {
        cookie.push_str("; Secure");
    }
    cookie
}

fn set_cookie_headers(cookie: &str) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(cookie)
            .map_err(|e| ApiError::upstream(anyhow::anyhow!("Invalid cookie header: {e}")))?,
    );
    Ok(headers)
}

/// POST /api/auth/signup - Redeem a license key for a new account
async fn signup(
    State(state): State<AppState>,
    request_headers: HeaderMap,
    Json(body): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .license_service
        .signup(&body.username, &body.password, &body.license_key)
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "Account created");

    // Log the new account straight in
    let claims = SessionClaims::new(
        user.id,
        &user.username,
        chrono::Utc::now().timestamp(),
        state.session_config.ttl_seconds,
    );
    let token = state.codec.issue(&claims);
    let cookie = session_cookie(&token, state.session_config.ttl_seconds, &request_headers);

    Ok((
        StatusCode::CREATED,
        set_cookie_headers(&cookie)?,
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    ))
}

/// POST /api/auth/login - User login
async fn login(
    State(state): State<AppState>,
    request_headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .account_service
        .login(&body.username, &body.password)
        .await?;

    let max_age = if body.remember {
        state.session_config.remember_ttl_seconds
    } else {
        state.session_config.ttl_seconds
    };

    let claims = SessionClaims::new(
        user.id,
        &user.username,
        chrono::Utc::now().timestamp(),
        max_age,
    );
    let token = state.codec.issue(&claims);
    let cookie = session_cookie(&token, max_age, &request_headers);

    tracing::info!(user_id = user.id, username = %user.username, "User logged in");

    Ok((
        set_cookie_headers(&cookie)?,
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    ))
}

/// POST /api/auth/logout - User logout
///
/// Tokens are stateless; logout just clears the browser cookie.
async fn logout() -> Result<impl IntoResponse, ApiError> {
    let cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    Ok((
        set_cookie_headers(&cookie)?,
        Json(serde_json::json!({"message": "Logged out"})),
    ))
}

/// GET /api/auth/me - Get current user
async fn get_current_user(
    Extension(user): Extension<AuthenticatedUser>,
) -> Json<UserResponse> {
    Json(user.0.into())
}

/// POST /api/license/extend - Redeem a license key to extend a subscription
async fn extend_license(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<ExtendRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state
        .license_service
        .extend(user.0.id, &body.license_key)
        .await?;

    tracing::info!(user_id = updated.id, "Subscription extended");

    Ok(Json(updated.into()))
}
