//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP API endpoints for the dump dashboard:
//! - Auth endpoints (signup, login, logout, me, license extension)
//! - Task endpoints
//! - Machine endpoints
//! - Dump file endpoints with signed downloads
//! - Notification and preset endpoints
//! - Worker endpoints (API-key authenticated)

pub mod auth;
pub mod files;
pub mod gatekeeper;
pub mod machines;
pub mod middleware;
pub mod notifications;
pub mod presets;
pub mod tasks;
pub mod worker;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Worker routes authenticate by API key, not session
    let worker_routes = Router::new()
        .nest("/worker", worker::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_worker,
        ));

    // Protected routes (need a valid session)
    let protected_routes = Router::new()
        .merge(auth::protected_router())
        .nest("/tasks", tasks::router())
        .nest("/machines", machines::router())
        .nest("/files", files::router())
        .nest("/notifications", notifications::router())
        .nest("/presets", presets::router())
        .nest("/file-types", presets::file_types_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .merge(auth::public_router())
        .merge(files::download_router())
        .merge(worker_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    // CORS must allow credentials for cookie-based auth
    let cors = CorsLayer::new()
        .allow_origin(cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Ok(Router::new()
        .nest("/api", build_api_router(state.clone()))
        .layer(cors)
        // Perimeter gatekeeper: page navigation without a session bounces
        // to /login
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            gatekeeper::gatekeeper,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
