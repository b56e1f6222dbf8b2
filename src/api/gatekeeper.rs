//! Perimeter gatekeeper
//!
//! Outermost middleware for page navigation. Requests to anything outside
//! a small allow-list must carry a valid session cookie; everything else is
//! bounced to the login page with the original destination preserved in a
//! `redirect` query parameter. API routes are exempt here and enforce their
//! own authentication, so they answer 401 instead of redirecting.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::api::middleware::{extract_session_token, AppState};

/// Path prefixes reachable without a session.
const ALLOWED_PREFIXES: &[&str] = &["/login", "/signup", "/api/", "/assets/", "/favicon.ico"];

fn is_allowed(path: &str) -> bool {
    ALLOWED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn login_redirect(request: &Request) -> Response {
    let destination = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = format!("/login?redirect={}", urlencoding::encode(destination));
    Redirect::temporary(&target).into_response()
}

/// Gatekeeper middleware
pub async fn gatekeeper(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if is_allowed(request.uri().path()) {
        return next.run(request).await;
    }

    let valid = extract_session_token(&request)
        .map(|token| state.codec.verify(&token).is_ok())
        .unwrap_or(false);

    if valid {
        next.run(request).await
    } else {
        login_redirect(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_allow_list() {
        for path in [
            "/login",
            "/login?redirect=%2Ftasks",
            "/signup",
            "/api/auth/login",
            "/api/tasks",
            "/assets/app.js",
            "/favicon.ico",
        ] {
            assert!(is_allowed(path.split('?').next().unwrap()), "{path}");
        }
        for path in ["/", "/tasks", "/machines", "/api", "/files"] {
            assert!(!is_allowed(path), "{path}");
        }
    }

    #[test]
    fn test_login_redirect_preserves_destination() {
        let request = Request::builder()
            .uri("/tasks?page=2&sort=name")
            .body(Body::empty())
            .unwrap();
        let response = login_redirect(&request);
        assert_eq!(response.status(), axum::http::StatusCode::TEMPORARY_REDIRECT);
        let location = response
            .headers()
            .get(axum::http::header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(location, "/login?redirect=%2Ftasks%3Fpage%3D2%26sort%3Dname");
    }

    #[test]
    fn test_login_redirect_defaults_to_root() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = login_redirect(&request);
        let location = response
            .headers()
            .get(axum::http::header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(location, "/login?redirect=%2F");
    }
}
