//! Bearer authentication (C8 stage 1)
//!
//! Disabled when the configured token is empty. Otherwise one of three
//! header forms must match exactly: `Authorization: Bearer <token>`,
//! `Authorization: <token>`, or `X-Toska-Token: <token>`.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use crate::http::error::unauthorized_response;
use crate::http::state::AppState;

const TOKEN_HEADER: &str = "x-toska-token";

/// An empty `token` means auth is disabled and everything is authorized.
fn is_authorized(headers: &HeaderMap, token: &str) -> bool {
    if token.is_empty() {
        return true;
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {token}") || v == token)
        .unwrap_or(false)
        || headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == token)
            .unwrap_or(false)
}

pub async fn require_bearer_token(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let token = state.config_cache.auth_token();
    if is_authorized(request.headers(), &token) {
        next.run(request).await
    } else {
        unauthorized_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(key: &str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::HeaderName::from_bytes(key.as_bytes()).unwrap(),
            value.parse().unwrap(),
        );
        headers
    }

    #[test]
    fn empty_token_disables_auth() {
        let headers = HeaderMap::new();
        assert!(is_authorized(&headers, ""));
    }

    #[test]
    fn bearer_prefixed_authorization_header_matches() {
        let headers = headers_with("authorization", "Bearer secret");
        assert!(is_authorized(&headers, "secret"));
    }

    #[test]
    fn bare_authorization_header_matches() {
        let headers = headers_with("authorization", "secret");
        assert!(is_authorized(&headers, "secret"));
    }

    #[test]
    fn x_toska_token_header_matches() {
        let headers = headers_with("x-toska-token", "secret");
        assert!(is_authorized(&headers, "secret"));
    }

    #[test]
    fn mismatched_token_is_rejected() {
        let headers = headers_with("authorization", "Bearer wrong");
        assert!(!is_authorized(&headers, "secret"));
    }

    #[test]
    fn missing_headers_rejected_when_token_configured() {
        let headers = HeaderMap::new();
        assert!(!is_authorized(&headers, "secret"));
    }
}
