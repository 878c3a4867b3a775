//! Read-only follower gate (C8 stage 3)
//!
//! Rejects `PUT`/`DELETE` on `/kv/...` while follower mode is active
//! (non-empty `replica_url`). Reads and non-KV paths are unaffected.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use crate::http::error::read_only_response;
use crate::http::state::AppState;

pub async fn reject_writes_on_follower(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mutates = matches!(*request.method(), Method::PUT | Method::DELETE)
        && request.uri().path().starts_with("/kv/");

    if mutates && state.config_cache.is_follower() {
        read_only_response()
    } else {
        next.run(request).await
    }
}
