//! Replication leader endpoints (C6) + follower status (C7).
//!
//! Thin wrappers over `Store`: the heavy lifting (atomic snapshot write,
//! direct-from-disk AOF range reads) lives in `store::Store`.

use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::StoreError;
use crate::http::error::empty_with_status;

use super::state::AppState;

const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;
const MAX_BYTES_CAP: u64 = 8 * 1024 * 1024;

pub async fn info(State(state): State<Arc<AppState>>) -> Response {
    match state.store.replication_info().await {
        Ok(info) => Json(json!({
            "aof_size": info.aof_size,
            "snapshot_checksum": info.snapshot_checksum,
            "snapshot_version": info.snapshot_version,
            "aof_version": info.aof_version,
            "is_follower": state.config_cache.is_follower(),
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn snapshot(State(state): State<Arc<AppState>>) -> Response {
    let bytes = match state.store.snapshot_bytes().await {
        Ok(b) => b,
        Err(e) => return e.into_response(),
    };
    let info = match state.store.replication_info().await {
        Ok(i) => i,
        Err(e) => return e.into_response(),
    };

    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(
        "x-toska-snapshot-checksum",
        HeaderValue::from_str(info.snapshot_checksum.as_deref().unwrap_or("")).unwrap_or(HeaderValue::from_static("")),
    );
    headers.insert(
        "x-toska-snapshot-version",
        HeaderValue::from_str(&info.snapshot_version.to_string()).expect("integer formats as valid header value"),
    );
    headers.insert(
        "x-toska-aof-version",
        HeaderValue::from_str(&info.aof_version.to_string()).expect("integer formats as valid header value"),
    );
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    response
}

#[derive(Debug, Deserialize)]
pub struct AofRangeQuery {
    since: Option<i64>,
    max_bytes: Option<u64>,
}

pub async fn aof_range(State(state): State<Arc<AppState>>, Query(query): Query<AofRangeQuery>) -> Response {
    let since = query.since.unwrap_or(0);
    if since < 0 {
        return StoreError::InvalidOffset.into_response();
    }
    let since = since as u64;
    let max_bytes = query.max_bytes.unwrap_or(DEFAULT_MAX_BYTES).min(MAX_BYTES_CAP);

    let current_size = match state.store.aof_size_bytes().await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };

    if since >= current_size {
        let mut response = empty_with_status(StatusCode::NO_CONTENT);
        response
            .headers_mut()
            .insert("x-toska-aof-size", HeaderValue::from_str(&current_size.to_string()).unwrap());
        return response;
    }

    let (bytes, aof_size) = match state.store.aof_range(since, max_bytes).await {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };

    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    headers.insert("x-toska-aof-size", HeaderValue::from_str(&aof_size.to_string()).unwrap());
    headers.insert("x-toska-aof-offset", HeaderValue::from_str(&since.to_string()).unwrap());
    response
}

pub async fn status(State(state): State<Arc<AppState>>) -> Response {
    match &state.follower {
        Some(follower) => Json(follower.status()).into_response(),
        None => StoreError::NoFollower.into_response(),
    }
}
