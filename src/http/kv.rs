//! KV HTTP surface (spec §6.1): GET/PUT/DELETE `/kv/{key}`, `POST /kv/mget`,
//! `GET /kv/keys`.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use crate::error::StoreError;
use crate::store::TtlInput;

use super::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTtl {
    Int(i64),
    Text(String),
}

impl From<Option<RawTtl>> for TtlInput {
    fn from(raw: Option<RawTtl>) -> Self {
        match raw {
            None => TtlInput::Absent,
            Some(RawTtl::Int(ms)) => TtlInput::Millis(ms),
            Some(RawTtl::Text(text)) => TtlInput::Text(text),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PutBody {
    value: Option<serde_json::Value>,
    ttl_ms: Option<RawTtl>,
}

pub async fn get_key(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Response {
    let start = Instant::now();
    let response = match state.store.get(&key) {
        Some(value) => Json(json!({ "key": key, "value": value })).into_response(),
        None => StoreError::NotFound.into_response(),
    };
    state.metrics.record_operation("get", start.elapsed());
    response
}

pub async fn put_key(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<PutBody>,
) -> Response {
    let start = Instant::now();
    let value = match body.value {
        Some(serde_json::Value::String(s)) => s,
        _ => return StoreError::InvalidPayload.into_response(),
    };

    let response = match state.store.put(key.clone(), value, body.ttl_ms.into()).await {
        Ok(()) => Json(json!({ "ok": true, "key": key })).into_response(),
        Err(e) => e.into_response(),
    };
    state.metrics.record_operation("put", start.elapsed());
    response
}

pub async fn delete_key(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Response {
    let start = Instant::now();
    let response = match state.store.delete(key.clone()).await {
        Ok(()) => Json(json!({ "ok": true, "key": key })).into_response(),
        Err(e) => e.into_response(),
    };
    state.metrics.record_operation("delete", start.elapsed());
    response
}

#[derive(Debug, Deserialize)]
pub struct MgetBody {
    keys: serde_json::Value,
}

pub async fn mget(State(state): State<Arc<AppState>>, Json(body): Json<MgetBody>) -> Response {
    let start = Instant::now();
    let keys: Vec<String> = match body.keys {
        serde_json::Value::Array(items) => {
            match items
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => Some(s),
                    _ => None,
                })
                .collect::<Option<Vec<String>>>()
            {
                Some(keys) => keys,
                None => return StoreError::InvalidKeys.into_response(),
            }
        }
        _ => return StoreError::InvalidKeys.into_response(),
    };

    let values = state.store.mget(&keys);
    state.metrics.record_operation("mget", start.elapsed());
    Json(json!({ "values": values })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListKeysQuery {
    #[serde(default)]
    prefix: String,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListKeysResponse {
    keys: Vec<String>,
}

pub async fn list_keys(State(state): State<Arc<AppState>>, Query(query): Query<ListKeysQuery>) -> Response {
    let start = Instant::now();
    let limit = query.limit.unwrap_or(100);
    let keys = state.store.list_keys(&query.prefix, limit);
    state.metrics.record_operation("list_keys", start.elapsed());
    Json(ListKeysResponse { keys }).into_response()
}
