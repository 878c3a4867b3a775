//! `GET /stats` (spec §6.1).

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;

use super::state::AppState;

pub async fn stats(State(state): State<Arc<AppState>>) -> Response {
    match state.store.stats().await {
        Ok(s) => Json(json!({
            "key_count": s.key_count,
            "aof_size_bytes": s.aof_size_bytes,
            "snapshot_size_bytes": s.snapshot_size_bytes,
            "last_snapshot_at": s.last_snapshot_at,
            "last_snapshot_checksum": s.last_snapshot_checksum,
            "sync_mode": s.sync_mode,
            "compaction_aof_bytes": s.compaction_aof_bytes,
            "total_ops": state.metrics.total_ops(),
            "ops_by_command": state.metrics.ops_by_command(),
            "avg_latency_us": state.metrics.avg_latency_us(),
            "min_latency_us": state.metrics.min_latency_us(),
            "max_latency_us": state.metrics.max_latency_us(),
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}
