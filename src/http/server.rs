//! HTTP transport: `Server::new(config).run()` wires the axum `Router`,
//! the coordinator, and (when configured) the replication follower,
//! mirroring the teacher's TCP-server `Server::run` shape.

use axum::middleware as axum_middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::health::HealthCheck;
use crate::metrics::Metrics;
use crate::middleware::{rate_limit, reject_writes_on_follower, require_bearer_token, RateLimiter};
use crate::replication::Follower;
use crate::store::Store;

use super::state::AppState;
use super::{kv, replication_routes, stats};

pub struct Server {
    config: Config,
    state: Arc<AppState>,
    health: Arc<HealthCheck>,
}

impl Server {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::open(&config).await?;
        let follower = Follower::spawn(store.clone(), &config);

        let config_cache = Arc::new(crate::config::ConfigCache::new(config.to_cache_snapshot()));

        let mut health = HealthCheck::new();
        let health_store = store.clone();
        health.register("store", move || {
            match health_store.data_dir().exists() {
                true => (crate::health::HealthStatus::Healthy, None),
                false => (crate::health::HealthStatus::Unhealthy, Some("data dir missing".to_string())),
            }
        });

        let aof_path = config.aof_path();
        health.register("aof", move || {
            match std::fs::OpenOptions::new().append(true).open(&aof_path) {
                Ok(_) => (crate::health::HealthStatus::Healthy, None),
                Err(e) => (
                    crate::health::HealthStatus::Unhealthy,
                    Some(format!("aof not writable: {e}")),
                ),
            }
        });

        if let Some(follower_handle) = follower.clone() {
            health.register("replication_follower", move || {
                let status = follower_handle.status();
                if status.state == crate::replication::FollowerStateKind::Error {
                    (crate::health::HealthStatus::Degraded, status.last_error)
                } else {
                    (crate::health::HealthStatus::Healthy, None)
                }
            });
        }

        let state = Arc::new(AppState {
            store,
            config_cache,
            follower,
            rate_limiter: Arc::new(RateLimiter::new()),
            metrics: Arc::new(Metrics::new()),
        });

        Ok(Self {
            config,
            state,
            health: Arc::new(health),
        })
    }

    fn router(&self) -> Router<Arc<AppState>> {
        let kv_and_stats = Router::new()
            .route("/kv/mget", post(kv::mget))
            .route("/kv/keys", get(kv::list_keys))
            .route("/kv/:key", get(kv::get_key).put(kv::put_key).delete(kv::delete_key))
            .route("/stats", get(stats::stats))
            .layer(axum_middleware::from_fn_with_state(
                self.state.clone(),
                reject_writes_on_follower,
            ))
            .layer(axum_middleware::from_fn_with_state(self.state.clone(), rate_limit))
            .layer(axum_middleware::from_fn_with_state(
                self.state.clone(),
                require_bearer_token,
            ));

        let replication = Router::new()
            .route("/replication/info", get(replication_routes::info))
            .route("/replication/snapshot", get(replication_routes::snapshot))
            .route("/replication/aof", get(replication_routes::aof_range))
            .route("/replication/status", get(replication_routes::status));

        Router::new()
            .route("/", get(root))
            .route("/health", get(health_check))
            .merge(kv_and_stats)
            .merge(replication)
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(30)))
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind, self.config.port).parse()?;
        // health/root handlers close over `health` via an extension rather
        // than the main app state, since it's a transport concern; metrics
        // are a request-path concern and live on `AppState` instead.
        let router = self
            .router()
            .layer(axum::Extension(self.health.clone()))
            .with_state(self.state.clone());

        info!("toska server listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await?;
        Ok(())
    }

    pub fn store(&self) -> &Store {
        &self.state.store
    }
}

async fn root() -> Response {
    Json(json!({ "service": "toska", "version": env!("CARGO_PKG_VERSION") })).into_response()
}

async fn health_check(axum::Extension(health): axum::Extension<Arc<HealthCheck>>) -> Response {
    Json(health.check()).into_response()
}
