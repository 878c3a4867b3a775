//! Shared state handed to every axum handler and middleware stage.

use std::sync::Arc;

use crate::config::ConfigCache;
use crate::metrics::Metrics;
use crate::middleware::RateLimiter;
use crate::replication::Follower;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config_cache: Arc<ConfigCache>,
    pub follower: Option<Arc<Follower>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
}
