//! Health checks
//!
//! Server health status and diagnostics, surfaced by the HTTP transport.

use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub uptime_secs: u64,
    pub version: String,
    pub checks: Vec<CheckResult>,
}

pub type CheckFn = Box<dyn Fn() -> (HealthStatus, Option<String>) + Send + Sync>;

/// Registry of named health checks (e.g. "store", "aof", "follower"), run
/// on demand when the health endpoint is hit.
pub struct HealthCheck {
    checks: HashMap<String, CheckFn>,
    start_time: Instant,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthCheck {
    pub fn new() -> Self {
        Self {
            checks: HashMap::new(),
            start_time: Instant::now(),
        }
    }

    pub fn register<F>(&mut self, name: &str, check: F)
    where
        F: Fn() -> (HealthStatus, Option<String>) + Send + Sync + 'static,
    {
        self.checks.insert(name.to_string(), Box::new(check));
    }

    pub fn check(&self) -> SystemHealth {
        let mut results = Vec::new();
        let mut overall = HealthStatus::Healthy;

        for (name, check_fn) in &self.checks {
            let start = Instant::now();
            let (status, message) = check_fn();
            let duration = start.elapsed();

            match status {
                HealthStatus::Unhealthy => overall = HealthStatus::Unhealthy,
                HealthStatus::Degraded if overall == HealthStatus::Healthy => {
                    overall = HealthStatus::Degraded;
                }
                _ => {}
            }

            results.push(CheckResult {
                name: name.clone(),
                status,
                message,
                duration_ms: duration.as_millis(),
            });
        }

        SystemHealth {
            status: overall,
            uptime_secs: self.start_time.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks: results,
        }
    }

    pub fn liveness(&self) -> bool {
        true
    }

    pub fn readiness(&self) -> bool {
        self.check().status == HealthStatus::Healthy
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_status_degrades_to_worst_check() {
        let mut health = HealthCheck::new();
        health.register("store", || (HealthStatus::Healthy, None));
        health.register("aof", || (HealthStatus::Degraded, Some("sync lag".to_string())));

        let result = health.check();
        assert_eq!(result.status, HealthStatus::Degraded);
        assert_eq!(result.checks.len(), 2);
    }

    #[test]
    fn liveness_and_readiness_with_no_checks() {
        let health = HealthCheck::new();
        assert!(health.liveness());
        assert!(health.readiness());
    }

    #[test]
    fn unhealthy_check_wins_over_degraded() {
        let mut health = HealthCheck::new();
        health.register("a", || (HealthStatus::Degraded, None));
        health.register("b", || (HealthStatus::Unhealthy, Some("aof write failed".to_string())));
        assert_eq!(health.check().status, HealthStatus::Unhealthy);
    }
}
