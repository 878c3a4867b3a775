//! Configuration surface and hot-path config cache (C9)
//!
//! `Config` is the full, typed configuration surface (spec §6.3): defaults,
//! overlaid by an optional TOML file, overlaid by `TOSKA_*` environment
//! variables. `ConfigCache` republishes the handful of values read on every
//! request (`auth_token`, `rate_limit_per_sec`, `rate_limit_burst`,
//! `replica_url`) behind an `ArcSwap` so C8 and C7 never contend with the
//! (rare) config writer.

use arc_swap::ArcSwap;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::persistence::AofSyncMode;

fn parse_sync_mode(s: &str) -> AofSyncMode {
    match s {
        "always" => AofSyncMode::Always,
        "none" => AofSyncMode::None,
        _ => AofSyncMode::Interval,
    }
}

/// Full configuration surface (spec §6.3).
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,

    pub data_dir: PathBuf,
    pub aof_file: String,
    pub snapshot_file: String,

    pub sync_mode: AofSyncMode,
    pub sync_interval_ms: u64,
    pub snapshot_interval_ms: u64,
    pub ttl_check_interval_ms: u64,
    pub compaction_interval_ms: u64,
    pub compaction_aof_bytes: u64,

    pub replica_url: String,
    pub replica_poll_interval_ms: u64,
    pub replica_http_timeout_ms: u64,

    pub auth_token: String,
    pub rate_limit_per_sec: f64,
    pub rate_limit_burst: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 7878,

            data_dir: PathBuf::from("./data"),
            aof_file: "toska.aof".to_string(),
            snapshot_file: "toska_snapshot.json".to_string(),

            sync_mode: AofSyncMode::Interval,
            sync_interval_ms: 1000,
            snapshot_interval_ms: 300_000,
            ttl_check_interval_ms: 1000,
            compaction_interval_ms: 300_000,
            compaction_aof_bytes: 10 * 1024 * 1024,

            replica_url: String::new(),
            replica_poll_interval_ms: 1000,
            replica_http_timeout_ms: 5000,

            auth_token: String::new(),
            rate_limit_per_sec: 0.0,
            rate_limit_burst: 0.0,
        }
    }
}

/// Subset of `Config` keys a TOML file may override. Any field absent from
/// the file keeps its default.
#[derive(Debug, Default, Deserialize)]
struct FileOverlay {
    bind: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
    aof_file: Option<String>,
    snapshot_file: Option<String>,
    sync_mode: Option<String>,
    sync_interval_ms: Option<u64>,
    snapshot_interval_ms: Option<u64>,
    ttl_check_interval_ms: Option<u64>,
    compaction_interval_ms: Option<u64>,
    compaction_aof_bytes: Option<u64>,
    replica_url: Option<String>,
    replica_poll_interval_ms: Option<u64>,
    replica_http_timeout_ms: Option<u64>,
    auth_token: Option<String>,
    rate_limit_per_sec: Option<f64>,
    rate_limit_burst: Option<f64>,
}

impl Config {
    /// Load defaults, overlay an optional TOML config file, then overlay
    /// `TOSKA_*` environment variables. Each layer only touches the keys it
    /// actually sets.
    pub fn load(file_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(path) = file_path {
            if path.exists() {
                let text = std::fs::read_to_string(path)?;
                let overlay: FileOverlay = toml::from_str(&text)?;
                config.apply_overlay(overlay);
            }
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_overlay(&mut self, overlay: FileOverlay) {
        if let Some(v) = overlay.bind {
            self.bind = v;
        }
        if let Some(v) = overlay.port {
            self.port = v;
        }
        if let Some(v) = overlay.data_dir {
            self.data_dir = v;
        }
        if let Some(v) = overlay.aof_file {
            self.aof_file = v;
        }
        if let Some(v) = overlay.snapshot_file {
            self.snapshot_file = v;
        }
        if let Some(v) = overlay.sync_mode {
            self.sync_mode = parse_sync_mode(&v);
        }
        if let Some(v) = overlay.sync_interval_ms {
            self.sync_interval_ms = v;
        }
        if let Some(v) = overlay.snapshot_interval_ms {
            self.snapshot_interval_ms = v;
        }
        if let Some(v) = overlay.ttl_check_interval_ms {
            self.ttl_check_interval_ms = v;
        }
        if let Some(v) = overlay.compaction_interval_ms {
            self.compaction_interval_ms = v;
        }
        if let Some(v) = overlay.compaction_aof_bytes {
            self.compaction_aof_bytes = v;
        }
        if let Some(v) = overlay.replica_url {
            self.replica_url = v;
        }
        if let Some(v) = overlay.replica_poll_interval_ms {
            self.replica_poll_interval_ms = v;
        }
        if let Some(v) = overlay.replica_http_timeout_ms {
            self.replica_http_timeout_ms = v;
        }
        if let Some(v) = overlay.auth_token {
            self.auth_token = v;
        }
        if let Some(v) = overlay.rate_limit_per_sec {
            self.rate_limit_per_sec = v;
        }
        if let Some(v) = overlay.rate_limit_burst {
            self.rate_limit_burst = v;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("TOSKA_BIND") {
            self.bind = v;
        }
        if let Ok(v) = env::var("TOSKA_PORT") {
            if let Ok(v) = v.parse() {
                self.port = v;
            }
        }
        if let Ok(v) = env::var("TOSKA_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("TOSKA_AOF_FILE") {
            self.aof_file = v;
        }
        if let Ok(v) = env::var("TOSKA_SNAPSHOT_FILE") {
            self.snapshot_file = v;
        }
        if let Ok(v) = env::var("TOSKA_SYNC_MODE") {
            self.sync_mode = parse_sync_mode(&v);
        }
        if let Ok(v) = env_u64("TOSKA_SYNC_INTERVAL_MS") {
            self.sync_interval_ms = v;
        }
        if let Ok(v) = env_u64("TOSKA_SNAPSHOT_INTERVAL_MS") {
            self.snapshot_interval_ms = v;
        }
        if let Ok(v) = env_u64("TOSKA_TTL_CHECK_INTERVAL_MS") {
            self.ttl_check_interval_ms = v;
        }
        if let Ok(v) = env_u64("TOSKA_COMPACTION_INTERVAL_MS") {
            self.compaction_interval_ms = v;
        }
        if let Ok(v) = env_u64("TOSKA_COMPACTION_AOF_BYTES") {
            self.compaction_aof_bytes = v;
        }
        if let Ok(v) = env::var("TOSKA_REPLICA_URL") {
            self.replica_url = v;
        }
        if let Ok(v) = env_u64("TOSKA_REPLICA_POLL_INTERVAL_MS") {
            self.replica_poll_interval_ms = v;
        }
        if let Ok(v) = env_u64("TOSKA_REPLICA_HTTP_TIMEOUT_MS") {
            self.replica_http_timeout_ms = v;
        }
        if let Ok(v) = env::var("TOSKA_AUTH_TOKEN") {
            self.auth_token = v;
        }
        if let Ok(v) = env::var("TOSKA_RATE_LIMIT_PER_SEC") {
            if let Ok(v) = v.parse() {
                self.rate_limit_per_sec = v;
            }
        }
        if let Ok(v) = env::var("TOSKA_RATE_LIMIT_BURST") {
            if let Ok(v) = v.parse() {
                self.rate_limit_burst = v;
            }
        }
    }

    pub fn aof_path(&self) -> PathBuf {
        self.data_dir.join(&self.aof_file)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshot_file)
    }

    pub fn replica_offset_path(&self) -> PathBuf {
        self.data_dir.join("replica.offset")
    }

    pub fn is_follower(&self) -> bool {
        !self.replica_url.is_empty()
    }

    pub fn to_cache_snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            auth_token: self.auth_token.clone(),
            rate_limit_per_sec: self.rate_limit_per_sec,
            rate_limit_burst: self.rate_limit_burst,
            replica_url: self.replica_url.clone(),
        }
    }
}

fn env_u64(key: &str) -> Result<u64, ()> {
    env::var(key).ok().and_then(|v| v.parse().ok()).ok_or(())
}

/// The values C8 and C7 read on every request.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub auth_token: String,
    pub rate_limit_per_sec: f64,
    pub rate_limit_burst: f64,
    pub replica_url: String,
}

/// Wait-free-read cache over the hot-path config values. The config writer
/// (the `load`/reload path) takes the slow path via `ArcSwap::store`; readers
/// pay only an atomic load. Environment variables always take precedence
/// over the stored snapshot, checked fresh on every read.
pub struct ConfigCache {
    inner: ArcSwap<ConfigSnapshot>,
}

impl ConfigCache {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(snapshot)),
        }
    }

    pub fn store(&self, snapshot: ConfigSnapshot) {
        self.inner.store(Arc::new(snapshot));
    }

    pub fn auth_token(&self) -> String {
        env::var("TOSKA_AUTH_TOKEN").unwrap_or_else(|_| self.inner.load().auth_token.clone())
    }

    pub fn rate_limit_per_sec(&self) -> f64 {
        env::var("TOSKA_RATE_LIMIT_PER_SEC")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| self.inner.load().rate_limit_per_sec)
    }

    pub fn rate_limit_burst(&self) -> f64 {
        env::var("TOSKA_RATE_LIMIT_BURST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| self.inner.load().rate_limit_burst)
    }

    pub fn replica_url(&self) -> String {
        env::var("TOSKA_REPLICA_URL").unwrap_or_else(|_| self.inner.load().replica_url.clone())
    }

    pub fn is_follower(&self) -> bool {
        !self.replica_url().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_auth_and_rate_limit_disabled() {
        let config = Config::default();
        assert!(config.auth_token.is_empty());
        assert_eq!(config.rate_limit_per_sec, 0.0);
        assert!(!config.is_follower());
    }

    #[test]
    fn cache_reflects_stored_snapshot() {
        let cache = ConfigCache::new(ConfigSnapshot {
            auth_token: "secret".to_string(),
            rate_limit_per_sec: 5.0,
            rate_limit_burst: 10.0,
            replica_url: String::new(),
        });
        assert_eq!(cache.auth_token(), "secret");
        assert_eq!(cache.rate_limit_per_sec(), 5.0);
        assert!(!cache.is_follower());

        cache.store(ConfigSnapshot {
            auth_token: "secret".to_string(),
            rate_limit_per_sec: 5.0,
            rate_limit_burst: 10.0,
            replica_url: "http://leader:7878".to_string(),
        });
        assert!(cache.is_follower());
    }

    #[test]
    fn paths_are_joined_under_data_dir() {
        let mut config = Config::default();
        config.data_dir = PathBuf::from("/tmp/toska-test");
        assert_eq!(config.aof_path(), PathBuf::from("/tmp/toska-test/toska.aof"));
        assert_eq!(
            config.snapshot_path(),
            PathBuf::from("/tmp/toska-test/toska_snapshot.json")
        );
    }
}
