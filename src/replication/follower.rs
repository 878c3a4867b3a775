//! Replication follower (C7)
//!
//! A single task with a timer-driven poll loop. State lives behind an
//! `ArcSwap` so the HTTP status endpoint can read it without contending
//! with the poll loop (same hot-path-cache discipline as C9).

use arc_swap::ArcSwap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::persistence::{AofRecord, SnapshotFile};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowerStateKind {
    Bootstrapping,
    Tailing,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct FollowerStatusSnapshot {
    pub state: FollowerStateKind,
    pub offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Read the persisted byte offset, if any. Absence means "never
/// bootstrapped" rather than "offset zero".
fn load_persisted_offset(path: &Path) -> Option<u64> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// The status to publish at startup, and whether the first tick should
/// (re)run `bootstrap()` rather than `poll()`.
fn initial_status(persisted: Option<u64>) -> (FollowerStatusSnapshot, bool) {
    match persisted {
        Some(offset) => (
            FollowerStatusSnapshot {
                state: FollowerStateKind::Tailing,
                offset,
                last_error: None,
            },
            false,
        ),
        None => (
            FollowerStatusSnapshot {
                state: FollowerStateKind::Bootstrapping,
                offset: 0,
                last_error: None,
            },
            true,
        ),
    }
}

/// `true` when the leader's advertised AOF size has dropped below our
/// stored offset — a compaction truncated the log out from under us.
fn truncated(offset: u64, aof_size: u64) -> bool {
    aof_size < offset
}

fn offset_after_no_content(offset: u64, aof_size: u64) -> u64 {
    offset.max(aof_size)
}

fn offset_after_range(offset: u64, body_len: usize, aof_size: u64) -> u64 {
    (offset + body_len as u64).max(aof_size)
}

/// Split a poll response body on newlines and decode each candidate
/// record, skipping (and warning on) lines that don't decode.
fn parse_records(body: &[u8]) -> Vec<AofRecord> {
    body.split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_slice(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "skipping undecodable replication record");
                None
            }
        })
        .collect()
}

pub struct Follower {
    store: Store,
    client: reqwest::Client,
    leader_url: String,
    poll_interval: Duration,
    offset_path: PathBuf,
    status: ArcSwap<FollowerStatusSnapshot>,
    /// `true` when the next tick should (re)run `bootstrap()` rather than
    /// `poll()`. Independent of the publicly reported `FollowerStateKind`,
    /// which may sit at `Error` while this still records which step to
    /// retry (spec §4.7: "it retries the current step on the next poll
    /// tick").
    next_is_bootstrap: AtomicBool,
}

impl Follower {
    /// Returns `None` (no follower task) when `replica_url` is unset.
    pub fn spawn(store: Store, config: &Config) -> Option<Arc<Follower>> {
        if !config.is_follower() {
            return None;
        }

        let offset_path = config.replica_offset_path();
        let persisted = load_persisted_offset(&offset_path);
        let (initial, next_is_bootstrap) = initial_status(persisted);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.replica_http_timeout_ms))
            .connect_timeout(Duration::from_millis(config.replica_http_timeout_ms))
            .build()
            .expect("reqwest client builds with static config");

        let follower = Arc::new(Follower {
            store,
            client,
            leader_url: config.replica_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_millis(config.replica_poll_interval_ms.max(1)),
            offset_path,
            status: ArcSwap::new(Arc::new(initial)),
            next_is_bootstrap: AtomicBool::new(next_is_bootstrap),
        });

        let handle = follower.clone();
        tokio::spawn(async move { handle.run().await });
        Some(follower)
    }

    pub fn status(&self) -> FollowerStatusSnapshot {
        (**self.status.load()).clone()
    }

    async fn run(self: Arc<Self>) {
        loop {
            self.tick().await;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Dispatches to whichever step is pending. Driven by `next_is_bootstrap`
    /// rather than the last reported `FollowerStateKind`, so an `Error`
    /// entered from `BOOTSTRAPPING` retries `bootstrap()` again instead of
    /// falling through to `poll()` and tailing from an unloaded baseline.
    async fn tick(&self) {
        if self.next_is_bootstrap.load(Ordering::Acquire) {
            self.bootstrap().await;
        } else {
            self.poll().await;
        }
    }

    fn set_state(&self, state: FollowerStateKind, offset: u64, last_error: Option<String>) {
        self.status.store(Arc::new(FollowerStatusSnapshot {
            state,
            offset,
            last_error,
        }));
    }

    /// Records the error but leaves `next_is_bootstrap` untouched, so the
    /// next tick retries whichever step just failed.
    fn set_error(&self, message: String) {
        warn!(error = %message, "replication follower error");
        let offset = self.status().offset;
        self.set_state(FollowerStateKind::Error, offset, Some(message));
    }

    fn persist_offset(&self, offset: u64) {
        if let Err(e) = std::fs::write(&self.offset_path, offset.to_string()) {
            error!(error = %e, "failed to persist replica offset");
        }
    }

    async fn bootstrap(&self) {
        let url = format!("{}/replication/snapshot", self.leader_url);
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return self.set_error(format!("snapshot fetch failed: {e}")),
        };

        if !response.status().is_success() {
            return self.set_error(format!("snapshot fetch returned {}", response.status()));
        }

        let file: SnapshotFile = match response.json().await {
            Ok(f) => f,
            Err(e) => return self.set_error(format!("snapshot decode failed: {e}")),
        };

        match self.store.replace_snapshot(file).await {
            Ok(()) => {
                info!("bootstrap complete, entering tailing state");
                self.next_is_bootstrap.store(false, Ordering::Release);
                self.persist_offset(0);
                self.set_state(FollowerStateKind::Tailing, 0, None);
            }
            Err(e) => self.set_error(format!("replace_snapshot failed: {e}")),
        }
    }

    async fn poll(&self) {
        let offset = self.status().offset;
        let url = format!(
            "{}/replication/aof?since={}&max_bytes=65536",
            self.leader_url, offset
        );

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return self.set_error(format!("aof poll failed: {e}")),
        };

        let status = response.status();
        let aof_size: u64 = response
            .headers()
            .get("x-toska-aof-size")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(offset);

        // The leader's advertised size dropping below our stored offset means
        // a compaction truncated the log out from under us; re-bootstrap
        // rather than stall forever (spec §4.7, upgraded to MUST).
        if truncated(offset, aof_size) {
            warn!(offset, aof_size, "leader truncation detected, re-bootstrapping");
            self.next_is_bootstrap.store(true, Ordering::Release);
            self.set_state(FollowerStateKind::Bootstrapping, offset, None);
            return;
        }

        if status == reqwest::StatusCode::NO_CONTENT {
            let new_offset = offset_after_no_content(offset, aof_size);
            self.persist_offset(new_offset);
            self.set_state(FollowerStateKind::Tailing, new_offset, None);
            return;
        }

        if !status.is_success() {
            return self.set_error(format!("aof poll returned {status}"));
        }

        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => return self.set_error(format!("aof body read failed: {e}")),
        };

        let records = parse_records(&body);

        if let Err(e) = self.store.apply_replication(records).await {
            return self.set_error(format!("apply_replication failed: {e}"));
        }

        let new_offset = offset_after_range(offset, body.len(), aof_size);
        self.persist_offset(new_offset);
        self.set_state(FollowerStateKind::Tailing, new_offset, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::AofOp;
    use tempfile::tempdir;

    #[test]
    fn initial_status_without_persisted_offset_is_bootstrapping() {
        let (status, next_is_bootstrap) = initial_status(None);
        assert_eq!(status.state, FollowerStateKind::Bootstrapping);
        assert_eq!(status.offset, 0);
        assert!(next_is_bootstrap);
    }

    #[test]
    fn initial_status_with_persisted_offset_is_tailing() {
        let (status, next_is_bootstrap) = initial_status(Some(512));
        assert_eq!(status.state, FollowerStateKind::Tailing);
        assert_eq!(status.offset, 512);
        assert!(!next_is_bootstrap);
    }

    #[test]
    fn load_persisted_offset_reads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.offset");
        std::fs::write(&path, "128").unwrap();
        assert_eq!(load_persisted_offset(&path), Some(128));
    }

    #[test]
    fn load_persisted_offset_missing_file_is_none() {
        let dir = tempdir().unwrap();
        assert_eq!(load_persisted_offset(&dir.path().join("missing")), None);
    }

    #[test]
    fn truncation_detected_when_aof_size_drops_below_offset() {
        assert!(truncated(1000, 200));
        assert!(!truncated(200, 1000));
        assert!(!truncated(200, 200));
    }

    #[test]
    fn offset_after_no_content_never_goes_backwards() {
        assert_eq!(offset_after_no_content(100, 50), 100);
        assert_eq!(offset_after_no_content(100, 150), 150);
    }

    #[test]
    fn offset_after_range_advances_by_body_or_header_whichever_larger() {
        assert_eq!(offset_after_range(100, 50, 120), 150);
        assert_eq!(offset_after_range(100, 10, 500), 500);
    }

    #[test]
    fn parse_records_skips_undecodable_lines() {
        let record = AofRecord::set("k".into(), "v".into(), None);
        let good_line = serde_json::to_string(&record).unwrap();
        let body = format!("{good_line}\nnot json\n");
        let records = parse_records(body.as_bytes());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].op, AofOp::Set);
    }

    fn follower_config(dir: &Path) -> Config {
        Config {
            data_dir: dir.to_path_buf(),
            replica_url: "http://127.0.0.1:1".to_string(),
            replica_http_timeout_ms: 200,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn spawn_returns_none_when_not_configured_as_follower() {
        let dir = tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let store = Store::open(&config).await.unwrap();
        assert!(Follower::spawn(store, &config).is_none());
    }

    #[tokio::test]
    async fn error_during_bootstrap_keeps_retrying_bootstrap_not_poll() {
        let dir = tempdir().unwrap();
        let config = follower_config(dir.path());
        let store = Store::open(&config).await.unwrap();
        let follower = Follower::spawn(store, &config).expect("follower configured");

        // Drive one tick directly instead of waiting on the poll-interval
        // timer; port 1 refuses the connection immediately.
        follower.tick().await;

        assert_eq!(follower.status().state, FollowerStateKind::Error);
        assert!(
            follower.next_is_bootstrap.load(Ordering::Relaxed),
            "a failed bootstrap must retry bootstrap, not fall through to polling"
        );
    }

    #[tokio::test]
    async fn error_during_poll_keeps_retrying_poll_not_bootstrap() {
        let dir = tempdir().unwrap();
        let config = follower_config(dir.path());
        std::fs::write(config.replica_offset_path(), "42").unwrap();
        let store = Store::open(&config).await.unwrap();
        let follower = Follower::spawn(store, &config).expect("follower configured");

        assert_eq!(follower.status().state, FollowerStateKind::Tailing);
        follower.tick().await;

        assert_eq!(follower.status().state, FollowerStateKind::Error);
        assert!(
            !follower.next_is_bootstrap.load(Ordering::Relaxed),
            "a failed poll must retry polling, not jump back to bootstrap"
        );
    }
}
