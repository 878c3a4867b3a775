//! Store coordinator (C5)
//!
//! The single writer. Every mutation — local `put`/`delete`, follower
//! `replace_snapshot`/`apply_replication`, and timer-driven
//! `snapshot`/`compact` — is processed by one task draining an mpsc queue in
//! FIFO order, so AOF byte order always matches index application order.
//! Reads (`mget`, `list_keys`) bypass the coordinator entirely and talk to
//! the lock-free `Index` directly (spec §4.5).

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{error, warn};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::persistence::{
    AofConfig, AofOp, AofRecord, AofSyncMode, AofWriter, LoadOutcome, Snapshot, SnapshotConfig,
    SnapshotFile,
};
use crate::storage::{now_ms, Entry, Index, TtlSweeper};

use super::command::{Command, ReplicationInfo, StoreStats, TtlInput};

const QUEUE_CAPACITY: usize = 1024;

enum NormalizedTtl {
    Immortal,
    ExpireAt(i64),
    DeleteNow,
}

impl TtlInput {
    fn normalize(self) -> NormalizedTtl {
        match self {
            TtlInput::Absent => NormalizedTtl::Immortal,
            TtlInput::Millis(ms) => Self::normalize_ms(ms),
            TtlInput::Text(text) => match text.trim().parse::<i64>() {
                Ok(ms) => Self::normalize_ms(ms),
                Err(_) => NormalizedTtl::Immortal,
            },
        }
    }

    fn normalize_ms(ms: i64) -> NormalizedTtl {
        if ms <= 0 {
            NormalizedTtl::DeleteNow
        } else {
            NormalizedTtl::ExpireAt(now_ms() + ms)
        }
    }
}

struct Inner {
    index: Index,
    aof: AofWriter,
    snapshot: Snapshot,
    compaction_aof_bytes: u64,
    sync_mode_label: &'static str,
    last_snapshot_at: Option<i64>,
    last_snapshot_checksum: Option<String>,
}

impl Inner {
    fn append(&mut self, record: &AofRecord) {
        if let Err(e) = self.aof.append(record) {
            error!(error = %e, key = %record.key, "aof append failed, continuing with in-memory state");
        }
        self.maybe_compact();
    }

    fn maybe_compact(&mut self) {
        let size = match self.aof.size() {
            Ok(s) => s,
            Err(_) => return,
        };
        if size >= self.compaction_aof_bytes {
            if let Err(e) = self.do_snapshot_and_truncate() {
                error!(error = %e, "size-triggered compaction failed");
            }
        }
    }

    fn do_snapshot_and_truncate(&mut self) -> Result<()> {
        let entries = self.index.live_entries();
        let file = SnapshotFile::from_entries(entries);
        self.snapshot.save(&file)?;
        self.aof.truncate()?;
        self.last_snapshot_at = Some(now_ms());
        self.last_snapshot_checksum = file.checksum.clone();
        Ok(())
    }

    fn handle_put(&mut self, key: String, value: String, ttl: TtlInput) -> Result<()> {
        match ttl.normalize() {
            NormalizedTtl::DeleteNow => {
                self.index.delete(&key);
                let record = AofRecord::del(key);
                self.append(&record);
            }
            NormalizedTtl::Immortal => {
                self.index.put(key.clone(), Entry::immortal(value.clone()));
                let record = AofRecord::set(key, value, None);
                self.append(&record);
            }
            NormalizedTtl::ExpireAt(expires_at) => {
                self.index.put(key.clone(), Entry::new(value.clone(), Some(expires_at)));
                let record = AofRecord::set(key, value, Some(expires_at));
                self.append(&record);
            }
        }
        Ok(())
    }

    fn handle_delete(&mut self, key: String) -> Result<()> {
        self.index.delete(&key);
        let record = AofRecord::del(key);
        self.append(&record);
        Ok(())
    }

    fn handle_replace_snapshot(&mut self, file: SnapshotFile) -> Result<()> {
        if file.checksum.is_some() && !file.checksum_valid() {
            return Err(StoreError::InvalidChecksum);
        }
        self.index.clear();
        for (key, entry) in file.live_entries(now_ms()) {
            self.index.put(key, entry);
        }
        self.snapshot.save(&file)?;
        self.aof.truncate()?;
        self.last_snapshot_at = Some(now_ms());
        self.last_snapshot_checksum = file.checksum.clone();
        Ok(())
    }

    /// Records without a checksum are a legacy bridge and accepted
    /// unconditionally; records with one that fails verification are
    /// silently skipped (spec §4.5).
    fn handle_apply_replication(&mut self, records: Vec<AofRecord>) -> Result<usize> {
        let mut applied = 0;
        for record in records {
            if !record.checksum.is_empty() && !record.checksum_valid() {
                warn!(key = %record.key, "replicated record failed checksum, skipping");
                continue;
            }

            match record.op {
                AofOp::Set => {
                    let value = match &record.value {
                        Some(v) => v.clone(),
                        None => {
                            warn!(key = %record.key, "replicated set missing value, skipping");
                            continue;
                        }
                    };
                    if let Some(expires_at) = record.expires_at {
                        if now_ms() > expires_at {
                            continue;
                        }
                    }
                    self.index.put(record.key.clone(), Entry::new(value, record.expires_at));
                }
                AofOp::Del => {
                    self.index.delete(&record.key);
                }
            }

            self.append(&record);
            applied += 1;
        }
        Ok(applied)
    }

    fn handle_sync(&mut self) -> Result<()> {
        self.aof.sync()
    }

    fn handle_stats(&mut self) -> Result<StoreStats> {
        Ok(StoreStats {
            key_count: self.index.len(),
            aof_size_bytes: self.aof.size().unwrap_or(0),
            snapshot_size_bytes: self.snapshot.size().ok(),
            last_snapshot_at: self.last_snapshot_at,
            last_snapshot_checksum: self.last_snapshot_checksum.clone(),
            sync_mode: self.sync_mode_label,
            compaction_aof_bytes: self.compaction_aof_bytes,
        })
    }

    fn handle_replication_info(&mut self) -> Result<ReplicationInfo> {
        Ok(ReplicationInfo {
            aof_size: self.aof.size().unwrap_or(0),
            snapshot_checksum: self.last_snapshot_checksum.clone(),
            snapshot_version: 1,
            aof_version: 1,
        })
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>, shutdown: Arc<Notify>) {
        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.dispatch(cmd);
                }
                _ = shutdown.notified() => break,
            }
        }

        if let Err(e) = self.aof.sync() {
            error!(error = %e, "final aof flush failed at shutdown");
        }
    }

    fn dispatch(&mut self, cmd: Command) {
        match cmd {
            Command::Put { key, value, ttl, reply } => {
                let _ = reply.send(self.handle_put(key, value, ttl));
            }
            Command::Delete { key, reply } => {
                let _ = reply.send(self.handle_delete(key));
            }
            Command::Sync { reply } => {
                let _ = reply.send(self.handle_sync());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.do_snapshot_and_truncate());
            }
            Command::Compact { reply } => {
                let _ = reply.send(self.do_snapshot_and_truncate());
            }
            Command::ReplaceSnapshot { file, reply } => {
                let _ = reply.send(self.handle_replace_snapshot(file));
            }
            Command::ApplyReplication { records, reply } => {
                let _ = reply.send(self.handle_apply_replication(records));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.handle_stats());
            }
            Command::ReplicationInfo { reply } => {
                let _ = reply.send(self.handle_replication_info());
            }
        }
    }
}

fn apply_replay_record(index: &Index, record: &AofRecord) {
    match record.op {
        AofOp::Set => {
            if let Some(value) = &record.value {
                if let Some(expires_at) = record.expires_at {
                    if now_ms() > expires_at {
                        return;
                    }
                }
                index.put(record.key.clone(), Entry::new(value.clone(), record.expires_at));
            }
        }
        AofOp::Del => {
            index.delete(&record.key);
        }
    }
}

fn sync_mode_label(mode: AofSyncMode) -> &'static str {
    match mode {
        AofSyncMode::Always => "always",
        AofSyncMode::Interval => "interval",
        AofSyncMode::None => "none",
    }
}

/// Handle to the running store. Cheap to clone; reads go straight to the
/// shared `Index`, writes and administrative operations are dispatched to
/// the coordinator task over its mpsc queue.
#[derive(Clone)]
pub struct Store {
    tx: mpsc::Sender<Command>,
    index: Index,
    shutdown: Arc<Notify>,
    data_dir: PathBuf,
    aof_path: PathBuf,
    snapshot_path: PathBuf,
}

impl Store {
    /// Boot sequence per spec §4.5: open/create the data dir, load the
    /// snapshot, replay the AOF (superseding snapshot state), open the AOF
    /// for append, then hand control to the coordinator task and its
    /// timers.
    pub async fn open(config: &Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let index = Index::new();

        let snapshot = Snapshot::new(SnapshotConfig::new(config.snapshot_path()))?;
        match snapshot.load()? {
            LoadOutcome::Loaded(entries) => {
                for (key, entry) in entries {
                    index.put(key, entry);
                }
            }
            LoadOutcome::NoData => {}
            LoadOutcome::ChecksumMismatch => {
                warn!("snapshot checksum mismatch at boot, relying on aof replay");
            }
        }

        let aof = AofWriter::open(AofConfig::new(config.aof_path(), config.sync_mode))?;
        for record in aof.replay()? {
            apply_replay_record(&index, &record);
        }

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let shutdown = Arc::new(Notify::new());

        let inner = Inner {
            index: index.clone(),
            aof,
            snapshot,
            compaction_aof_bytes: config.compaction_aof_bytes,
            sync_mode_label: sync_mode_label(config.sync_mode),
            last_snapshot_at: None,
            last_snapshot_checksum: None,
        };
        tokio::spawn(inner.run(rx, shutdown.clone()));

        let store = Self {
            tx,
            index,
            shutdown,
            data_dir: config.data_dir.clone(),
            aof_path: config.aof_path(),
            snapshot_path: config.snapshot_path(),
        };

        store.spawn_timers(config);
        TtlSweeper::spawn(store.index.clone(), config.ttl_check_interval_ms);

        Ok(store)
    }

    fn spawn_timers(&self, config: &Config) {
        if config.sync_mode == AofSyncMode::Interval {
            let tx = self.tx.clone();
            let interval_ms = config.sync_interval_ms;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms.max(1)));
                loop {
                    ticker.tick().await;
                    let (reply, rx) = oneshot::channel();
                    if tx.send(Command::Sync { reply }).await.is_err() {
                        break;
                    }
                    if let Ok(Err(e)) = rx.await {
                        error!(error = %e, "interval aof sync failed");
                    }
                }
            });
        }

        let tx_snapshot = self.tx.clone();
        let snapshot_interval_ms = config.snapshot_interval_ms;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(snapshot_interval_ms.max(1)));
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                let (reply, rx) = oneshot::channel();
                if tx_snapshot.send(Command::Snapshot { reply }).await.is_err() {
                    break;
                }
                if let Ok(Err(e)) = rx.await {
                    error!(error = %e, "periodic snapshot failed");
                }
            }
        });

        let tx_compact = self.tx.clone();
        let compaction_interval_ms = config.compaction_interval_ms;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(compaction_interval_ms.max(1)));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let (reply, rx) = oneshot::channel();
                if tx_compact.send(Command::Compact { reply }).await.is_err() {
                    break;
                }
                if let Ok(Err(e)) = rx.await {
                    error!(error = %e, "periodic compaction failed");
                }
            }
        });
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| StoreError::NotRunning)?;
        rx.await.map_err(|_| StoreError::NotRunning)?
    }

    pub async fn put(&self, key: String, value: String, ttl: TtlInput) -> Result<()> {
        self.call(|reply| Command::Put { key, value, ttl, reply }).await
    }

    pub async fn delete(&self, key: String) -> Result<()> {
        self.call(|reply| Command::Delete { key, reply }).await
    }

    /// Bypasses the coordinator: reads the lock-free index directly.
    pub fn get(&self, key: &str) -> Option<String> {
        self.index.get(key)
    }

    /// Bypasses the coordinator: reads the lock-free index directly.
    pub fn mget(&self, keys: &[String]) -> std::collections::HashMap<String, Option<String>> {
        self.index.mget(keys)
    }

    /// Bypasses the coordinator: reads the lock-free index directly.
    pub fn list_keys(&self, prefix: &str, limit: usize) -> Vec<String> {
        self.index.list_keys(prefix, limit)
    }

    pub async fn snapshot(&self) -> Result<()> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    pub async fn compact(&self) -> Result<()> {
        self.call(|reply| Command::Compact { reply }).await
    }

    pub async fn replace_snapshot(&self, file: SnapshotFile) -> Result<()> {
        self.call(|reply| Command::ReplaceSnapshot { file, reply }).await
    }

    pub async fn apply_replication(&self, records: Vec<AofRecord>) -> Result<usize> {
        self.call(|reply| Command::ApplyReplication { records, reply }).await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.call(|reply| Command::Stats { reply }).await
    }

    pub async fn replication_info(&self) -> Result<ReplicationInfo> {
        self.call(|reply| Command::ReplicationInfo { reply }).await
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Trigger a fresh snapshot write, then return its bytes verbatim for
    /// the leader snapshot endpoint (C6). Reads the file directly after the
    /// coordinator commits it — no coordinator round trip for the read
    /// itself.
    pub async fn snapshot_bytes(&self) -> Result<Vec<u8>> {
        self.snapshot().await?;
        Ok(tokio::fs::read(&self.snapshot_path).await?)
    }

    /// Current AOF size in bytes, read directly from the filesystem (spec
    /// §4.6: the AOF file handle is shared between C5's append and C6's
    /// per-request OS-level reads without going through the coordinator).
    pub async fn aof_size_bytes(&self) -> Result<u64> {
        Ok(tokio::fs::metadata(&self.aof_path).await?.len())
    }

    /// Read `max_bytes` starting at `since` for the AOF-range endpoint
    /// (C6). Returns the bytes read plus the current total AOF size.
    pub async fn aof_range(&self, since: u64, max_bytes: u64) -> Result<(Vec<u8>, u64)> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let mut file = tokio::fs::File::open(&self.aof_path).await?;
        let size = file.metadata().await?.len();
        file.seek(std::io::SeekFrom::Start(since)).await?;

        let to_read = size.saturating_sub(since).min(max_bytes);
        let mut buf = vec![0u8; to_read as usize];
        let n = file.read_exact(&mut buf).await.unwrap_or(0);
        buf.truncate(n.min(buf.len()));
        Ok((buf, size))
    }

    /// Flush and stop the coordinator task. No snapshot is taken (spec
    /// §4.5 shutdown).
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            data_dir: dir.to_path_buf(),
            compaction_aof_bytes: 10 * 1024 * 1024,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn nonpositive_ttl_deletes_key_immediately() {
        let dir = tempdir().unwrap();
        let store = Store::open(&test_config(dir.path())).await.unwrap();

        store
            .put("k".to_string(), "v".to_string(), TtlInput::Millis(10_000))
            .await
            .unwrap();
        assert_eq!(store.get("k"), Some("v".to_string()));

        store
            .put("k".to_string(), "ignored".to_string(), TtlInput::Millis(0))
            .await
            .unwrap();
        assert_eq!(store.get("k"), None);

        store
            .put("k2".to_string(), "v".to_string(), TtlInput::Millis(-5))
            .await
            .unwrap();
        assert_eq!(store.get("k2"), None);
    }

    #[tokio::test]
    async fn replace_snapshot_rejects_bad_checksum() {
        let dir = tempdir().unwrap();
        let store = Store::open(&test_config(dir.path())).await.unwrap();

        let mut file = SnapshotFile::from_entries(vec![(
            "a".to_string(),
            crate::storage::Entry::immortal("1".to_string()),
        )]);
        file.checksum = Some("not-the-real-checksum".to_string());

        let result = store.replace_snapshot(file).await;
        assert!(matches!(result, Err(StoreError::InvalidChecksum)));
        assert_eq!(store.get("a"), None);
    }

    #[tokio::test]
    async fn replace_snapshot_accepts_valid_checksum_and_replaces_state() {
        let dir = tempdir().unwrap();
        let store = Store::open(&test_config(dir.path())).await.unwrap();

        store
            .put("stale".to_string(), "v".to_string(), TtlInput::Absent)
            .await
            .unwrap();

        let file = SnapshotFile::from_entries(vec![(
            "fresh".to_string(),
            crate::storage::Entry::immortal("2".to_string()),
        )]);
        store.replace_snapshot(file).await.unwrap();

        assert_eq!(store.get("stale"), None);
        assert_eq!(store.get("fresh"), Some("2".to_string()));
    }

    #[tokio::test]
    async fn size_triggered_compaction_truncates_aof() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.compaction_aof_bytes = 1; // trigger on the very first append
        let store = Store::open(&config).await.unwrap();

        store
            .put("k".to_string(), "v".to_string(), TtlInput::Absent)
            .await
            .unwrap();

        // Compaction runs inline inside the append path once the threshold
        // is crossed, so by the time `put` returns the AOF has already been
        // snapshotted and truncated.
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.aof_size_bytes, 0);
        assert!(stats.snapshot_size_bytes.unwrap_or(0) > 0);
        assert_eq!(store.get("k"), Some("v".to_string()));
    }

    #[tokio::test]
    async fn apply_replication_accepts_legacy_record_without_checksum() {
        let dir = tempdir().unwrap();
        let store = Store::open(&test_config(dir.path())).await.unwrap();

        let legacy = AofRecord {
            op: AofOp::Set,
            key: "legacy".to_string(),
            value: Some("v".to_string()),
            expires_at: None,
            v: 1,
            checksum: String::new(),
        };

        let applied = store.apply_replication(vec![legacy]).await.unwrap();
        assert_eq!(applied, 1);
        assert_eq!(store.get("legacy"), Some("v".to_string()));
    }

    #[tokio::test]
    async fn apply_replication_skips_record_with_bad_checksum() {
        let dir = tempdir().unwrap();
        let store = Store::open(&test_config(dir.path())).await.unwrap();

        let mut tampered = AofRecord::set("bad".to_string(), "v".to_string(), None);
        tampered.checksum = "wrong".to_string();

        let applied = store.apply_replication(vec![tampered]).await.unwrap();
        assert_eq!(applied, 0);
        assert_eq!(store.get("bad"), None);
    }
}
