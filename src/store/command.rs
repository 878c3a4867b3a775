//! Messages accepted by the coordinator task (C5).
//!
//! Shaped after the teacher's `WorkItem`/`WorkResult` pair: one request
//! envelope, one reply channel, a single worker draining the queue in
//! order. Here the queue is a bounded `tokio::mpsc` channel instead of a
//! `crossbeam` channel, since the coordinator is an async task rather than
//! a pool of OS threads.

use tokio::sync::oneshot;

use crate::error::Result;
use crate::persistence::{AofRecord, SnapshotFile};

/// Raw TTL as received from the HTTP layer, before normalization (spec
/// §4.5 TTL normalization).
#[derive(Debug, Clone)]
pub enum TtlInput {
    Absent,
    Millis(i64),
    Text(String),
}

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub key_count: usize,
    pub aof_size_bytes: u64,
    pub snapshot_size_bytes: Option<u64>,
    pub last_snapshot_at: Option<i64>,
    pub last_snapshot_checksum: Option<String>,
    pub sync_mode: &'static str,
    pub compaction_aof_bytes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ReplicationInfo {
    pub aof_size: u64,
    pub snapshot_checksum: Option<String>,
    pub snapshot_version: u32,
    pub aof_version: u32,
}

pub enum Command {
    Put {
        key: String,
        value: String,
        ttl: TtlInput,
        reply: oneshot::Sender<Result<()>>,
    },
    Delete {
        key: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Sync {
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<()>>,
    },
    Compact {
        reply: oneshot::Sender<Result<()>>,
    },
    ReplaceSnapshot {
        file: SnapshotFile,
        reply: oneshot::Sender<Result<()>>,
    },
    ApplyReplication {
        records: Vec<AofRecord>,
        reply: oneshot::Sender<Result<usize>>,
    },
    Stats {
        reply: oneshot::Sender<Result<StoreStats>>,
    },
    ReplicationInfo {
        reply: oneshot::Sender<Result<ReplicationInfo>>,
    },
}
