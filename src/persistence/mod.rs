//! Persistence
//!
//! Snapshot (C3) and append-only file (C2) durability for the store.

mod aof;
mod snapshot;

pub use aof::{AofConfig, AofOp, AofRecord, AofSyncMode, AofWriter};
pub use snapshot::{LoadOutcome, Snapshot, SnapshotConfig, SnapshotEntry, SnapshotFile};
