//! Store coordinator (C5)
//!
//! Single-writer discipline over the index, AOF, and snapshot. See
//! `coordinator` for the task loop and `command` for the message shapes.

mod command;
mod coordinator;

pub use command::{ReplicationInfo, StoreStats, TtlInput};
pub use coordinator::Store;
