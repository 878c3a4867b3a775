//! Replication (C6 leader endpoints + C7 follower)
//!
//! Leader-side reads are thin wrappers over `Store` exposed directly by the
//! HTTP handlers (`crate::http::replication_routes`); this module holds the
//! follower state machine, the only piece with its own lifecycle.

pub mod follower;

pub use follower::{Follower, FollowerStateKind, FollowerStatusSnapshot};
