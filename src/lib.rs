//! toska - durable single-node key/value store
//!
//! In-memory index with TTL, append-only-file and snapshot persistence,
//! HTTP/JSON access, and leader/follower replication over plain HTTP.

pub mod codec;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod metrics;
pub mod middleware;
pub mod persistence;
pub mod replication;
pub mod storage;
pub mod store;

pub use config::Config;
pub use error::{StoreError, Result};
pub use http::Server;
pub use store::Store;
