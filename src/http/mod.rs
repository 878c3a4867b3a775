//! HTTP/JSON transport (spec §6.1).

pub mod error;
pub mod kv;
pub mod replication_routes;
pub mod server;
pub mod state;
pub mod stats;

pub use server::Server;
pub use state::AppState;
