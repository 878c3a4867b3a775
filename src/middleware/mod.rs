//! Access middleware (C8)
//!
//! Three sequential stages applied to KV paths and `/stats` only: bearer
//! auth, token-bucket rate limiting, then the read-only follower gate.
//! Health, replication, and root paths bypass all three.

pub mod auth;
pub mod rate_limit;
pub mod readonly;

pub use auth::require_bearer_token;
pub use rate_limit::{rate_limit, RateLimiter};
pub use readonly::reject_writes_on_follower;
