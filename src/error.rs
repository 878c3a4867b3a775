//! Crate-wide error taxonomy.
//!
//! Every error kind the store API can surface is represented here so the
//! HTTP layer can map it to a status code and a `{"error": "..."}` body
//! without re-deriving the mapping at each call site.

use thiserror::Error;

/// Errors surfaced by the storage engine, replication, and middleware.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,

    #[error("store not running")]
    NotRunning,

    #[error("invalid key")]
    InvalidKey,

    #[error("invalid payload")]
    InvalidPayload,

    #[error("invalid keys")]
    InvalidKeys,

    #[error("invalid prefix")]
    InvalidPrefix,

    #[error("invalid snapshot")]
    InvalidSnapshot,

    #[error("invalid checksum")]
    InvalidChecksum,

    #[error("invalid replication record")]
    InvalidReplicationRecord,

    #[error("invalid offset")]
    InvalidOffset,

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("read-only follower")]
    ReadOnly,

    #[error("no follower configured")]
    NoFollower,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Short machine-readable kind, mirrored in logs and error bodies.
    pub fn kind_str(&self) -> &'static str {
        match self {
            StoreError::NotFound => "not_found",
            StoreError::NotRunning => "not_running",
            StoreError::InvalidKey => "invalid_key",
            StoreError::InvalidPayload => "invalid_payload",
            StoreError::InvalidKeys => "invalid_keys",
            StoreError::InvalidPrefix => "invalid_prefix",
            StoreError::InvalidSnapshot => "invalid_snapshot",
            StoreError::InvalidChecksum => "invalid_checksum",
            StoreError::InvalidReplicationRecord => "invalid_replication_record",
            StoreError::InvalidOffset => "invalid_offset",
            StoreError::Unauthorized => "unauthorized",
            StoreError::RateLimited => "rate_limited",
            StoreError::ReadOnly => "read_only",
            StoreError::NoFollower => "no_follower",
            StoreError::Io(_) => "io_error",
            StoreError::Json(_) => "json_error",
        }
    }

    /// HTTP status code per spec §6.1 / §7.
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::NotFound | StoreError::NoFollower => 404,
            StoreError::InvalidKey
            | StoreError::InvalidPayload
            | StoreError::InvalidKeys
            | StoreError::InvalidPrefix
            | StoreError::InvalidOffset => 400,
            StoreError::Unauthorized => 401,
            StoreError::ReadOnly => 403,
            StoreError::RateLimited => 429,
            StoreError::NotRunning => 503,
            StoreError::InvalidSnapshot
            | StoreError::InvalidChecksum
            | StoreError::InvalidReplicationRecord => 400,
            StoreError::Io(_) | StoreError::Json(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
