//! The unit of storage (spec §3.1 Entry).

use std::time::{SystemTime, UNIX_EPOCH};

/// One key's value plus an optional absolute expiry deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: String,
    /// Absolute wall-clock deadline in milliseconds since the Unix epoch.
    /// Absent means immortal.
    pub expires_at: Option<i64>,
}

impl Entry {
    pub fn new(value: String, expires_at: Option<i64>) -> Self {
        Self { value, expires_at }
    }

    pub fn immortal(value: String) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at.map(|t| now_ms > t).unwrap_or(false)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as i64
}
