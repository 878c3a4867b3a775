//! TTL sweeper
//!
//! Background task that periodically removes expired keys from the index,
//! independent of the lazy expiration `Index::get` already performs.

use std::time::Duration;
use tokio::time::interval;
use tracing::debug;

use super::index::Index;

pub struct TtlSweeper {
    index: Index,
    interval: Duration,
}

impl TtlSweeper {
    pub fn new(index: Index, interval_ms: u64) -> Self {
        Self {
            index,
            interval: Duration::from_millis(interval_ms.max(1)),
        }
    }

    async fn run(self) {
        let mut ticker = interval(self.interval);
        loop {
            ticker.tick().await;
            let removed = self.index.sweep_expired();
            if removed > 0 {
                debug!(removed, "ttl sweep removed expired keys");
            }
        }
    }

    /// Spawn the sweeper as a background task. The returned handle is
    /// aborted on store shutdown.
    pub fn spawn(index: Index, interval_ms: u64) -> tokio::task::JoinHandle<()> {
        let sweeper = Self::new(index, interval_ms);
        tokio::spawn(sweeper.run())
    }
}
