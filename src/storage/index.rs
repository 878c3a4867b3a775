//! In-memory index (C4)
//!
//! Concurrent map from key to `(value, expires_at)`. Reads are lock-free and
//! may run in parallel with each other; writes go through `DashMap`'s
//! per-shard locking, but the only writer in the system is the store
//! coordinator (C5) — readers never contend with each other.

use dashmap::DashMap;
use std::sync::Arc;

use super::entry::{now_ms, Entry};

/// Lock-free concurrent key/value index with lazy + swept TTL expiry.
#[derive(Debug, Clone)]
pub struct Index {
    inner: Arc<DashMap<String, Entry>>,
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Index {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Read a value, treating an expired entry as absent and removing it
    /// (lazy expiration, required alongside the periodic sweeper).
    pub fn get(&self, key: &str) -> Option<String> {
        let now = now_ms();
        if let Some(entry) = self.inner.get(key) {
            if entry.is_expired_at(now) {
                drop(entry);
                self.inner.remove(key);
                return None;
            }
            return Some(entry.value.clone());
        }
        None
    }

    /// Batch read; unknown or expired keys are simply absent from the
    /// returned map so callers can fill them in as JSON `null`.
    pub fn mget(&self, keys: &[String]) -> std::collections::HashMap<String, Option<String>> {
        keys.iter()
            .map(|k| (k.clone(), self.get(k)))
            .collect()
    }

    /// Unconditionally set an entry, overwriting any previous value. Only
    /// called by the store coordinator (C5), which serializes all writers.
    pub fn put(&self, key: String, entry: Entry) {
        self.inner.insert(key, entry);
    }

    /// Remove a key. Returns whether it was present (informational only —
    /// per spec, delete is idempotent and always reports ok to the caller).
    pub fn delete(&self, key: &str) -> bool {
        self.inner.remove(key).is_some()
    }

    /// Prefix-match key listing. Expired entries encountered while
    /// iterating are removed as a side effect. `limit = 0` yields `[]`.
    pub fn list_keys(&self, prefix: &str, limit: usize) -> Vec<String> {
        if limit == 0 {
            return Vec::new();
        }
        let now = now_ms();
        let mut expired = Vec::new();
        let mut out = Vec::with_capacity(limit.min(1024));

        for item in self.inner.iter() {
            if item.is_expired_at(now) {
                expired.push(item.key().clone());
                continue;
            }
            if item.key().starts_with(prefix) {
                out.push(item.key().clone());
                if out.len() >= limit {
                    break;
                }
            }
        }

        for key in expired {
            self.inner.remove(&key);
        }

        out
    }

    /// Remove all entries whose deadline has passed. Returns the count
    /// removed; used by the periodic TTL sweeper.
    pub fn sweep_expired(&self) -> usize {
        let now = now_ms();
        let mut removed = 0;
        self.inner.retain(|_, entry| {
            if entry.is_expired_at(now) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Drop every entry (used by `replace_snapshot` before reloading).
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Number of entries, including any not-yet-swept expired ones.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Snapshot of all live (non-expired) entries, for C3 snapshot writes.
    pub fn live_entries(&self) -> Vec<(String, Entry)> {
        let now = now_ms();
        self.inner
            .iter()
            .filter(|item| !item.is_expired_at(now))
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_delete_roundtrip() {
        let idx = Index::new();
        idx.put("k".into(), Entry::immortal("v".into()));
        assert_eq!(idx.get("k"), Some("v".into()));
        assert!(idx.delete("k"));
        assert_eq!(idx.get("k"), None);
    }

    #[test]
    fn expired_entry_reads_as_absent_and_is_removed() {
        let idx = Index::new();
        idx.put("k".into(), Entry::new("v".into(), Some(now_ms() - 1)));
        assert_eq!(idx.get("k"), None);
        assert_eq!(idx.len(), 0);
    }

    #[test]
    fn list_keys_respects_prefix_and_limit() {
        let idx = Index::new();
        for k in ["a1", "a2", "b1"] {
            idx.put(k.into(), Entry::immortal("v".into()));
        }
        let mut keys = idx.list_keys("a", 10);
        keys.sort();
        assert_eq!(keys, vec!["a1".to_string(), "a2".to_string()]);
        assert_eq!(idx.list_keys("", 0), Vec::<String>::new());
        assert_eq!(idx.list_keys("", 1).len(), 1);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let idx = Index::new();
        idx.put("live".into(), Entry::immortal("v".into()));
        idx.put("dead".into(), Entry::new("v".into(), Some(now_ms() - 5)));
        assert_eq!(idx.sweep_expired(), 1);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.get("live"), Some("v".into()));
    }

    #[test]
    fn mget_reports_missing_as_none() {
        let idx = Index::new();
        idx.put("k1".into(), Entry::immortal("v1".into()));
        let result = idx.mget(&["k1".to_string(), "missing".to_string()]);
        assert_eq!(result.get("k1"), Some(&Some("v1".to_string())));
        assert_eq!(result.get("missing"), Some(&None));
    }
}
