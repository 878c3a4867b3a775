//! Snapshot writer/loader (C3)
//!
//! A full point-in-time dump of the live index, written atomically via a
//! temp-file-then-rename so any concurrent reader sees either the old file
//! or the new one, never a partial write.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::warn;

use crate::codec;
use crate::error::Result;
use crate::storage::{now_ms, Entry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// The on-disk snapshot shape (spec §3.1 Snapshot file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub version: u32,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub data: HashMap<String, SnapshotEntry>,
}

const SNAPSHOT_VERSION: u32 = 1;

impl SnapshotFile {
    pub fn from_entries(entries: Vec<(String, Entry)>) -> Self {
        let data: HashMap<String, SnapshotEntry> = entries
            .into_iter()
            .map(|(k, e)| {
                (
                    k,
                    SnapshotEntry {
                        value: e.value,
                        expires_at: e.expires_at,
                    },
                )
            })
            .collect();

        let checksum = Self::compute_checksum(&data);

        Self {
            version: SNAPSHOT_VERSION,
            created_at: now_ms(),
            checksum: Some(checksum),
            data,
        }
    }

    /// Checksum covers `data` only — `version` and `created_at` rotate
    /// between snapshots and must not enter the digest (spec §4.1).
    fn compute_checksum(data: &HashMap<String, SnapshotEntry>) -> String {
        let value = serde_json::to_value(data).expect("snapshot data always serializes");
        codec::checksum(&value)
    }

    pub fn checksum_valid(&self) -> bool {
        match &self.checksum {
            Some(expected) => &Self::compute_checksum(&self.data) == expected,
            None => true, // legacy/partial snapshot without a checksum field
        }
    }

    /// Entries with a deadline already past `now_ms()` are dropped.
    pub fn live_entries(&self, now: i64) -> Vec<(String, Entry)> {
        self.data
            .iter()
            .filter(|(_, e)| !e.expires_at.map(|t| now > t).unwrap_or(false))
            .map(|(k, e)| (k.clone(), Entry::new(e.value.clone(), e.expires_at)))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub path: PathBuf,
}

impl SnapshotConfig {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut p = self.path.clone().into_os_string();
        p.push(".tmp");
        PathBuf::from(p)
    }
}

pub struct Snapshot {
    config: SnapshotConfig,
}

/// Outcome of a snapshot load attempt.
pub enum LoadOutcome {
    /// No snapshot file existed.
    NoData,
    /// Snapshot loaded (and checksum-verified, if present).
    Loaded(Vec<(String, Entry)>),
    /// Snapshot existed but failed checksum verification; the caller
    /// should continue startup and rely on AOF replay instead.
    ChecksumMismatch,
}

impl Snapshot {
    pub fn new(config: SnapshotConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { config })
    }

    /// Write `data` to a temp sibling then rename into place (atomic from
    /// any concurrent reader's perspective).
    pub fn save(&self, file: &SnapshotFile) -> Result<()> {
        let tmp = self.config.tmp_path();
        {
            let handle = File::create(&tmp)?;
            let mut writer = BufWriter::new(handle);
            let pretty = serde_json::to_string_pretty(file)?;
            writer.write_all(pretty.as_bytes())?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.config.path)?;
        Ok(())
    }

    /// Load and validate the snapshot file, per spec §4.3:
    /// - missing file -> `NoData`
    /// - present with checksum -> verify, `ChecksumMismatch` on failure
    /// - present without checksum (legacy/partial) -> load optimistically
    pub fn load(&self) -> Result<LoadOutcome> {
        if !self.config.path.exists() {
            return Ok(LoadOutcome::NoData);
        }

        let handle = File::open(&self.config.path)?;
        let reader = BufReader::new(handle);
        let value: Value = match serde_json::from_reader(reader) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "snapshot decode error, skipping load");
                return Ok(LoadOutcome::ChecksumMismatch);
            }
        };

        let file: SnapshotFile = match serde_json::from_value(value) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "snapshot shape invalid, skipping load");
                return Ok(LoadOutcome::ChecksumMismatch);
            }
        };

        if !file.checksum_valid() {
            warn!("snapshot checksum mismatch, skipping load");
            return Ok(LoadOutcome::ChecksumMismatch);
        }

        Ok(LoadOutcome::Loaded(file.live_entries(now_ms())))
    }

    pub fn size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.config.path)?.len())
    }

    pub fn path(&self) -> &PathBuf {
        &self.config.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let snap = Snapshot::new(SnapshotConfig::new(dir.path().join("snap.json"))).unwrap();

        let entries = vec![
            ("a".to_string(), Entry::immortal("1".to_string())),
            ("b".to_string(), Entry::new("2".to_string(), Some(now_ms() + 60_000))),
        ];
        snap.save(&SnapshotFile::from_entries(entries)).unwrap();

        match snap.load().unwrap() {
            LoadOutcome::Loaded(mut loaded) => {
                loaded.sort_by(|a, b| a.0.cmp(&b.0));
                assert_eq!(loaded.len(), 2);
                assert_eq!(loaded[0].0, "a");
            }
            _ => panic!("expected loaded snapshot"),
        }
    }

    #[test]
    fn missing_file_is_no_data() {
        let dir = tempdir().unwrap();
        let snap = Snapshot::new(SnapshotConfig::new(dir.path().join("missing.json"))).unwrap();
        assert!(matches!(snap.load().unwrap(), LoadOutcome::NoData));
    }

    #[test]
    fn tampered_checksum_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snap.json");
        let snap = Snapshot::new(SnapshotConfig::new(path.clone())).unwrap();

        let mut file = SnapshotFile::from_entries(vec![("ghost".to_string(), Entry::immortal("boo".to_string()))]);
        file.checksum = Some("bad".to_string());
        snap.save(&file).unwrap();

        assert!(matches!(snap.load().unwrap(), LoadOutcome::ChecksumMismatch));
    }

    #[test]
    fn legacy_snapshot_without_checksum_loads_optimistically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snap.json");
        let mut data = HashMap::new();
        data.insert(
            "k".to_string(),
            SnapshotEntry {
                value: "v".to_string(),
                expires_at: None,
            },
        );
        let legacy = SnapshotFile {
            version: 1,
            created_at: now_ms(),
            checksum: None,
            data,
        };
        let text = serde_json::to_string_pretty(&legacy).unwrap();
        fs::write(&path, text).unwrap();

        let snap = Snapshot::new(SnapshotConfig::new(path)).unwrap();
        match snap.load().unwrap() {
            LoadOutcome::Loaded(entries) => assert_eq!(entries.len(), 1),
            _ => panic!("expected optimistic load"),
        }
    }

    #[test]
    fn expired_entries_are_discarded_at_load_time() {
        let dir = tempdir().unwrap();
        let snap = Snapshot::new(SnapshotConfig::new(dir.path().join("snap.json"))).unwrap();
        let entries = vec![("dead".to_string(), Entry::new("v".to_string(), Some(now_ms() - 1000)))];
        snap.save(&SnapshotFile::from_entries(entries)).unwrap();

        match snap.load().unwrap() {
            LoadOutcome::Loaded(loaded) => assert!(loaded.is_empty()),
            _ => panic!("expected loaded snapshot"),
        }
    }

    #[test]
    fn save_is_atomic_via_tmp_rename() {
        let dir = tempdir().unwrap();
        let snap = Snapshot::new(SnapshotConfig::new(dir.path().join("snap.json"))).unwrap();
        snap.save(&SnapshotFile::from_entries(vec![])).unwrap();
        assert!(!dir.path().join("snap.json.tmp").exists());
        assert!(dir.path().join("snap.json").exists());
    }
}
