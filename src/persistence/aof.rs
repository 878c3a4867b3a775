//! Append-only file writer/replayer (C2)
//!
//! Each mutation is appended as one canonical-JSON line. A configurable
//! sync mode trades durability for throughput. Replay is tolerant: a
//! corrupt or checksum-mismatched line is logged and skipped, never fatal.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

use crate::codec;
use crate::error::Result;

/// fsync policy for AOF appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AofSyncMode {
    /// fsync after every write.
    Always,
    /// fsync on a timer (driven externally, default every 1000ms).
    Interval,
    /// Leave fsync to the OS.
    None,
}

impl Default for AofSyncMode {
    fn default() -> Self {
        AofSyncMode::Interval
    }
}

/// One durable mutation (spec §3.1 AOF record).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AofRecord {
    pub op: AofOp,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub v: u32,
    pub checksum: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AofOp {
    Set,
    Del,
}

const SCHEMA_VERSION: u32 = 1;

impl AofRecord {
    fn unchecksummed_value(op: AofOp, key: &str, value: Option<&str>, expires_at: Option<i64>) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert(
            "op".into(),
            Value::String(match op {
                AofOp::Set => "set".into(),
                AofOp::Del => "del".into(),
            }),
        );
        obj.insert("key".into(), Value::String(key.to_string()));
        if let Some(v) = value {
            obj.insert("value".into(), Value::String(v.to_string()));
        }
        if let Some(e) = expires_at {
            obj.insert("expires_at".into(), json!(e));
        }
        obj.insert("v".into(), json!(SCHEMA_VERSION));
        Value::Object(obj)
    }

    pub fn set(key: String, value: String, expires_at: Option<i64>) -> Self {
        let base = Self::unchecksummed_value(AofOp::Set, &key, Some(&value), expires_at);
        let checksum = codec::checksum(&base);
        Self {
            op: AofOp::Set,
            key,
            value: Some(value),
            expires_at,
            v: SCHEMA_VERSION,
            checksum,
        }
    }

    pub fn del(key: String) -> Self {
        let base = Self::unchecksummed_value(AofOp::Del, &key, None, None);
        let checksum = codec::checksum(&base);
        Self {
            op: AofOp::Del,
            key,
            value: None,
            expires_at: None,
            v: SCHEMA_VERSION,
            checksum,
        }
    }

    /// Recompute the checksum over every field but `checksum` and compare.
    pub fn checksum_valid(&self) -> bool {
        let base = Self::unchecksummed_value(self.op, &self.key, self.value.as_deref(), self.expires_at);
        codec::checksum_matches(&base, &self.checksum)
    }

    fn to_line(&self) -> String {
        serde_json::to_string(self).expect("AofRecord always serializes")
    }
}

#[derive(Debug, Clone)]
pub struct AofConfig {
    pub path: PathBuf,
    pub sync_mode: AofSyncMode,
}

impl AofConfig {
    pub fn new(path: PathBuf, sync_mode: AofSyncMode) -> Self {
        Self { path, sync_mode }
    }
}

/// Append-only log writer, shared across the coordinator and any timer
/// tasks that need to flush it.
pub struct AofWriter {
    config: AofConfig,
    file: Mutex<BufWriter<File>>,
}

impl AofWriter {
    /// Open (or create) the AOF file in append mode.
    pub fn open(config: AofConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;

        Ok(Self {
            config,
            file: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Append one record as a canonical-JSON line. A write failure is
    /// returned to the caller (the coordinator logs it and carries on with
    /// the in-memory change already applied).
    pub fn append(&self, record: &AofRecord) -> Result<()> {
        let mut line = record.to_line();
        line.push('\n');

        let mut file = self.file.lock().expect("aof writer mutex poisoned");
        file.write_all(line.as_bytes())?;
        file.flush()?;

        if self.config.sync_mode == AofSyncMode::Always {
            file.get_ref().sync_all()?;
        }

        Ok(())
    }

    /// Flush buffered writes and fsync. Called by the interval-sync timer
    /// when `sync_mode == Interval`.
    pub fn sync(&self) -> Result<()> {
        let mut file = self.file.lock().expect("aof writer mutex poisoned");
        file.flush()?;
        file.get_ref().sync_all()?;
        Ok(())
    }

    /// Current length of the AOF in bytes, as advertised to followers.
    pub fn size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.config.path)?.len())
    }

    /// Read `len` bytes starting at `offset`, for the leader AOF-range
    /// endpoint (C6). Returns fewer bytes than requested at EOF.
    pub fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        use std::io::{Read, Seek, SeekFrom};
        {
            let mut file = self.file.lock().expect("aof writer mutex poisoned");
            file.flush()?;
        }
        let mut handle = File::open(&self.config.path)?;
        handle.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        let n = handle.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Replay the log from disk, returning every record whose checksum
    /// validates, in file order. A missing file replays as empty. Malformed
    /// lines and checksum mismatches are warned and skipped, never fatal.
    pub fn replay(&self) -> Result<Vec<AofRecord>> {
        if !self.config.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.config.path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!(line = lineno, error = %e, "aof read error, stopping replay");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AofRecord>(&line) {
                Ok(record) => {
                    if record.checksum_valid() {
                        records.push(record);
                    } else {
                        warn!(line = lineno, key = %record.key, "aof record checksum mismatch, skipping");
                    }
                }
                Err(e) => {
                    warn!(line = lineno, error = %e, "aof record decode error, skipping");
                }
            }
        }

        Ok(records)
    }

    /// Truncate the AOF to zero length. Only called immediately after a
    /// successful snapshot commit (compaction).
    pub fn truncate(&self) -> Result<()> {
        let mut guard = self.file.lock().expect("aof writer mutex poisoned");
        guard.flush().ok();

        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.config.path)?;
        drop(file);

        let file = OpenOptions::new().append(true).open(&self.config.path)?;
        *guard = BufWriter::new(file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn writer(dir: &std::path::Path) -> AofWriter {
        AofWriter::open(AofConfig::new(dir.join("toska.aof"), AofSyncMode::Always)).unwrap()
    }

    #[test]
    fn append_and_replay_roundtrip() {
        let dir = tempdir().unwrap();
        let aof = writer(dir.path());

        aof.append(&AofRecord::set("a".into(), "1".into(), None)).unwrap();
        aof.append(&AofRecord::del("a".into())).unwrap();

        let records = aof.replay().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].op, AofOp::Set);
        assert_eq!(records[1].op, AofOp::Del);
    }

    #[test]
    fn missing_file_replays_empty() {
        let dir = tempdir().unwrap();
        let aof = AofWriter::open(AofConfig::new(dir.path().join("missing.aof"), AofSyncMode::None)).unwrap();
        fs::remove_file(dir.path().join("missing.aof")).unwrap();
        assert_eq!(aof.replay().unwrap().len(), 0);
    }

    #[test]
    fn corrupt_line_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("toska.aof");
        {
            let aof = AofWriter::open(AofConfig::new(path.clone(), AofSyncMode::Always)).unwrap();
            aof.append(&AofRecord::set("good".into(), "1".into(), None)).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "not json at all").unwrap();
        }
        let aof = AofWriter::open(AofConfig::new(path, AofSyncMode::Always)).unwrap();
        let records = aof.replay().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "good");
    }

    #[test]
    fn tampered_checksum_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("toska.aof");
        let mut record = AofRecord::set("k".into(), "v".into(), None);
        record.checksum = "deadbeef".into();
        {
            let aof = AofWriter::open(AofConfig::new(path.clone(), AofSyncMode::Always)).unwrap();
            aof.append(&record).unwrap();
        }
        let aof = AofWriter::open(AofConfig::new(path, AofSyncMode::Always)).unwrap();
        assert_eq!(aof.replay().unwrap().len(), 0);
    }

    #[test]
    fn truncate_resets_size_to_zero() {
        let dir = tempdir().unwrap();
        let aof = writer(dir.path());
        aof.append(&AofRecord::set("k".into(), "v".into(), None)).unwrap();
        assert!(aof.size().unwrap() > 0);
        aof.truncate().unwrap();
        assert_eq!(aof.size().unwrap(), 0);
    }

    #[test]
    fn aof_byte_offsets_are_strictly_increasing() {
        let dir = tempdir().unwrap();
        let aof = writer(dir.path());
        let before = aof.size().unwrap();
        aof.append(&AofRecord::set("a".into(), "1".into(), None)).unwrap();
        let mid = aof.size().unwrap();
        aof.append(&AofRecord::set("b".into(), "2".into(), None)).unwrap();
        let after = aof.size().unwrap();
        assert!(before < mid);
        assert!(mid < after);
    }
}
