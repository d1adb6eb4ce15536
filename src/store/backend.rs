//! Key-value persistence primitives
//!
//! The asset store only needs whole-record reads and writes. `FileStore`
//! keeps each record as a JSON file; `MemoryStore` backs tests and
//! ephemeral sessions.

use crate::error::{FlagError, FlagResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tracing::debug;

/// Host persistence interface
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a record, `None` when it has never been written
    async fn get_value(&self, key: &str) -> FlagResult<Option<Value>>;

    /// Replace a record
    async fn set_value(&self, key: &str, value: Value) -> FlagResult<()>;
}

/// Records stored as `<dir>/<key>.json`
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_value(&self, key: &str) -> FlagResult<Option<Value>> {
        let path = self.record_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| FlagError::io(format!("reading store record {}", path.display()), e))?;

        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn set_value(&self, key: &str, value: Value) -> FlagResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| FlagError::io("creating store directory", e))?;

        let path = self.record_path(key);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string(&value)?;

        // Write-then-rename so an interrupted write leaves the old record intact
        fs::write(&tmp, content)
            .await
            .map_err(|e| FlagError::io(format!("writing store record {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| FlagError::io(format!("replacing store record {}", path.display()), e))?;

        debug!("Wrote store record {}", path.display());
        Ok(())
    }
}

/// In-memory records
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Value>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly
    pub fn with_record(self, key: &str, value: Value) -> Self {
        self.records.lock().insert(key.to_string(), value);
        self
    }

    /// Current record contents
    pub fn record(&self, key: &str) -> Option<Value> {
        self.records.lock().get(key).cloned()
    }

    /// Make subsequent reads fail with an IO error
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_value(&self, key: &str) -> FlagResult<Option<Value>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(FlagError::io(
                format!("reading record {}", key),
                std::io::Error::other("read rejected"),
            ));
        }
        Ok(self.record(key))
    }

    async fn set_value(&self, key: &str, value: Value) -> FlagResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FlagError::StorePersist(format!(
                "write to {} rejected",
                key
            )));
        }
        self.records.lock().insert(key.to_string(), value);
        Ok(())
    }
}
