//! Persistent asset store with TTL pruning
//!
//! All entries live in a single persisted record mapping resource keys to
//! `{ data, timestamp }`. The record is read once at startup; every update
//! is written back asynchronously and never awaited by the caller.
//!
//! # Durability
//!
//! Writes are serialized and each one persists the latest in-memory
//! snapshot. A crash between a cache update and its write-back loses at
//! most the newest entries; existing entries are never corrupted.

pub mod backend;

pub use backend::{FileStore, KeyValueStore, MemoryStore};

use crate::config::schema::CacheConfig;
use crate::error::{FlagError, FlagResult};
use crate::key::ResourceKey;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Persisted asset entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Asset encoded as a base64 data URL
    pub data: String,

    /// Creation time in epoch milliseconds
    pub timestamp: i64,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(data: String) -> Self {
        Self {
            data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Check if the entry has outlived the TTL
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.timestamp < (Utc::now() - ttl).timestamp_millis()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Where and how long entries are kept
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Name of the persisted record
    pub record_key: String,

    /// Entries older than this are pruned
    pub ttl: Duration,
}

impl From<&CacheConfig> for StoreOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            record_key: config.record_key.clone(),
            ttl: config.ttl(),
        }
    }
}

/// Durable mapping from resource key to encoded asset
#[derive(Clone)]
pub struct AssetStore {
    shared: Arc<StoreShared>,
}

struct StoreShared {
    backend: Arc<dyn KeyValueStore>,
    options: StoreOptions,
    entries: Mutex<BTreeMap<ResourceKey, CacheEntry>>,
    write_lock: tokio::sync::Mutex<()>,
    writes_in_flight: AtomicUsize,
    writes_done: Notify,
    /// Cleared when the record could not be read, so valid entries on disk
    /// are never replaced by an empty snapshot
    writable: bool,
}

impl AssetStore {
    /// Read the persisted record, dropping expired entries
    ///
    /// If anything was dropped the pruned record is written back in the
    /// background. A missing or malformed record yields an empty store. A
    /// record that cannot be read at all also yields an empty store, but one
    /// that never writes back for the rest of the session.
    pub async fn load(backend: Arc<dyn KeyValueStore>, options: StoreOptions) -> Self {
        let started = Instant::now();

        let (raw, writable) = match backend.get_value(&options.record_key).await {
            Ok(raw) => (raw, true),
            Err(FlagError::Json(e)) => {
                warn!("Ignoring malformed asset cache record: {}", e);
                (None, true)
            }
            Err(e) => {
                warn!("Failed to read asset cache, not persisting this session: {}", e);
                (None, false)
            }
        };

        let (entries, dropped) = parse_record(raw, options.ttl);

        let store = Self {
            shared: Arc::new(StoreShared {
                backend,
                options,
                entries: Mutex::new(entries),
                write_lock: tokio::sync::Mutex::new(()),
                writes_in_flight: AtomicUsize::new(0),
                writes_done: Notify::new(),
                writable,
            }),
        };

        if dropped > 0 {
            debug!("Pruned {} expired asset(s) from cache", dropped);
            store.schedule_write();
        }

        info!(
            "Persistent cache loaded in {:.2} ms with {} asset(s)",
            started.elapsed().as_secs_f64() * 1000.0,
            store.len()
        );
        store
    }

    /// Get a live entry
    pub fn get(&self, key: &ResourceKey) -> Option<CacheEntry> {
        let ttl = self.shared.options.ttl;
        self.shared
            .entries
            .lock()
            .get(key)
            .filter(|entry| !entry.is_expired(ttl))
            .cloned()
    }

    /// Upsert an entry and schedule a best-effort write-back
    pub fn put(&self, key: ResourceKey, data: String) {
        self.shared.entries.lock().insert(key, CacheEntry::new(data));
        self.schedule_write();
    }

    /// Snapshot of all entries, ordered by key
    pub fn entries(&self) -> Vec<(ResourceKey, CacheEntry)> {
        self.shared
            .entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until every scheduled write has settled
    pub async fn flush(&self) {
        loop {
            let notified = self.shared.writes_done.notified();
            if self.shared.writes_in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Fire-and-forget write of the current snapshot
    ///
    /// Failures are logged; the next write or load retries implicitly.
    fn schedule_write(&self) {
        if !self.shared.writable {
            debug!("Asset cache is read-only, skipping write");
            return;
        }

        let ticket = WriteTicket::issue(Arc::clone(&self.shared));
        tokio::spawn(async move {
            if let Err(e) = ticket.shared.write_snapshot().await {
                warn!("Failed to persist asset cache: {}", e);
            }
        });
    }
}

impl StoreShared {
    async fn write_snapshot(&self) -> FlagResult<()> {
        let _serial = self.write_lock.lock().await;

        let value = {
            let entries = self.entries.lock();
            serde_json::to_value(&*entries)?
        };

        self.backend
            .set_value(&self.options.record_key, value)
            .await
    }
}

/// Counts a scheduled write until its task ends, however it ends
struct WriteTicket {
    shared: Arc<StoreShared>,
}

impl WriteTicket {
    fn issue(shared: Arc<StoreShared>) -> Self {
        shared.writes_in_flight.fetch_add(1, Ordering::SeqCst);
        Self { shared }
    }
}

impl Drop for WriteTicket {
    fn drop(&mut self) {
        if self.shared.writes_in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.writes_done.notify_waiters();
        }
    }
}

/// Parse a persisted record, returning live entries and how many were dropped
fn parse_record(raw: Option<Value>, ttl: Duration) -> (BTreeMap<ResourceKey, CacheEntry>, usize) {
    let mut entries = BTreeMap::new();
    let mut dropped = 0;

    let object = match raw {
        None => return (entries, 0),
        Some(Value::Object(object)) => object,
        Some(other) => {
            warn!("Ignoring malformed asset cache record: {}", other);
            return (entries, 1);
        }
    };

    for (key, value) in object {
        match serde_json::from_value::<CacheEntry>(value) {
            Ok(entry) if !entry.is_expired(ttl) => {
                entries.insert(ResourceKey::new(key), entry);
            }
            Ok(_) => dropped += 1,
            Err(e) => {
                debug!("Dropping unreadable cache entry {}: {}", key, e);
                dropped += 1;
            }
        }
    }

    (entries, dropped)
}
