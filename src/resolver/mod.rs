//! Resource resolution with session and persistent caching
//!
//! `resolve` answers the parser synchronously from the in-memory handle
//! map, then the persistent store, and otherwise hands back the inert
//! filler. After each parse, `settle` walks the new placeholders and starts
//! at most one fetch per key; the fetch pipeline later back-propagates the
//! resolved handle into every matching placeholder.
//!
//! # Key states
//!
//! | State | Handle map | Pending | Placeholder |
//! |-------|------------|---------|-------------|
//! | Unresolved | no | no | filler, fetch starts on next settle |
//! | In flight | no | yes | filler, updated on completion |
//! | Resolved | yes | no | handle URL, resolved class |

mod pipeline;

use crate::codec;
use crate::config::schema::{FetchConfig, MarkupConfig};
use crate::dom::{Document, NodeId, SharedDocument};
use crate::fetch::AssetFetcher;
use crate::handle::{HandleRegistry, ResourceHandle, FILLER};
use crate::key::ResourceKey;
use crate::parser::GlyphResolver;
use crate::store::AssetStore;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Session cache shared by `resolve`, `settle` and fetch tasks
#[derive(Clone)]
pub struct AssetResolver {
    shared: Arc<ResolverShared>,
}

struct ResolverShared {
    cache: Mutex<SessionCache>,
    store: AssetStore,
    registry: HandleRegistry,
    fetcher: Arc<dyn AssetFetcher>,
    document: SharedDocument,
    fetch: FetchConfig,
    markup: MarkupConfig,
    idle: Notify,
}

#[derive(Default)]
struct SessionCache {
    handles: HashMap<ResourceKey, ResourceHandle>,
    pending: HashSet<ResourceKey>,
}

impl AssetResolver {
    pub fn new(
        store: AssetStore,
        fetcher: Arc<dyn AssetFetcher>,
        document: SharedDocument,
        fetch: FetchConfig,
        markup: MarkupConfig,
    ) -> Self {
        Self {
            shared: Arc::new(ResolverShared {
                cache: Mutex::new(SessionCache::default()),
                store,
                registry: HandleRegistry::new(),
                fetcher,
                document,
                fetch,
                markup,
                idle: Notify::new(),
            }),
        }
    }

    /// Rewrite or fetch for freshly parsed placeholders
    ///
    /// Keys already resolved are applied immediately, keys in flight are
    /// left for the running fetch, anything else starts a fetch.
    pub fn settle(&self, doc: &mut dyn Document, placeholders: &[NodeId]) {
        let resolved_class = self.shared.markup.resolved_class();

        for &element in placeholders {
            let Some(original_text) = doc.attribute(element, "alt").map(str::to_string) else {
                continue;
            };
            let key = ResourceKey::from_glyph(&original_text);
            if !key.is_flag() {
                continue;
            }
            debug!("Processing flag: {}", original_text);

            let resolved_url = {
                let mut guard = self.shared.cache.lock();
                let cache = &mut *guard;
                match cache.handles.get(&key) {
                    Some(handle) => Some(handle.url().to_string()),
                    None if cache.pending.contains(&key) => continue,
                    None => {
                        cache.pending.insert(key.clone());
                        None
                    }
                }
            };

            match resolved_url {
                Some(url) => {
                    doc.set_attribute(element, "src", &url);
                    doc.set_attribute(element, "class", &resolved_class);
                }
                None => self.spawn_fetch(key, original_text),
            }
        }
    }

    /// Wait until no fetch is in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            let idle = self.shared.cache.lock().pending.is_empty();
            if idle {
                return;
            }
            notified.await;
        }
    }

    /// Session handle for a key, if resolved
    pub fn handle(&self, key: &ResourceKey) -> Option<ResourceHandle> {
        self.shared.cache.lock().handles.get(key).cloned()
    }

    pub fn is_pending(&self, key: &ResourceKey) -> bool {
        self.shared.cache.lock().pending.contains(key)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.cache.lock().pending.len()
    }

    /// Registry resolving handle URLs back to bytes
    pub fn registry(&self) -> &HandleRegistry {
        &self.shared.registry
    }

    pub fn store(&self) -> &AssetStore {
        &self.shared.store
    }

    /// Launch the fetch pipeline; the key must already be marked pending
    fn spawn_fetch(&self, key: ResourceKey, original_text: String) {
        let guard = PendingGuard {
            shared: Arc::clone(&self.shared),
            key: key.clone(),
        };

        tokio::spawn(async move {
            guard.shared.fetch(&key, &original_text).await;
            drop(guard);
        });
    }

    /// Decode a persisted entry into a session handle
    fn restore_from_store(&self, key: &ResourceKey) -> Option<String> {
        let entry = self.shared.store.get(key)?;

        let asset = match codec::decode_data_url(&entry.data) {
            Ok(asset) => asset,
            Err(e) => {
                warn!("Cached asset for {} is unusable, fetching again: {}", key, e);
                return None;
            }
        };

        let url = self.shared.cache_handle(key, asset.bytes, &asset.content_type);
        debug!("Restored {} from persistent cache", key);
        Some(url)
    }
}

impl ResolverShared {
    /// Handle URL for `key`, minting one only if none is cached yet
    fn cache_handle(&self, key: &ResourceKey, bytes: Vec<u8>, content_type: &str) -> String {
        let mut guard = self.cache.lock();
        let cache = &mut *guard;
        if let Some(existing) = cache.handles.get(key) {
            return existing.url().to_string();
        }

        let handle = self.registry.create(bytes, content_type);
        let url = handle.url().to_string();
        cache.handles.insert(key.clone(), handle);
        url
    }
}

impl GlyphResolver for AssetResolver {
    fn resolve(&self, key: &ResourceKey) -> Option<String> {
        if !key.is_flag() {
            return None;
        }

        let hit = self
            .shared
            .cache
            .lock()
            .handles
            .get(key)
            .map(|handle| handle.url().to_string());
        if let Some(url) = hit {
            return Some(url);
        }

        if let Some(url) = self.restore_from_store(key) {
            return Some(url);
        }

        Some(FILLER.to_string())
    }
}

/// Clears a key's pending marker when its fetch task ends, however it ends
struct PendingGuard {
    shared: Arc<ResolverShared>,
    key: ResourceKey,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let idle = {
            let mut cache = self.shared.cache.lock();
            cache.pending.remove(&self.key);
            cache.pending.is_empty()
        };
        if idle {
            self.shared.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Dom, NodeId};
    use crate::error::{FlagError, FlagResult};
    use crate::fetch::FetchResponse;
    use crate::parser::{EmojiParser, GlyphParser, ParseOptions};
    use crate::store::{MemoryStore, StoreOptions};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Semaphore;

    const RECORD: &str = "flag_asset_cache";
    const SVG: &[u8] = b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>";
    const AU: &str = "1f1e6-1f1fa";

    /// Records requests; can hold them open and fail them on demand
    struct FakeFetcher {
        calls: Mutex<Vec<String>>,
        fail: AtomicBool,
        status: u16,
        gate: Option<Semaphore>,
    }

    impl FakeFetcher {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
                status: 200,
                gate: None,
            }
        }

        fn gated() -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Self::new()
            }
        }

        fn with_status(status: u16) -> Self {
            Self {
                status,
                ..Self::new()
            }
        }

        fn open_gate(&self) {
            if let Some(gate) = &self.gate {
                gate.add_permits(1_000);
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl AssetFetcher for FakeFetcher {
        async fn request(&self, url: &str) -> FlagResult<FetchResponse> {
            self.calls.lock().push(url.to_string());

            if let Some(gate) = &self.gate {
                gate.acquire()
                    .await
                    .map_err(|e| FlagError::Internal(e.to_string()))?
                    .forget();
            }

            if self.fail.load(Ordering::SeqCst) {
                return Err(FlagError::transport(url, "connection reset"));
            }
            Ok(FetchResponse {
                status: self.status,
                content_type: Some("image/svg+xml".to_string()),
                body: SVG.to_vec(),
            })
        }
    }

    struct Harness {
        dom: Arc<Mutex<Dom>>,
        resolver: AssetResolver,
        fetcher: Arc<FakeFetcher>,
        backend: Arc<MemoryStore>,
    }

    impl Harness {
        async fn new(fetcher: FakeFetcher, backend: MemoryStore) -> Self {
            let backend = Arc::new(backend);
            let fetcher = Arc::new(fetcher);
            let store = AssetStore::load(
                backend.clone(),
                StoreOptions {
                    record_key: RECORD.to_string(),
                    ttl: Duration::days(14),
                },
            )
            .await;

            let dom = Dom::new().into_shared();
            let document: SharedDocument = dom.clone();
            let resolver = AssetResolver::new(
                store,
                fetcher.clone(),
                document,
                FetchConfig {
                    base_url: "https://cdn.test/svg/".to_string(),
                    extension: ".svg".to_string(),
                },
                MarkupConfig::default(),
            );

            Self {
                dom,
                resolver,
                fetcher,
                backend,
            }
        }

        fn add_paragraph(&self, text: &str) -> NodeId {
            let mut dom = self.dom.lock();
            let p = dom.create_element("p");
            let t = dom.create_text(text);
            dom.append_child(p, t);
            let root = dom.root();
            dom.append_child(root, p);
            p
        }

        /// Parse a subtree and settle its placeholders
        fn scan(&self, node: NodeId) {
            let options = ParseOptions {
                class_name: "fc-flag".to_string(),
            };
            let mut doc = self.dom.lock();
            EmojiParser.parse(&mut *doc, node, &options, &self.resolver);
            let placeholders = doc.elements_with_class(node, "fc-flag");
            self.resolver.settle(&mut *doc, &placeholders);
        }

        /// `(src, class)` of every generated image below `node`
        fn images(&self, node: NodeId) -> Vec<(String, String)> {
            let dom = self.dom.lock();
            dom.descendants(node)
                .into_iter()
                .filter(|id| dom.tag_name(*id) == Some("img"))
                .map(|id| {
                    (
                        dom.attribute(id, "src").unwrap_or_default().to_string(),
                        dom.attribute(id, "class").unwrap_or_default().to_string(),
                    )
                })
                .collect()
        }
    }

    fn stored_entry(days_old: i64, data: &str) -> serde_json::Value {
        json!({
            AU: {
                "data": data,
                "timestamp": (Utc::now() - Duration::days(days_old)).timestamp_millis(),
            }
        })
    }

    #[tokio::test]
    async fn non_flag_keys_are_not_substituted() {
        let h = Harness::new(FakeFetcher::new(), MemoryStore::new()).await;

        assert_eq!(h.resolver.resolve(&ResourceKey::from_glyph("😀")), None);
        assert_eq!(h.resolver.resolve(&ResourceKey::new("1f1e6")), None);
    }

    #[tokio::test]
    async fn miss_returns_filler_without_fetching() {
        let h = Harness::new(FakeFetcher::new(), MemoryStore::new()).await;

        let src = h.resolver.resolve(&ResourceKey::new(AU));
        assert_eq!(src.as_deref(), Some(FILLER));

        h.resolver.wait_idle().await;
        assert_eq!(h.fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn same_key_in_one_batch_fetches_once_and_updates_all() {
        let h = Harness::new(FakeFetcher::new(), MemoryStore::new()).await;
        let first = h.add_paragraph("🇦🇺 and 🇦🇺");
        let second = h.add_paragraph("again 🇦🇺");

        h.scan(first);
        h.scan(second);
        assert!(h.resolver.is_pending(&ResourceKey::new(AU)));

        h.resolver.wait_idle().await;

        assert_eq!(h.fetcher.call_count(), 1);
        assert_eq!(
            h.fetcher.calls.lock()[0],
            "https://cdn.test/svg/1f1e6-1f1fa.svg"
        );

        let handle = h.resolver.handle(&ResourceKey::new(AU)).unwrap();
        let images: Vec<_> = h
            .images(first)
            .into_iter()
            .chain(h.images(second))
            .collect();
        assert_eq!(images.len(), 3);
        for (src, class) in images {
            assert_eq!(src, handle.url());
            assert_eq!(class, "P-fc-flag");
        }
    }

    #[tokio::test]
    async fn in_flight_key_is_not_fetched_again() {
        let h = Harness::new(FakeFetcher::gated(), MemoryStore::new()).await;
        let first = h.add_paragraph("🇦🇺");
        h.scan(first);
        tokio::task::yield_now().await;

        let second = h.add_paragraph("🇦🇺");
        h.scan(second);
        tokio::task::yield_now().await;

        assert_eq!(h.fetcher.call_count(), 1);
        assert_eq!(h.images(second)[0].0, FILLER);

        h.fetcher.open_gate();
        h.resolver.wait_idle().await;

        assert_eq!(h.fetcher.call_count(), 1);
        assert_eq!(h.images(first)[0].1, "P-fc-flag");
        assert_eq!(h.images(second)[0].1, "P-fc-flag");
    }

    #[tokio::test]
    async fn resolved_key_applies_immediately_to_new_placeholders() {
        let h = Harness::new(FakeFetcher::new(), MemoryStore::new()).await;
        h.scan(h.add_paragraph("🇦🇺"));
        h.resolver.wait_idle().await;

        let later = h.add_paragraph("🇦🇺 late");
        h.scan(later);

        let handle = h.resolver.handle(&ResourceKey::new(AU)).unwrap();
        assert_eq!(
            h.images(later),
            vec![(handle.url().to_string(), "P-fc-flag".to_string())]
        );
        assert_eq!(h.resolver.pending_count(), 0);
        assert_eq!(h.fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn persisted_entry_is_decoded_without_fetching() {
        let data = codec::encode_data_url(SVG, "image/svg+xml");
        let backend = MemoryStore::new().with_record(RECORD, stored_entry(2, &data));
        let h = Harness::new(FakeFetcher::new(), backend).await;

        let p = h.add_paragraph("🇦🇺");
        h.scan(p);
        h.resolver.wait_idle().await;

        assert_eq!(h.fetcher.call_count(), 0);
        let handle = h.resolver.handle(&ResourceKey::new(AU)).unwrap();
        assert_eq!(handle.bytes(), SVG);
        assert_eq!(
            h.images(p),
            vec![(handle.url().to_string(), "P-fc-flag".to_string())]
        );
        assert!(h.resolver.registry().lookup(handle.url()).is_some());
    }

    #[tokio::test]
    async fn restoring_twice_mints_one_handle() {
        let data = codec::encode_data_url(SVG, "image/svg+xml");
        let backend = MemoryStore::new().with_record(RECORD, stored_entry(2, &data));
        let h = Harness::new(FakeFetcher::new(), backend).await;
        let key = ResourceKey::new(AU);

        let first = h.resolver.restore_from_store(&key).unwrap();
        let second = h.resolver.restore_from_store(&key).unwrap();

        assert_eq!(first, second);
        assert_eq!(h.resolver.registry().len(), 1);
    }

    #[tokio::test]
    async fn expired_entry_triggers_fresh_fetch() {
        let data = codec::encode_data_url(SVG, "image/svg+xml");
        let backend = MemoryStore::new().with_record(RECORD, stored_entry(20, &data));
        let h = Harness::new(FakeFetcher::new(), backend).await;

        assert_eq!(
            h.resolver.resolve(&ResourceKey::new(AU)).as_deref(),
            Some(FILLER)
        );

        h.scan(h.add_paragraph("🇦🇺"));
        h.resolver.wait_idle().await;
        assert_eq!(h.fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn undecodable_entry_is_treated_as_miss() {
        let backend = MemoryStore::new().with_record(RECORD, stored_entry(1, "garbage"));
        let h = Harness::new(FakeFetcher::new(), backend).await;

        let p = h.add_paragraph("🇦🇺");
        h.scan(p);
        h.resolver.wait_idle().await;

        assert_eq!(h.fetcher.call_count(), 1);
        assert_eq!(h.images(p)[0].1, "P-fc-flag");
    }

    #[tokio::test]
    async fn failed_fetch_leaves_filler_and_allows_retry() {
        let h = Harness::new(FakeFetcher::new(), MemoryStore::new()).await;
        h.fetcher.fail.store(true, Ordering::SeqCst);

        let stale = h.add_paragraph("🇦🇺");
        h.scan(stale);
        h.resolver.wait_idle().await;

        assert_eq!(h.fetcher.call_count(), 1);
        assert!(!h.resolver.is_pending(&ResourceKey::new(AU)));
        assert!(h.resolver.handle(&ResourceKey::new(AU)).is_none());
        assert_eq!(
            h.images(stale),
            vec![(FILLER.to_string(), "fc-flag".to_string())]
        );

        h.fetcher.fail.store(false, Ordering::SeqCst);
        let fresh = h.add_paragraph("🇦🇺 again");
        h.scan(fresh);
        h.resolver.wait_idle().await;

        assert_eq!(h.fetcher.call_count(), 2);
        // back-propagation is keyed by original text, so the stale one heals too
        assert_eq!(h.images(stale)[0].1, "P-fc-flag");
        assert_eq!(h.images(fresh)[0].1, "P-fc-flag");
    }

    #[tokio::test]
    async fn non_success_status_is_a_failure() {
        let h = Harness::new(FakeFetcher::with_status(404), MemoryStore::new()).await;

        let p = h.add_paragraph("🇦🇺");
        h.scan(p);
        h.resolver.wait_idle().await;

        assert!(h.resolver.handle(&ResourceKey::new(AU)).is_none());
        assert_eq!(h.images(p)[0].0, FILLER);
        assert!(h.resolver.store().is_empty());
    }

    #[tokio::test]
    async fn successful_fetch_is_persisted_byte_for_byte() {
        let h = Harness::new(FakeFetcher::new(), MemoryStore::new()).await;

        h.scan(h.add_paragraph("🇦🇺"));
        h.resolver.wait_idle().await;
        h.resolver.store().flush().await;

        let record = h.backend.record(RECORD).unwrap();
        let data = record[AU]["data"].as_str().unwrap();
        let decoded = codec::decode_data_url(data).unwrap();
        assert_eq!(decoded.bytes, SVG);
        assert_eq!(decoded.content_type, "image/svg+xml");
    }

    #[tokio::test]
    async fn detached_placeholders_are_not_updated() {
        let h = Harness::new(FakeFetcher::gated(), MemoryStore::new()).await;
        let p = h.add_paragraph("🇦🇺");
        h.scan(p);
        h.dom.lock().remove(p);

        h.fetcher.open_gate();
        h.resolver.wait_idle().await;

        assert_eq!(h.images(p)[0].1, "fc-flag");
    }
}
