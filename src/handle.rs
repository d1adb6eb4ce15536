//! Session-scoped resource handles
//!
//! A handle is an object-URL-like locator (`blob:flagcache/<uuid>`) minted
//! for a fetched or decoded asset. Handles live only as long as the
//! registry that minted them and are never persisted.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// URL scheme prefix for minted handles
pub const HANDLE_PREFIX: &str = "blob:flagcache/";

/// A 1x1 transparent GIF shown until a placeholder resolves
pub const FILLER: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

/// In-memory locator for an asset
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    url: String,
    content_type: String,
    bytes: Arc<[u8]>,
}

impl ResourceHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Mints handles and resolves their URLs back to bytes for the host
#[derive(Debug, Default)]
pub struct HandleRegistry {
    live: Mutex<HashMap<String, ResourceHandle>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new handle for the given bytes
    pub fn create(&self, bytes: impl Into<Arc<[u8]>>, content_type: &str) -> ResourceHandle {
        let handle = ResourceHandle {
            url: format!("{}{}", HANDLE_PREFIX, Uuid::new_v4()),
            content_type: content_type.to_string(),
            bytes: bytes.into(),
        };
        self.live.lock().insert(handle.url.clone(), handle.clone());
        handle
    }

    /// Look up a live handle by URL
    pub fn lookup(&self, url: &str) -> Option<ResourceHandle> {
        self.live.lock().get(url).cloned()
    }

    /// Invalidate every handle minted by this registry
    pub fn revoke_all(&self) {
        self.live.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
