//! Fetch pipeline: download, persist, cache, back-propagate

use super::ResolverShared;
use crate::codec::{self, DEFAULT_CONTENT_TYPE};
use crate::error::FlagError;
use crate::key::ResourceKey;
use tracing::{debug, info, warn};

impl ResolverShared {
    /// Resolve a key from the network
    ///
    /// Failures are logged and end the attempt; the key stays unresolved
    /// until a later settle sees it again.
    pub(super) async fn fetch(&self, key: &ResourceKey, original_text: &str) {
        let url = self.fetch.asset_url(key.as_str());
        info!("Downloading asset for {}", key);

        let response = match self.fetcher.request(&url).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to load asset for {}: {}", key, e);
                return;
            }
        };

        if !response.is_success() {
            let err = FlagError::HttpStatus {
                url,
                status: response.status,
            };
            warn!("Failed to load asset for {}: {}", key, err);
            return;
        }

        let content_type = response
            .media_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        self.store.put(
            key.clone(),
            codec::encode_data_url(&response.body, &content_type),
        );

        let handle_url = self.cache_handle(key, response.body, &content_type);

        let updated = self.propagate(original_text, &handle_url);
        debug!("Resolved {} in {} placeholder(s)", key, updated);
    }

    /// Point every placeholder showing `original_text` at the handle
    fn propagate(&self, original_text: &str, handle_url: &str) -> usize {
        let resolved_class = self.markup.resolved_class();
        let mut doc = self.document.lock();

        let targets = doc.placeholders_with_text(&self.markup.marker_class, original_text);
        for element in &targets {
            doc.set_attribute(*element, "src", handle_url);
            doc.set_attribute(*element, "class", &resolved_class);
        }
        targets.len()
    }
}
