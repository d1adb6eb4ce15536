//! Session wiring
//!
//! A [`FlagSession`] owns every piece of per-document state: the loaded
//! asset store, the resolver's handle and pending maps, and the batcher's
//! pending subtrees. Build one per document with [`FlagSession::start`] and
//! feed it mutation batches through [`FlagSession::notify`].

use crate::batcher::{MutationBatcher, SubtreeScanner};
use crate::config::schema::{Config, MarkupConfig};
use crate::dom::{MutationRecord, NodeId, NodeKind, SharedDocument};
use crate::fetch::AssetFetcher;
use crate::parser::{EmojiParser, GlyphParser, ParseOptions};
use crate::resolver::AssetResolver;
use crate::store::{AssetStore, KeyValueStore, StoreOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// CSS sizing generated placeholders to the surrounding text
pub fn placeholder_style(markup: &MarkupConfig) -> String {
    format!(
        "img.{marker}, img.{resolved} {{\n    height: 1em !important;\n    width: 1em !important;\n    vertical-align: -0.1em !important;\n    margin: 0 .05em 0 .1em !important;\n}}\n",
        marker = markup.marker_class,
        resolved = markup.resolved_class(),
    )
}

/// Parses a subtree and settles the placeholders it produced
struct Rescanner {
    document: SharedDocument,
    parser: Arc<dyn GlyphParser>,
    resolver: AssetResolver,
    options: ParseOptions,
    parsed: AtomicUsize,
}

impl SubtreeScanner for Rescanner {
    fn rescan(&self, node: NodeId) {
        let mut doc = self.document.lock();

        if !doc.is_attached(node) {
            trace!("Skipping detached node {:?}", node);
            return;
        }

        let scope = match doc.kind(node) {
            Some(NodeKind::Element) => node,
            _ => match doc.parent(node) {
                Some(parent) => parent,
                None => {
                    warn!("No parent on node {:?}", node);
                    return;
                }
            },
        };

        let replaced = self
            .parser
            .parse(&mut *doc, node, &self.options, &self.resolver);
        let parsed = self.parsed.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("parsed: {} ({} glyph(s) replaced)", parsed, replaced);

        let placeholders = doc.elements_with_class(scope, &self.options.class_name);
        self.resolver.settle(&mut *doc, &placeholders);
    }
}

/// Live substitution over one document
pub struct FlagSession {
    document: SharedDocument,
    store: AssetStore,
    resolver: AssetResolver,
    batcher: MutationBatcher,
    scanner: Arc<Rescanner>,
}

impl FlagSession {
    /// Load the persistent cache and scan the document once
    pub async fn start(
        config: &Config,
        document: SharedDocument,
        backend: Arc<dyn KeyValueStore>,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> Self {
        Self::start_with_parser(config, document, backend, fetcher, Arc::new(EmojiParser)).await
    }

    /// Like [`FlagSession::start`] with a custom glyph parser
    pub async fn start_with_parser(
        config: &Config,
        document: SharedDocument,
        backend: Arc<dyn KeyValueStore>,
        fetcher: Arc<dyn AssetFetcher>,
        parser: Arc<dyn GlyphParser>,
    ) -> Self {
        let store = AssetStore::load(backend, StoreOptions::from(&config.cache)).await;

        let resolver = AssetResolver::new(
            store.clone(),
            fetcher,
            document.clone(),
            config.fetch.clone(),
            config.markup.clone(),
        );

        let scanner = Arc::new(Rescanner {
            document: document.clone(),
            parser,
            resolver: resolver.clone(),
            options: ParseOptions {
                class_name: config.markup.marker_class.clone(),
            },
            parsed: AtomicUsize::new(0),
        });

        let batcher = MutationBatcher::new(config.batcher.clone(), document.clone(), scanner.clone());

        let root = document.lock().root();
        scanner.rescan(root);

        Self {
            document,
            store,
            resolver,
            batcher,
            scanner,
        }
    }

    /// Deliver a batch of change records
    ///
    /// The document must not be locked by the caller.
    pub fn notify(&self, records: &[MutationRecord]) {
        self.batcher.notify(records);
    }

    /// Rescan a subtree right away, bypassing the batcher
    pub fn rescan(&self, node: NodeId) {
        self.scanner.rescan(node);
    }

    /// Drain pending rescans and wait for fetches and store writes
    pub async fn settle(&self) {
        self.batcher.flush_now();
        self.resolver.wait_idle().await;
        self.store.flush().await;
    }

    /// Settle, then invalidate every session handle
    pub async fn close(self) {
        self.settle().await;
        self.resolver.registry().revoke_all();
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn resolver(&self) -> &AssetResolver {
        &self.resolver
    }

    pub fn batcher(&self) -> &MutationBatcher {
        &self.batcher
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }
}
