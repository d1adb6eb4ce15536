//! Mutation batching
//!
//! Early notification batches (page construction) are rescanned as they
//! arrive. Past the threshold, affected nodes collect in a
//! [`PendingSubtrees`] set and one debounce timer is re-armed per batch;
//! when it fires uninterrupted every pending subtree is rescanned once.

use crate::config::schema::BatcherConfig;
use crate::dom::{Document, MutationKind, MutationRecord, NodeId, NodeKind, SharedDocument};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Rescans a subtree on the batcher's behalf
pub trait SubtreeScanner: Send + Sync {
    fn rescan(&self, node: NodeId);
}

/// Nodes awaiting a debounced rescan
///
/// No element member is an ancestor of another element member. Non-element
/// nodes are kept as-is.
#[derive(Debug, Default)]
pub struct PendingSubtrees {
    nodes: Vec<NodeId>,
}

impl PendingSubtrees {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, collapsing subsumed elements
    ///
    /// Returns false if the node was already covered.
    pub fn insert(&mut self, node: NodeId, doc: &dyn Document) -> bool {
        if self.nodes.contains(&node) {
            return false;
        }

        if !is_element(doc, node) {
            self.nodes.push(node);
            return true;
        }

        if self
            .nodes
            .iter()
            .any(|&existing| is_element(doc, existing) && doc.contains(existing, node))
        {
            return false;
        }

        self.nodes
            .retain(|&existing| !(is_element(doc, existing) && doc.contains(node, existing)));
        self.nodes.push(node);
        true
    }

    /// Take every pending node, leaving the set empty
    pub fn drain(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.nodes)
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn is_element(doc: &dyn Document, node: NodeId) -> bool {
    doc.kind(node) == Some(NodeKind::Element)
}

/// Nodes a notification batch asks to rescan, in first-seen order
pub fn affected_nodes(records: &[MutationRecord]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| match record.kind {
            MutationKind::ChildList => !record.added_nodes.is_empty(),
            MutationKind::CharacterData | MutationKind::Attributes => true,
        })
        .map(|record| record.target)
        .filter(|node| seen.insert(*node))
        .collect()
}

/// Coalesces change notifications into subtree rescans
#[derive(Clone)]
pub struct MutationBatcher {
    shared: Arc<BatcherShared>,
}

struct BatcherShared {
    config: BatcherConfig,
    document: SharedDocument,
    scanner: Arc<dyn SubtreeScanner>,
    state: Mutex<BatcherState>,
}

#[derive(Default)]
struct BatcherState {
    batches_seen: usize,
    pending: PendingSubtrees,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

impl MutationBatcher {
    pub fn new(
        config: BatcherConfig,
        document: SharedDocument,
        scanner: Arc<dyn SubtreeScanner>,
    ) -> Self {
        Self {
            shared: Arc::new(BatcherShared {
                config,
                document,
                scanner,
                state: Mutex::new(BatcherState::default()),
            }),
        }
    }

    /// Handle one batch of change records
    ///
    /// Must be called without the document locked.
    pub fn notify(&self, records: &[MutationRecord]) {
        let nodes = affected_nodes(records);
        let mut state = self.shared.state.lock();
        state.batches_seen += 1;

        if state.batches_seen <= self.shared.config.debounce_threshold {
            drop(state);
            for node in nodes {
                self.shared.scanner.rescan(node);
            }
            return;
        }

        {
            let doc = self.shared.document.lock();
            for node in nodes {
                state.pending.insert(node, &*doc);
            }
        }

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;

        let generation = state.generation;
        let shared = Arc::clone(&self.shared);
        let delay = self.shared.config.debounce_delay();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.flush(Some(generation));
        }));
    }

    /// Rescan everything pending now, cancelling the timer
    pub fn flush_now(&self) {
        self.shared.flush(None);
    }

    pub fn batches_seen(&self) -> usize {
        self.shared.state.lock().batches_seen
    }

    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Snapshot of the pending set
    pub fn pending_nodes(&self) -> Vec<NodeId> {
        self.shared.state.lock().pending.nodes().to_vec()
    }
}

impl BatcherShared {
    /// Drain and rescan; a timer only flushes if nothing re-armed it since
    fn flush(&self, generation: Option<u64>) {
        let nodes = {
            let mut state = self.state.lock();
            if generation.is_some_and(|g| g != state.generation) {
                return;
            }
            if let Some(timer) = state.timer.take() {
                if generation.is_none() {
                    timer.abort();
                }
            }
            state.pending.drain()
        };

        if nodes.is_empty() {
            return;
        }
        debug!("Processing debounced batch of {} node(s)", nodes.len());
        for node in nodes {
            self.scanner.rescan(node);
        }
    }
}
