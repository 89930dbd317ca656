//! Last-known state of every node
//!
//! The cache turns raw list/watch results into lifecycle events: it
//! supplies the `old` side of updates and detects nodes that vanished
//! while the watch was down.

use crate::api::{Node, WatchNotice};
use nodehosts_core::node::NodeDescriptor;
use nodehosts_core::traits::{Removal, WatchEvent};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct NodeCache {
    nodes: HashMap<String, NodeDescriptor>,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Replace the cache with a full listing
    ///
    /// Listed nodes come out as `Added` (unknown) or `Updated` (known), in
    /// list order; nodes missing from the listing come out as tombstones,
    /// sorted by name.
    pub fn relist(&mut self, listed: Vec<NodeDescriptor>) -> Vec<WatchEvent> {
        let mut events = Vec::with_capacity(listed.len());
        let mut seen = HashSet::with_capacity(listed.len());

        for node in listed {
            seen.insert(node.name.clone());
            events.push(self.upsert(node));
        }

        let mut vanished: Vec<String> = self
            .nodes
            .keys()
            .filter(|name| !seen.contains(*name))
            .cloned()
            .collect();
        vanished.sort();

        for key in vanished {
            self.nodes.remove(&key);
            events.push(WatchEvent::Removed(Removal::Tombstone { key }));
        }

        events
    }

    /// Apply one watch notice
    ///
    /// Returns `None` for notices that carry no node change.
    pub fn apply(&mut self, notice: WatchNotice) -> Option<WatchEvent> {
        match notice {
            WatchNotice::Added(node) | WatchNotice::Modified(node) => {
                Some(self.upsert(NodeDescriptor::from(node)))
            }
            WatchNotice::Deleted(node) => Some(self.remove(node)),
            WatchNotice::Bookmark { .. } | WatchNotice::Error(_) => None,
        }
    }

    fn upsert(&mut self, node: NodeDescriptor) -> WatchEvent {
        match self.nodes.insert(node.name.clone(), node.clone()) {
            Some(old) => WatchEvent::Updated { old, new: node },
            None => WatchEvent::Added(node),
        }
    }

    fn remove(&mut self, node: Node) -> WatchEvent {
        let node = NodeDescriptor::from(node);
        self.nodes.remove(&node.name);
        WatchEvent::Removed(Removal::Node(node))
    }
}
