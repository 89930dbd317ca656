// # Event Source Trait
//
// Defines the interface for enumerating and watching cluster nodes.
//
// ## Implementations
//
// - Kubernetes list/watch: `nodehosts-source-kube` crate
// - In-process channel: `nodehosts_core::source::ChannelEventSource`
//
// ## Usage
//
// ```rust,ignore
// use nodehosts_core::EventSource;
// use tokio_stream::StreamExt;
//
// let source = /* EventSource implementation */;
// let mut events = source.watch();
// while let Some(event) = events.next().await {
//     println!("{:?}", event);
// }
// ```

use std::pin::Pin;
use tokio_stream::Stream;

use crate::node::NodeDescriptor;

/// How a deleted node was reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// Last known state of the node
    Node(NodeDescriptor),
    /// The source lost track of the object and only knows its key
    Tombstone {
        /// Node name
        key: String,
    },
}

impl Removal {
    /// Hostname of the removed node
    pub fn hostname(&self) -> &str {
        match self {
            Removal::Node(node) => &node.name,
            Removal::Tombstone { key } => key,
        }
    }
}

/// A lifecycle event for one node, or the initial-sync marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Node appeared (or was enumerated at startup)
    Added(NodeDescriptor),

    /// Node changed
    ///
    /// Equal version markers on `old` and `new` signal a resync
    /// notification with no content change.
    Updated {
        old: NodeDescriptor,
        new: NodeDescriptor,
    },

    /// Node departed
    Removed(Removal),

    /// The initial enumeration has been fully delivered
    Synced,
}

impl WatchEvent {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::Added(_) => "added",
            WatchEvent::Updated { .. } => "updated",
            WatchEvent::Removed(_) => "removed",
            WatchEvent::Synced => "synced",
        }
    }

    /// Name of the node this event concerns, if any
    pub fn node_name(&self) -> Option<&str> {
        match self {
            WatchEvent::Added(node) => Some(&node.name),
            WatchEvent::Updated { new, .. } => Some(&new.name),
            WatchEvent::Removed(removal) => Some(removal.hostname()),
            WatchEvent::Synced => None,
        }
    }
}

/// Boxed stream of watch events
pub type WatchStream = Pin<Box<dyn Stream<Item = WatchEvent> + Send + 'static>>;

/// Trait for node event sources
///
/// A source delivers, in one ordered stream, the full initial enumeration
/// of nodes as `Added` events, then exactly one `Synced`, then incremental
/// changes. Sources may deliver the same node many times; every event is
/// authoritative for its node.
///
/// # Stream termination
///
/// The stream should run until dropped. Ending it before `Synced` tells
/// the engine the initial sync failed; ending it afterwards tells the
/// engine the source is gone. Both stop the engine with an error.
///
/// # Rules
///
/// - Sources observe; they never decide whether the hosts file changes
/// - Spawned tasks must exit once the stream is dropped
pub trait EventSource: Send + Sync {
    /// Start watching nodes
    ///
    /// Called once per engine run.
    fn watch(&self) -> WatchStream;

    /// Name of the source, for logs
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing event sources from configuration
pub trait EventSourceFactory: Send + Sync {
    /// Create an EventSource instance from configuration
    fn create(
        &self,
        config: &crate::config::EventSourceConfig,
    ) -> Result<Box<dyn EventSource>, crate::Error>;
}
