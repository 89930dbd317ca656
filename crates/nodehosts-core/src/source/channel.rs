// # Channel Event Source
//
// An EventSource fed from inside the process. The embedding application
// (or a test) keeps the `EventSender` and pushes lifecycle events; the
// engine consumes them through `watch()`.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::Error;
use crate::node::NodeDescriptor;
use crate::traits::{EventSource, Removal, WatchEvent, WatchStream};

/// Event source backed by an unbounded channel
pub struct ChannelEventSource {
    receiver: Arc<Mutex<Option<mpsc::UnboundedReceiver<WatchEvent>>>>,
}

impl ChannelEventSource {
    /// Create a source and the sender that feeds it
    pub fn new() -> (Self, EventSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            receiver: Arc::new(Mutex::new(Some(rx))),
        };
        (source, EventSender { tx })
    }
}

impl EventSource for ChannelEventSource {
    fn watch(&self) -> WatchStream {
        let taken = match self.receiver.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match taken {
            Some(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            None => {
                tracing::warn!("Channel event source watched twice; second stream is empty");
                Box::pin(tokio_stream::empty())
            }
        }
    }

    fn source_name(&self) -> &'static str {
        "channel"
    }
}

/// Sending half of a [`ChannelEventSource`]
///
/// Dropping every sender ends the stream.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<WatchEvent>,
}

impl EventSender {
    /// Send a raw event
    pub fn send(&self, event: WatchEvent) -> Result<(), Error> {
        self.tx
            .send(event)
            .map_err(|_| Error::event_source("event stream receiver dropped"))
    }

    /// Report a new node
    pub fn added(&self, node: NodeDescriptor) -> Result<(), Error> {
        self.send(WatchEvent::Added(node))
    }

    /// Report a changed node
    pub fn updated(&self, old: NodeDescriptor, new: NodeDescriptor) -> Result<(), Error> {
        self.send(WatchEvent::Updated { old, new })
    }

    /// Report a deleted node with its last known state
    pub fn removed(&self, node: NodeDescriptor) -> Result<(), Error> {
        self.send(WatchEvent::Removed(Removal::Node(node)))
    }

    /// Report a deleted node known only by name
    pub fn tombstone(&self, key: impl Into<String>) -> Result<(), Error> {
        self.send(WatchEvent::Removed(Removal::Tombstone { key: key.into() }))
    }

    /// Report that the initial enumeration is complete
    pub fn synced(&self) -> Result<(), Error> {
        self.send(WatchEvent::Synced)
    }
}
