// # Memory Sink
//
// In-memory implementation of HostsSink.
//
// Records every committed document. Useful for embedding (the host
// application reads the latest document instead of a file) and for tests,
// which can also make writes fail on demand.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::Error;
use crate::config::SinkConfig;
use crate::traits::{HostsSink, HostsSinkFactory};

/// In-memory sink
///
/// Clones share the same history, so a test can hand one clone to the
/// engine and inspect the other.
///
/// # Example
///
/// ```rust
/// use nodehosts_core::sink::MemorySink;
/// use nodehosts_core::traits::HostsSink;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let sink = MemorySink::new();
///     sink.write(b"doc").await?;
///     assert_eq!(sink.latest().await.as_deref(), Some("doc"));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    writes: Arc<RwLock<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every committed document, oldest first
    pub async fn writes(&self) -> Vec<String> {
        self.writes.read().await.clone()
    }

    /// The most recently committed document
    pub async fn latest(&self) -> Option<String> {
        self.writes.read().await.last().cloned()
    }

    /// Number of committed documents
    pub async fn len(&self) -> usize {
        self.writes.read().await.len()
    }

    /// Check if nothing has been committed yet
    pub async fn is_empty(&self) -> bool {
        self.writes.read().await.is_empty()
    }
}

#[async_trait]
impl HostsSink for MemorySink {
    async fn write(&self, contents: &[u8]) -> Result<usize, Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::sink("memory sink is set to fail"));
        }

        let doc = String::from_utf8_lossy(contents).into_owned();
        self.writes.write().await.push(doc);
        Ok(contents.len())
    }

    fn sink_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for memory sinks
pub struct MemorySinkFactory;

impl HostsSinkFactory for MemorySinkFactory {
    fn create(&self, config: &SinkConfig) -> Result<Box<dyn HostsSink>, Error> {
        match config {
            SinkConfig::Memory => Ok(Box::new(MemorySink::new())),
            _ => Err(Error::config("Invalid config for memory sink")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_writes_in_order() {
        let sink = MemorySink::new();
        let observer = sink.clone();

        sink.write(b"one").await.unwrap();
        sink.write(b"two").await.unwrap();

        assert_eq!(observer.writes().await, vec!["one", "two"]);
        assert_eq!(observer.latest().await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn failing_writes_are_not_recorded() {
        let sink = MemorySink::new();
        sink.set_failing(true);
        assert!(sink.write(b"lost").await.is_err());
        assert!(sink.is_empty().await);

        sink.set_failing(false);
        sink.write(b"kept").await.unwrap();
        assert_eq!(sink.len().await, 1);
    }
}
