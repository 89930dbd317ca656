// # Hosts Sink Trait
//
// Defines where rendered hosts files go.
//
// ## Implementations
//
// - Atomic file: `nodehosts_core::sink::AtomicFileSink`
// - Standard output: `nodehosts_core::sink::StdoutSink`
// - In-memory: `nodehosts_core::sink::MemorySink`

use async_trait::async_trait;

/// Trait for hosts file sinks
///
/// # Atomicity
///
/// A reader must never observe a partially written document. File-backed
/// sinks achieve this by writing a temporary file and renaming it into
/// place.
///
/// # Failures
///
/// Sinks do not retry. A failed write is reported to the engine, which
/// logs it and keeps its in-memory mapping; the next change writes the
/// full current document again.
#[async_trait]
pub trait HostsSink: Send + Sync {
    /// Commit a rendered hosts document
    ///
    /// # Returns
    ///
    /// - `Ok(usize)`: Number of bytes written
    /// - `Err(Error)`: The document was not committed
    async fn write(&self, contents: &[u8]) -> Result<usize, crate::Error>;

    /// Name of the sink, for logs
    fn sink_name(&self) -> &'static str;
}

/// Helper trait for constructing sinks from configuration
pub trait HostsSinkFactory: Send + Sync {
    /// Create a HostsSink instance from configuration
    fn create(
        &self,
        config: &crate::config::SinkConfig,
    ) -> Result<Box<dyn HostsSink>, crate::Error>;
}
