// # Stdout Sink
//
// Writes each rendered document to standard output. Used by the daemon
// when no hosts file path is given.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::config::SinkConfig;
use crate::traits::{HostsSink, HostsSinkFactory};

/// Sink that prints documents to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostsSink for StdoutSink {
    async fn write(&self, contents: &[u8]) -> Result<usize, Error> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(contents)
            .await
            .map_err(|e| Error::sink(format!("Failed to write to stdout: {}", e)))?;
        stdout
            .flush()
            .await
            .map_err(|e| Error::sink(format!("Failed to flush stdout: {}", e)))?;
        Ok(contents.len())
    }

    fn sink_name(&self) -> &'static str {
        "stdout"
    }
}

/// Factory for stdout sinks
pub struct StdoutSinkFactory;

impl HostsSinkFactory for StdoutSinkFactory {
    fn create(&self, config: &SinkConfig) -> Result<Box<dyn HostsSink>, Error> {
        match config {
            SinkConfig::Stdout => Ok(Box::new(StdoutSink::new())),
            _ => Err(Error::config("Invalid config for stdout sink")),
        }
    }
}
