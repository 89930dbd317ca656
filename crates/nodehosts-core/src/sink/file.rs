// # Atomic File Sink
//
// File-backed implementation of HostsSink.
//
// ## Atomicity
//
// - Each write goes to a hidden temporary file next to the target
// - The temporary file is flushed and fsynced
// - It is then renamed over the target, which is atomic on POSIX
//   filesystems when both paths live in the same directory
//
// Readers therefore see either the previous document or the new one,
// never a truncated file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::config::SinkConfig;
use crate::traits::{HostsSink, HostsSinkFactory};

/// Hosts file sink with write-then-rename semantics
///
/// # Example
///
/// ```rust,no_run
/// use nodehosts_core::sink::AtomicFileSink;
/// use nodehosts_core::traits::HostsSink;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let sink = AtomicFileSink::new("/etc/hosts.cluster").await?;
///     sink.write(b"1.1.1.1\t\thost1\n").await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AtomicFileSink {
    path: PathBuf,
}

impl AtomicFileSink {
    /// Create a sink for `path`, creating parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        Self::ensure_parent(&path).await?;
        Ok(Self { path })
    }

    /// Create a sink without touching the filesystem
    ///
    /// Missing parent directories are created on the first write.
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Target path
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_parent(path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create hosts file directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Path of the temporary file used for atomic writes
    ///
    /// `/etc/hosts.cluster` becomes `/etc/.hosts.cluster.tmp`.
    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "hosts".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }

    async fn write_atomically(&self, contents: &[u8]) -> Result<(), Error> {
        Self::ensure_parent(&self.path)
            .await
            .map_err(|e| Error::sink(e.to_string()))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::sink(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(contents).await.map_err(|e| {
                Error::sink(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::sink(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::sink(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::sink(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            )));
        }

        tracing::trace!("Hosts file written: {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl HostsSink for AtomicFileSink {
    async fn write(&self, contents: &[u8]) -> Result<usize, Error> {
        self.write_atomically(contents).await?;
        Ok(contents.len())
    }

    fn sink_name(&self) -> &'static str {
        "file"
    }
}

/// Factory for atomic file sinks
pub struct AtomicFileSinkFactory;

impl HostsSinkFactory for AtomicFileSinkFactory {
    fn create(&self, config: &SinkConfig) -> Result<Box<dyn HostsSink>, Error> {
        match config {
            SinkConfig::File { path } => Ok(Box::new(AtomicFileSink::with_path(path))),
            _ => Err(Error::config("Invalid config for file sink")),
        }
    }
}
