//! Error types for nodehosts
//!
//! Only the event source (initial sync, connection) and the sink (writes)
//! can fail. Mapping and rendering are total.

use thiserror::Error;

/// Result type alias for nodehosts operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for nodehosts
#[derive(Error, Debug)]
pub enum Error {
    /// Event source errors (connection lost, stream closed)
    #[error("Event source error: {0}")]
    EventSource(String),

    /// Sink write errors
    #[error("Sink error: {0}")]
    Sink(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The event source never reported its initial state as loaded
    #[error("Initial sync failed: {0}")]
    InitialSync(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors (from the cluster API)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an event source error
    pub fn event_source(msg: impl Into<String>) -> Self {
        Self::EventSource(msg.into())
    }

    /// Create a sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an initial sync error
    pub fn initial_sync(msg: impl Into<String>) -> Self {
        Self::InitialSync(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
