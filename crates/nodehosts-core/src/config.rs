//! Configuration types for nodehosts
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

use crate::node::AddressPolicy;

/// Main nodehosts configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostsConfig {
    /// Event source configuration
    pub source: EventSourceConfig,

    /// Sink configuration
    #[serde(default)]
    pub sink: SinkConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl HostsConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.source.validate()?;
        self.sink.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// Event source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventSourceConfig {
    /// Kubernetes API server list/watch of nodes
    Kubernetes {
        /// Path to a kubeconfig; in-cluster defaults when absent
        #[serde(default)]
        kubeconfig: Option<String>,
        /// API server base URL; overrides the kubeconfig server
        #[serde(default)]
        api_server: Option<String>,
        /// File holding a bearer token
        #[serde(default)]
        token_file: Option<String>,
        /// PEM bundle used to verify the API server
        #[serde(default)]
        ca_file: Option<String>,
        /// Skip TLS verification (testing only)
        #[serde(default)]
        insecure_skip_tls_verify: bool,
        /// Delay before relisting after a broken watch (in seconds)
        #[serde(default = "default_relist_delay_secs")]
        relist_delay_secs: u64,
        /// Server-side timeout requested for each watch call (in seconds)
        #[serde(default = "default_watch_timeout_secs")]
        watch_timeout_secs: u64,
    },

    /// Custom event source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl EventSourceConfig {
    /// Validate the event source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            EventSourceConfig::Kubernetes {
                api_server,
                relist_delay_secs,
                watch_timeout_secs,
                ..
            } => {
                if let Some(url) = api_server {
                    if !url.starts_with("https://") && !url.starts_with("http://") {
                        return Err(crate::Error::config(format!(
                            "API server URL must use HTTP or HTTPS scheme. Got: {}",
                            url
                        )));
                    }
                }
                if *relist_delay_secs == 0 {
                    return Err(crate::Error::config("Relist delay must be > 0"));
                }
                if *watch_timeout_secs == 0 {
                    return Err(crate::Error::config("Watch timeout must be > 0"));
                }
                Ok(())
            }
            EventSourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom event source factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom event source config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the event source type name
    pub fn type_name(&self) -> &str {
        match self {
            EventSourceConfig::Kubernetes { .. } => "kubernetes",
            EventSourceConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        EventSourceConfig::Kubernetes {
            kubeconfig: None,
            api_server: None,
            token_file: None,
            ca_file: None,
            insecure_skip_tls_verify: false,
            relist_delay_secs: default_relist_delay_secs(),
            watch_timeout_secs: default_watch_timeout_secs(),
        }
    }
}

/// Sink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    /// Atomically replaced file
    File {
        /// Path to the hosts file
        path: String,
    },

    /// Standard output
    #[default]
    Stdout,

    /// In-memory recorder (embedding, tests)
    Memory,

    /// Custom sink
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SinkConfig {
    /// Validate the sink configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SinkConfig::File { path } => {
                if path.trim().is_empty() {
                    return Err(crate::Error::config("Hosts file path cannot be empty"));
                }
                Ok(())
            }
            SinkConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom sink factory cannot be empty"));
                }
                Ok(())
            }
            SinkConfig::Stdout | SinkConfig::Memory => Ok(()),
        }
    }

    /// Get the sink type name
    pub fn type_name(&self) -> &str {
        match self {
            SinkConfig::File { .. } => "file",
            SinkConfig::Stdout => "stdout",
            SinkConfig::Memory => "memory",
            SinkConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine notification channel
    ///
    /// When full, notifications are dropped (with a warning log). Event
    /// processing is never blocked by a slow observer.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// How long to wait for the source's initial sync (in seconds)
    ///
    /// Set to 0 to wait indefinitely.
    #[serde(default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,

    /// Address types to use for hosts entries, most preferred first
    #[serde(default)]
    pub address_preference: AddressPolicy,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.address_preference.preference().is_empty() {
            return Err(crate::Error::config(
                "Address preference must name at least one address type",
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            sync_timeout_secs: default_sync_timeout_secs(),
            address_preference: AddressPolicy::default(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_sync_timeout_secs() -> u64 {
    60
}

fn default_relist_delay_secs() -> u64 {
    5
}

fn default_watch_timeout_secs() -> u64 {
    300
}
