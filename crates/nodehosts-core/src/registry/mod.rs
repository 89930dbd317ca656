//! Plugin-based component registry
//!
//! The registry maps configuration type names to factories, so the daemon
//! can build event sources and sinks from configuration without
//! hard-coded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nodehosts_core::registry::ComponentRegistry;
//!
//! let registry = ComponentRegistry::new();
//! nodehosts_core::sink::register(&registry);
//! nodehosts_source_kube::register(&registry);
//!
//! let source = registry.create_event_source(&config.source)?;
//! let sink = registry.create_sink(&config.sink)?;
//! ```

use crate::config::{EventSourceConfig, SinkConfig};
use crate::error::{Error, Result};
use crate::traits::{EventSource, EventSourceFactory, HostsSink, HostsSinkFactory};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Registry of event source and sink factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ComponentRegistry {
    /// Registered event source factories
    sources: RwLock<HashMap<String, Box<dyn EventSourceFactory>>>,

    /// Registered sink factories
    sinks: RwLock<HashMap<String, Box<dyn HostsSinkFactory>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ComponentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event source factory
    ///
    /// # Parameters
    ///
    /// - `name`: Source type name (e.g., "kubernetes")
    /// - `factory`: Factory object for creating source instances
    pub fn register_event_source(
        &self,
        name: impl Into<String>,
        factory: Box<dyn EventSourceFactory>,
    ) {
        write(&self.sources).insert(name.into(), factory);
    }

    /// Register a sink factory
    ///
    /// # Parameters
    ///
    /// - `name`: Sink type name (e.g., "file", "stdout")
    /// - `factory`: Factory object for creating sink instances
    pub fn register_sink(&self, name: impl Into<String>, factory: Box<dyn HostsSinkFactory>) {
        write(&self.sinks).insert(name.into(), factory);
    }

    /// Create an event source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn EventSource>)`: Created source instance
    /// - `Err(Error)`: If the source type is not registered or creation fails
    pub fn create_event_source(&self, config: &EventSourceConfig) -> Result<Box<dyn EventSource>> {
        let source_type = config.type_name();
        let sources = read(&self.sources);

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown event source type: {}", source_type)))?;

        factory.create(config)
    }

    /// Create a sink from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn HostsSink>)`: Created sink instance
    /// - `Err(Error)`: If the sink type is not registered or creation fails
    pub fn create_sink(&self, config: &SinkConfig) -> Result<Box<dyn HostsSink>> {
        let sink_type = config.type_name();
        let sinks = read(&self.sinks);

        let factory = sinks
            .get(sink_type)
            .ok_or_else(|| Error::config(format!("Unknown sink type: {}", sink_type)))?;

        factory.create(config)
    }

    /// List all registered event source types
    pub fn list_event_sources(&self) -> Vec<String> {
        read(&self.sources).keys().cloned().collect()
    }

    /// List all registered sink types
    pub fn list_sinks(&self) -> Vec<String> {
        read(&self.sinks).keys().cloned().collect()
    }

    /// Check if an event source type is registered
    pub fn has_event_source(&self, name: &str) -> bool {
        read(&self.sources).contains_key(name)
    }

    /// Check if a sink type is registered
    pub fn has_sink(&self, name: &str) -> bool {
        read(&self.sinks).contains_key(name)
    }
}
