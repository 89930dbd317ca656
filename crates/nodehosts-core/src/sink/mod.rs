// # Hosts Sink Implementations
//
// This module provides implementations of the HostsSink trait for
// different destinations.

pub mod file;
pub mod memory;
pub mod stdout;

pub use file::{AtomicFileSink, AtomicFileSinkFactory};
pub use memory::{MemorySink, MemorySinkFactory};
pub use stdout::{StdoutSink, StdoutSinkFactory};

use crate::registry::ComponentRegistry;

/// Register the built-in sinks with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_sink("file", Box::new(AtomicFileSinkFactory));
    registry.register_sink("stdout", Box::new(StdoutSinkFactory));
    registry.register_sink("memory", Box::new(MemorySinkFactory));
}
