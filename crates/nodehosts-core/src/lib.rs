// # nodehosts-core
//
// Core library for publishing cluster node addresses as a hosts file.
//
// ## Architecture Overview
//
// - **EventSource**: Trait for enumerating and watching cluster nodes
// - **HostsSink**: Trait for committing rendered hosts files
// - **Reconciler**: Owns the published mapping and detects real changes
// - **HostsEngine**: Core engine that drives the node event → hosts file flow
// - **ComponentRegistry**: Plugin-based registry for sources and sinks
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Change detection is separate from I/O
// 2. **Event-Driven**: Node events arrive on an async stream
// 3. **Plugin-Based**: Sources and sinks are registered by type name
// 4. **Library-First**: The daemon is a thin wrapper around this crate
// 5. **Change-Only Writes**: The sink is called only when the mapping differs

pub mod config;
pub mod engine;
pub mod error;
pub mod hosts;
pub mod node;
pub mod registry;
pub mod sink;
pub mod source;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, EventSourceConfig, HostsConfig, SinkConfig};
pub use engine::{EngineEvent, HostsEngine, LifecycleState, Outcome, Reconciler};
pub use error::{Error, Result};
pub use hosts::HostsMapping;
pub use node::{AddressPolicy, AddressType, HostRecord, NodeAddress, NodeDescriptor};
pub use registry::ComponentRegistry;
pub use traits::{EventSource, HostsSink, Removal, WatchEvent, WatchStream};
