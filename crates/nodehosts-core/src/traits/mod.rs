//! Core traits for nodehosts
//!
//! - [`EventSource`]: Enumerate and watch cluster nodes
//! - [`HostsSink`]: Commit rendered hosts files

pub mod event_source;
pub mod hosts_sink;

pub use event_source::{EventSource, EventSourceFactory, Removal, WatchEvent, WatchStream};
pub use hosts_sink::{HostsSink, HostsSinkFactory};
