// # Event Source Implementations
//
// Sources that live in the core crate. Cluster-backed sources live in
// their own crates (see `nodehosts-source-kube`).

pub mod channel;

pub use channel::{ChannelEventSource, EventSender};
