// # Kubernetes Event Source
//
// This crate provides an EventSource that lists and watches `v1/Node`
// objects through the Kubernetes API server.
//
// ## Protocol
//
// 1. `GET /api/v1/nodes` lists every node; each becomes an `Added` event,
//    followed by a single `Synced`
// 2. `GET /api/v1/nodes?watch=true&resourceVersion=<rv>` streams changes as
//    newline-delimited JSON until the server closes the watch
// 3. A closed watch is reopened from the last seen resource version; one
//    that closed within a second without a single line is reopened only
//    after the relist delay
// 4. An expired resource version, a broken connection or a watch that
//    outlives its deadline triggers a relist after a delay; the relist is
//    diffed against the cache, so nodes that vanished meanwhile are
//    reported as tombstones
//
// Connection settings come from a kubeconfig, explicit flags, or the
// in-cluster service account (see [`ClientSettings::resolve`]).
//
// If the very first list fails, the stream ends and the engine reports a
// failed initial sync.

pub mod api;
pub mod cache;
pub mod client;
pub mod kubeconfig;

use nodehosts_core::ComponentRegistry;
use nodehosts_core::config::EventSourceConfig;
use nodehosts_core::traits::{EventSource, EventSourceFactory, WatchEvent, WatchStream};
use nodehosts_core::{Error, Result};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

use crate::api::WatchNotice;
use crate::cache::NodeCache;
pub use crate::client::{ClientSettings, ConnectionFlags, KubeClient, LineBuffer};
pub use crate::kubeconfig::Kubeconfig;

/// Server-side timeout requested for each watch call
const DEFAULT_WATCH_TIMEOUT_SECS: u64 = 300;

/// A watch closing sooner than this without any line counts as premature
const MIN_WATCH_DURATION: Duration = Duration::from_secs(1);

/// Kubernetes node list/watch source
pub struct KubeEventSource {
    client: Arc<KubeClient>,
    relist_delay: Duration,
    watch_timeout_secs: u64,
}

impl KubeEventSource {
    pub fn new(client: KubeClient, relist_delay: Duration) -> Self {
        Self {
            client: Arc::new(client),
            relist_delay,
            watch_timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS,
        }
    }

    /// Override the server-side watch timeout
    pub fn with_watch_timeout(mut self, secs: u64) -> Self {
        self.watch_timeout_secs = secs;
        self
    }
}

impl EventSource for KubeEventSource {
    fn watch(&self) -> WatchStream {
        let (tx, rx) = mpsc::unbounded_channel();

        let informer = Informer {
            client: Arc::clone(&self.client),
            tx,
            cache: NodeCache::new(),
            resource_version: None,
            relist_delay: self.relist_delay,
            watch_timeout_secs: self.watch_timeout_secs,
        };
        tokio::spawn(informer.run());

        Box::pin(UnboundedReceiverStream::new(rx))
    }

    fn source_name(&self) -> &'static str {
        "kubernetes"
    }
}

/// Why a single watch call ended
#[derive(Debug)]
enum WatchEnd {
    /// The server closed the watch; reopen from the last resource version
    Closed,
    /// The watch closed at once without a line; reopen after a pause
    Premature,
    /// The resource version is too old or the connection broke; relist
    Relist(String),
    /// The engine dropped the stream
    ReceiverGone,
}

/// Background task behind one `watch()` call
struct Informer {
    client: Arc<KubeClient>,
    tx: mpsc::UnboundedSender<WatchEvent>,
    cache: NodeCache,
    resource_version: Option<String>,
    relist_delay: Duration,
    watch_timeout_secs: u64,
}

impl Informer {
    async fn run(mut self) {
        info!(
            "Starting Kubernetes node watch (api_server={})",
            self.client.base_url()
        );

        if let Err(e) = self.list().await {
            error!("Initial node list failed: {}", e);
            return;
        }
        if !self.send(WatchEvent::Synced) {
            return;
        }

        loop {
            match self.watch_once().await {
                WatchEnd::Closed => {
                    debug!("Node watch closed by server, reopening");
                }
                WatchEnd::Premature => {
                    warn!(
                        "Node watch closed immediately without events, reopening in {:?}",
                        self.relist_delay
                    );
                    if !self.pause().await {
                        break;
                    }
                }
                WatchEnd::ReceiverGone => break,
                WatchEnd::Relist(reason) => {
                    warn!("Node watch interrupted ({}), relisting", reason);
                    if !self.relist_until_success().await {
                        break;
                    }
                }
            }
        }

        debug!("Kubernetes node watch stopped");
    }

    /// List nodes and emit the diff against the cache
    async fn list(&mut self) -> Result<()> {
        let list = self.client.list_nodes().await?;
        self.resource_version = list.resource_version();

        let events = self.cache.relist(list.into_descriptors());
        debug!(
            "Listed {} node(s) at resource version {:?}",
            self.cache.len(),
            self.resource_version
        );

        for event in events {
            if !self.send(event) {
                return Err(Error::event_source("event stream receiver dropped"));
            }
        }
        Ok(())
    }

    /// Wait `relist_delay` and list again until a list succeeds
    ///
    /// Returns false once the receiver is gone.
    async fn relist_until_success(&mut self) -> bool {
        loop {
            if !self.pause().await {
                return false;
            }

            match self.list().await {
                Ok(()) => return true,
                Err(_) if self.tx.is_closed() => return false,
                Err(e) => warn!("Node relist failed: {}", e),
            }
        }
    }

    /// Sleep `relist_delay`; false if the receiver went away meanwhile
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.tx.closed() => false,
            _ = tokio::time::sleep(self.relist_delay) => true,
        }
    }

    /// Run one watch call to completion
    async fn watch_once(&mut self) -> WatchEnd {
        let started = Instant::now();
        let mut response = match self
            .client
            .watch_nodes(self.resource_version.as_deref(), self.watch_timeout_secs)
            .await
        {
            Ok(response) => response,
            Err(e) => return WatchEnd::Relist(e.to_string()),
        };

        let mut lines = LineBuffer::default();
        let mut received = 0usize;
        loop {
            let chunk = tokio::select! {
                _ = self.tx.closed() => return WatchEnd::ReceiverGone,
                chunk = response.chunk() => chunk,
            };

            match chunk {
                Ok(Some(bytes)) => {
                    for line in lines.push(&bytes) {
                        received += 1;
                        if let Some(end) = self.handle_line(&line) {
                            return end;
                        }
                    }
                }
                Ok(None) => {
                    if let Some(line) = lines.finish() {
                        received += 1;
                        if let Some(end) = self.handle_line(&line) {
                            return end;
                        }
                    }
                    if received == 0 && started.elapsed() < MIN_WATCH_DURATION {
                        return WatchEnd::Premature;
                    }
                    return WatchEnd::Closed;
                }
                Err(e) => return WatchEnd::Relist(format!("watch stream failed: {}", e)),
            }
        }
    }

    /// Apply one watch line; `Some` ends the current watch
    fn handle_line(&mut self, line: &str) -> Option<WatchEnd> {
        let notice = match WatchNotice::parse(line) {
            Ok(notice) => notice,
            Err(e) => {
                warn!("Skipping undecodable watch line: {}", e);
                return None;
            }
        };

        if let WatchNotice::Error(status) = &notice {
            let reason = if status.is_expired() {
                format!("resource version expired: {}", status)
            } else {
                format!("watch error: {}", status)
            };
            return Some(WatchEnd::Relist(reason));
        }

        if let Some(rv) = notice.resource_version() {
            self.resource_version = Some(rv.to_string());
        }

        if let Some(event) = self.cache.apply(notice) {
            if !self.send(event) {
                return Some(WatchEnd::ReceiverGone);
            }
        }
        None
    }

    fn send(&self, event: WatchEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Factory for creating Kubernetes event sources
pub struct KubeSourceFactory;

impl EventSourceFactory for KubeSourceFactory {
    fn create(&self, config: &EventSourceConfig) -> Result<Box<dyn EventSource>> {
        match config {
            EventSourceConfig::Kubernetes {
                kubeconfig,
                api_server,
                token_file,
                ca_file,
                insecure_skip_tls_verify,
                relist_delay_secs,
                watch_timeout_secs,
            } => {
                let settings = ClientSettings::resolve(&ConnectionFlags {
                    kubeconfig: kubeconfig.clone(),
                    api_server: api_server.clone(),
                    token_file: token_file.clone(),
                    ca_file: ca_file.clone(),
                    insecure_skip_tls_verify: *insecure_skip_tls_verify,
                })?;
                let client = KubeClient::new(&settings)?;

                Ok(Box::new(
                    KubeEventSource::new(client, Duration::from_secs(*relist_delay_secs))
                        .with_watch_timeout(*watch_timeout_secs),
                ))
            }
            _ => Err(Error::config("Invalid config for Kubernetes event source")),
        }
    }
}

/// Register the Kubernetes event source with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_event_source("kubernetes", Box::new(KubeSourceFactory));
}
