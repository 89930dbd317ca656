//! Hosts reconciliation engine
//!
//! The HostsEngine is responsible for:
//! - Consuming node lifecycle events from an EventSource
//! - Keeping the published hosts mapping (via the [`Reconciler`])
//! - Writing the rendered hosts file to a HostsSink when it changes
//! - Tracking startup sync and shutdown through its [`Lifecycle`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ EventSource │─── WatchEvent ───┐
//! └─────────────┘                  │
//!                                  ▼
//!                         ┌──────────────┐
//!                         │ HostsEngine  │
//!                         └──────────────┘
//!                                  │
//!         ┌────────────────────────┼────────────────────────┐
//!         │                        │                        │
//!         ▼                        ▼                        ▼
//! ┌──────────────┐         ┌─────────────┐          ┌─────────────┐
//! │  Reconciler  │         │  HostsSink  │          │   Events    │
//! │  (compare)   │         │  (write)    │          │  (notify)   │
//! └──────────────┘         └─────────────┘          └─────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. Event received from the source
//! 2. Reconciler builds a candidate mapping from a copy of the published one
//! 3. If it differs, it becomes the published mapping and is rendered
//! 4. Rendered bytes go to the sink; failures are logged, never rolled back
//! 5. Emit event for monitoring/logging

pub mod lifecycle;
pub mod reconciler;

pub use lifecycle::{Lifecycle, LifecycleState, wait_until_settled};
pub use reconciler::{Outcome, Reconciler, is_resync};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::traits::{EventSource, HostsSink, WatchEvent};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// Events emitted by the HostsEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started watching
    Started { source: String, sink: String },

    /// Event source finished its initial enumeration
    Ready { hosts: usize },

    /// A changed hosts file was committed by the sink
    Published {
        record: String,
        hosts: usize,
        bytes: usize,
    },

    /// An event did not change the mapping
    PublishSkipped { hostname: String },

    /// An update carried an unchanged version marker and was dropped
    ResyncDiscarded { hostname: String },

    /// The sink failed; the in-memory mapping was kept
    PublishFailed { record: String, error: String },

    /// Engine stopped
    Stopped { reason: String },
}

/// Core reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`HostsEngine::new()`]
/// 2. Start with [`HostsEngine::run()`] or [`HostsEngine::run_with_shutdown()`]
/// 3. Engine runs until shutdown is requested or the source fails
///
/// ## Threading
///
/// Events are handled one at a time on the task that runs the engine, so
/// the published mapping never sees concurrent access. A sink write
/// happens after the new mapping is committed in memory.
pub struct HostsEngine {
    /// Source of node lifecycle events
    source: Box<dyn EventSource>,

    /// Destination for rendered hosts files
    sink: Box<dyn HostsSink>,

    /// Owner of the published mapping
    reconciler: Reconciler,

    /// Startup/shutdown state
    lifecycle: Lifecycle,

    /// Maximum wait for the initial sync
    sync_timeout: Option<Duration>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl HostsEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        source: Box<dyn EventSource>,
        sink: Box<dyn HostsSink>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let sync_timeout =
            (config.sync_timeout_secs > 0).then(|| Duration::from_secs(config.sync_timeout_secs));

        let engine = Self {
            source,
            sink,
            reconciler: Reconciler::new(config.address_preference),
            lifecycle: Lifecycle::new(),
            sync_timeout,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Override the initial sync timeout (`None` waits indefinitely)
    pub fn with_sync_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Subscribe to lifecycle state changes
    ///
    /// Observers use this to learn when the initial sync completed.
    pub fn lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.subscribe()
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Run until Ctrl-C
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown_rx` fires or its sender is dropped
    pub async fn run_with_shutdown(&mut self, shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        self.run_until(async move {
            let _ = shutdown_rx.await;
        })
        .await
    }

    /// Run until `shutdown` completes
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Shutdown was requested
    /// - `Err(Error::InitialSync)`: The source did not sync in time or
    ///   ended its stream before syncing
    /// - `Err(Error::EventSource)`: The source ended its stream after syncing
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let source_name = self.source.source_name();
        let sink_name = self.sink.sink_name();
        info!(
            "Starting hosts engine (source={}, sink={})",
            source_name, sink_name
        );
        self.emit_event(EngineEvent::Started {
            source: source_name.to_string(),
            sink: sink_name.to_string(),
        });

        let mut events = self.source.watch();

        let sync_timeout = self.sync_timeout;
        let sync_deadline = async move {
            match sync_timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(sync_deadline);

        info!("Waiting for event source to sync");

        let result = loop {
            let initializing = self.lifecycle.state() == LifecycleState::Initializing;

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break Ok(());
                }

                _ = &mut sync_deadline, if initializing => {
                    break Err(Error::initial_sync(format!(
                        "event source did not sync within {:?}",
                        sync_timeout.unwrap_or_default()
                    )));
                }

                next = events.next() => match next {
                    Some(event) => self.handle_event(event).await,
                    None if initializing => {
                        break Err(Error::initial_sync("event stream ended before initial sync"));
                    }
                    None => {
                        break Err(Error::event_source("event stream ended"));
                    }
                },
            }
        };

        self.lifecycle.transition(LifecycleState::Draining);
        drop(events);
        self.lifecycle.transition(LifecycleState::Stopped);

        let reason = match &result {
            Ok(()) => "Shutdown signal".to_string(),
            Err(e) => e.to_string(),
        };
        info!("Shutting down hosts engine: {}", reason);
        self.emit_event(EngineEvent::Stopped { reason });

        result
    }

    /// Handle one watch event
    async fn handle_event(&mut self, event: WatchEvent) {
        if let WatchEvent::Synced = event {
            if self.lifecycle.mark_ready() {
                let hosts = self.reconciler.published().len();
                info!("Event source synced successfully ({} host(s))", hosts);
                self.emit_event(EngineEvent::Ready { hosts });
            } else {
                debug!("Ignoring repeated sync signal");
            }
            return;
        }

        let hostname = event.node_name().unwrap_or_default().to_string();
        debug!("Received {} event for {}", event.kind(), hostname);

        match self.reconciler.reconcile(&event) {
            Outcome::Discarded => {
                debug!("Discarding resync notification for {}", hostname);
                self.emit_event(EngineEvent::ResyncDiscarded { hostname });
            }
            Outcome::Unchanged { record } => {
                debug!("Hosts file did not change ({}) -- skipping update", record);
                self.emit_event(EngineEvent::PublishSkipped { hostname });
            }
            Outcome::Changed { record, rendered } => {
                info!("Updating hosts file with: [{}]", record);
                self.publish(record.to_string(), rendered).await;
            }
        }
    }

    /// Hand a rendered document to the sink
    ///
    /// The mapping is already committed; a failure only delays the file.
    async fn publish(&self, record: String, rendered: String) {
        let hosts = self.reconciler.published().len();
        match self.sink.write(rendered.as_bytes()).await {
            Ok(bytes) => {
                debug!(
                    "Wrote {} bytes ({} host(s)) to {} sink",
                    bytes,
                    hosts,
                    self.sink.sink_name()
                );
                self.emit_event(EngineEvent::Published {
                    record,
                    hosts,
                    bytes,
                });
            }
            Err(e) => {
                error!("Failed to write hosts file: {}", e);
                self.emit_event(EngineEvent::PublishFailed {
                    record,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // Never block event processing on a slow observer
        if self.event_tx.try_send(event).is_err() {
            warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            );
        }
    }
}
