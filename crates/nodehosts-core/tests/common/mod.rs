//! Test doubles and common utilities for engine contract tests
//!
//! The doubles here only count and record; they never decide anything,
//! so every assertion is about engine behavior.

#![allow(dead_code)]

use async_trait::async_trait;
use nodehosts_core::engine::{EngineEvent, HostsEngine, LifecycleState};
use nodehosts_core::error::{Error, Result};
use nodehosts_core::node::{AddressType, NodeDescriptor};
use nodehosts_core::traits::{EventSource, HostsSink, WatchStream};
use nodehosts_core::EngineConfig;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// How long a test waits for any single engine reaction
pub const REACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// A sink that records every document it is asked to write
#[derive(Clone, Default)]
pub struct RecordingSink {
    /// Call counter for write(), successful or not
    write_calls: Arc<AtomicUsize>,
    /// Documents that were committed
    committed: Arc<Mutex<Vec<String>>>,
    /// When set, write() fails without committing
    failing: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of times write() was called
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Get every committed document, oldest first
    pub fn committed(&self) -> Vec<String> {
        self.committed.lock().unwrap().clone()
    }

    /// Get the last committed document
    pub fn last(&self) -> Option<String> {
        self.committed.lock().unwrap().last().cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl HostsSink for RecordingSink {
    async fn write(&self, contents: &[u8]) -> Result<usize> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::sink("disk full"));
        }
        self.committed
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(contents).into_owned());
        Ok(contents.len())
    }

    fn sink_name(&self) -> &'static str {
        "recording"
    }
}

/// An event source that never emits and never ends
pub struct IdleEventSource;

impl EventSource for IdleEventSource {
    fn watch(&self) -> WatchStream {
        Box::pin(tokio_stream::pending())
    }

    fn source_name(&self) -> &'static str {
        "idle"
    }
}

/// A node with a single internal address
pub fn internal(name: &str, addr: &str) -> NodeDescriptor {
    NodeDescriptor::new(name).with_address(AddressType::InternalIp, addr)
}

/// Engine configuration for tests
pub fn test_config() -> EngineConfig {
    EngineConfig {
        event_channel_capacity: 100,
        sync_timeout_secs: 0,
        ..EngineConfig::default()
    }
}

/// The hosts document expected for `entries` (already sorted)
pub fn expected_document(entries: &[(&str, &str)]) -> String {
    let mut doc = String::from("## THIS IS AN AUTO-GENERATED HOSTS FILE -- DO NOT EDIT.\n#\n");
    for (host, addr) in entries {
        doc.push_str(&format!("{}\t\t{}\n", addr, host));
    }
    doc
}

/// An engine running on its own task
pub struct RunningEngine {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<(HostsEngine, Result<()>)>,
    pub events: mpsc::Receiver<EngineEvent>,
    pub lifecycle: watch::Receiver<LifecycleState>,
}

impl RunningEngine {
    /// Construct an engine and start it
    pub fn spawn(engine: HostsEngine, events: mpsc::Receiver<EngineEvent>) -> Self {
        let lifecycle = engine.lifecycle();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let mut engine = engine;

        let handle = tokio::spawn(async move {
            let result = engine.run_with_shutdown(shutdown_rx).await;
            (engine, result)
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle,
            events,
            lifecycle,
        }
    }

    /// Build and start an engine from a source, a sink and a configuration
    pub fn start(
        source: impl EventSource + 'static,
        sink: impl HostsSink + 'static,
        config: EngineConfig,
    ) -> Self {
        let (engine, events) = HostsEngine::new(Box::new(source), Box::new(sink), config)
            .expect("engine construction succeeds");
        Self::spawn(engine, events)
    }

    /// Wait for the next engine event matching `predicate`, skipping others
    pub async fn wait_for<F>(&mut self, predicate: F) -> EngineEvent
    where
        F: Fn(&EngineEvent) -> bool,
    {
        tokio::time::timeout(REACTION_TIMEOUT, async {
            loop {
                match self.events.recv().await {
                    Some(event) if predicate(&event) => return event,
                    Some(_) => continue,
                    None => panic!("engine event channel closed"),
                }
            }
        })
        .await
        .expect("engine reacted in time")
    }

    /// Wait for the engine's reaction to one node event
    pub async fn next_outcome(&mut self) -> EngineEvent {
        self.wait_for(|event| {
            matches!(
                event,
                EngineEvent::Published { .. }
                    | EngineEvent::PublishSkipped { .. }
                    | EngineEvent::ResyncDiscarded { .. }
                    | EngineEvent::PublishFailed { .. }
            )
        })
        .await
    }

    /// Wait until the engine reports readiness
    pub async fn ready(&mut self) -> usize {
        match self
            .wait_for(|event| matches!(event, EngineEvent::Ready { .. }))
            .await
        {
            EngineEvent::Ready { hosts } => hosts,
            _ => unreachable!(),
        }
    }

    /// Wait for the engine to return on its own
    pub async fn finished(self) -> (HostsEngine, Result<()>) {
        tokio::time::timeout(REACTION_TIMEOUT, self.handle)
            .await
            .expect("engine terminated in time")
            .expect("engine task did not panic")
    }

    /// Request shutdown and wait for the engine to return
    pub async fn stop(mut self) -> (HostsEngine, Result<()>) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.finished().await
    }
}

impl RunningEngine {
    /// Request shutdown and assert the engine stopped cleanly
    pub async fn shutdown_cleanly(self) {
        let (engine, result) = self.stop().await;
        result.expect("clean shutdown");
        assert_eq!(engine.state(), LifecycleState::Stopped);
    }
}
