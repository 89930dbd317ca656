//! Minimal embedding example for nodehosts-core
//!
//! The application owns the event source (here an in-process channel fed
//! by hand) and reads published documents from a memory sink instead of a
//! file. The engine lifecycle is fully managed by the application.

use nodehosts_core::engine::{LifecycleState, wait_until_settled};
use nodehosts_core::node::{AddressType, NodeDescriptor};
use nodehosts_core::sink::MemorySink;
use nodehosts_core::source::ChannelEventSource;
use nodehosts_core::{EngineConfig, EngineEvent, HostsEngine, Result};
use tokio::sync::oneshot;
use tracing::Level;

fn node(name: &str, version: &str, internal: &str, external: &str) -> NodeDescriptor {
    NodeDescriptor::new(name)
        .with_resource_version(version)
        .with_address(AddressType::ExternalIp, external)
        .with_address(AddressType::InternalIp, internal)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let (source, sender) = ChannelEventSource::new();
    let sink = MemorySink::new();

    let (mut engine, mut events) = HostsEngine::new(
        Box::new(source),
        Box::new(sink.clone()),
        EngineConfig::default(),
    )?;
    let mut lifecycle = engine.lifecycle();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let engine_task = tokio::spawn(async move { engine.run_with_shutdown(shutdown_rx).await });

    // Initial enumeration, then the sync marker
    let worker1 = node("worker-1", "10", "10.0.0.11", "203.0.113.11");
    sender.added(worker1.clone())?;
    sender.added(node("worker-2", "11", "10.0.0.12", "203.0.113.12"))?;
    sender.synced()?;

    if wait_until_settled(&mut lifecycle).await != Some(LifecycleState::Ready) {
        eprintln!("[Embedded] engine stopped before becoming ready");
        return Ok(());
    }

    // A resync notification (same version) and a real change
    sender.updated(worker1.clone(), worker1.clone())?;
    sender.updated(worker1, node("worker-1", "12", "10.0.0.21", "203.0.113.11"))?;
    sender.tombstone("worker-2")?;

    // Two adds, the address change and the removal each rewrite the file
    let mut published = 0;
    while published < 4 {
        let Some(event) = events.recv().await else {
            break;
        };
        match event {
            EngineEvent::Published { record, hosts, .. } => {
                published += 1;
                println!("[Embedded] published ({} host(s)): {}", hosts, record);
            }
            EngineEvent::ResyncDiscarded { hostname } => {
                println!("[Embedded] resync of {} ignored", hostname);
            }
            other => println!("[Embedded] {:?}", other),
        }
    }

    println!("[Embedded] final hosts file:");
    print!("{}", sink.latest().await.unwrap_or_default());

    let _ = shutdown_tx.send(());
    match engine_task.await {
        Ok(result) => result?,
        Err(e) => eprintln!("[Embedded] engine task failed: {}", e),
    }

    Ok(())
}
