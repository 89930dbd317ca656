//! Contract Test: Change Detection
//!
//! The sink is called if and only if the published mapping changes, and
//! every write carries the full rendered mapping.
//!
//! Constraints verified:
//! - Duplicate deliveries never reach the sink
//! - Updates with unchanged version markers are dropped unseen
//! - Removals (full node or tombstone) rewrite the file
//! - Documents are sorted by hostname regardless of arrival order
//!
//! If this test fails, someone has added:
//! - Writes that bypass the mapping comparison
//! - Partial (delta) documents
//! - Rendering that depends on event order

mod common;

use common::*;
use nodehosts_core::engine::EngineEvent;
use nodehosts_core::node::NodeDescriptor;
use nodehosts_core::sink::AtomicFileSink;
use nodehosts_core::source::ChannelEventSource;

#[tokio::test]
async fn two_nodes_render_sorted_document() {
    let (source, sender) = ChannelEventSource::new();
    let sink = RecordingSink::new();
    let mut engine = RunningEngine::start(source, sink.clone(), test_config());

    sender.added(internal("host2", "2.2.2.2")).expect("send succeeds");
    sender.added(internal("host1", "1.1.1.1")).expect("send succeeds");
    sender.synced().expect("send succeeds");

    assert_eq!(engine.ready().await, 2);
    assert_eq!(
        sink.last().as_deref(),
        Some(
            "## THIS IS AN AUTO-GENERATED HOSTS FILE -- DO NOT EDIT.\n#\n\
             1.1.1.1\t\thost1\n\
             2.2.2.2\t\thost2\n"
        )
    );
    assert_eq!(sink.write_calls(), 2);

    engine.shutdown_cleanly().await;
}

#[tokio::test]
async fn duplicate_add_does_not_call_sink() {
    let (source, sender) = ChannelEventSource::new();
    let sink = RecordingSink::new();
    let mut engine = RunningEngine::start(source, sink.clone(), test_config());

    sender.added(internal("host1", "1.1.1.1")).expect("send succeeds");
    assert!(matches!(
        engine.next_outcome().await,
        EngineEvent::Published { .. }
    ));

    sender.added(internal("host1", "1.1.1.1")).expect("send succeeds");
    assert_eq!(
        engine.next_outcome().await,
        EngineEvent::PublishSkipped {
            hostname: "host1".to_string()
        }
    );

    assert_eq!(sink.write_calls(), 1);
    engine.shutdown_cleanly().await;
}

#[tokio::test]
async fn update_with_unchanged_version_is_never_published() {
    let (source, sender) = ChannelEventSource::new();
    let sink = RecordingSink::new();
    let mut engine = RunningEngine::start(source, sink.clone(), test_config());

    let old = internal("host1", "1.1.1.1").with_resource_version("42");
    let new = internal("host1", "5.5.5.5").with_resource_version("42");
    sender.updated(old, new).expect("send succeeds");

    assert_eq!(
        engine.next_outcome().await,
        EngineEvent::ResyncDiscarded {
            hostname: "host1".to_string()
        }
    );
    assert_eq!(sink.write_calls(), 0);
    engine.shutdown_cleanly().await;
}

#[tokio::test]
async fn address_change_rewrites_document() {
    let (source, sender) = ChannelEventSource::new();
    let sink = RecordingSink::new();
    let mut engine = RunningEngine::start(source, sink.clone(), test_config());

    let v1 = internal("host1", "1.1.1.1").with_resource_version("1");
    let v2 = internal("host1", "1.1.1.9").with_resource_version("2");
    sender.added(v1.clone()).expect("send succeeds");
    sender.updated(v1, v2).expect("send succeeds");

    engine.next_outcome().await;
    assert!(matches!(
        engine.next_outcome().await,
        EngineEvent::Published { hosts: 1, .. }
    ));
    assert_eq!(
        sink.last(),
        Some(expected_document(&[("host1", "1.1.1.9")]))
    );
    engine.shutdown_cleanly().await;
}

#[tokio::test]
async fn removal_rewrites_remaining_hosts() {
    let (source, sender) = ChannelEventSource::new();
    let sink = RecordingSink::new();
    let mut engine = RunningEngine::start(source, sink.clone(), test_config());

    sender.added(internal("host1", "1.1.1.1")).expect("send succeeds");
    sender.added(internal("host2", "2.2.2.2")).expect("send succeeds");
    sender.removed(internal("host2", "2.2.2.2")).expect("send succeeds");

    for _ in 0..3 {
        engine.next_outcome().await;
    }
    assert_eq!(
        sink.last(),
        Some(expected_document(&[("host1", "1.1.1.1")]))
    );

    sender.tombstone("host1").expect("send succeeds");
    assert!(matches!(
        engine.next_outcome().await,
        EngineEvent::Published { hosts: 0, .. }
    ));
    assert_eq!(sink.last(), Some(expected_document(&[])));
    assert_eq!(sink.write_calls(), 4);
    engine.shutdown_cleanly().await;
}

#[tokio::test]
async fn removal_of_unknown_host_is_skipped() {
    let (source, sender) = ChannelEventSource::new();
    let sink = RecordingSink::new();
    let mut engine = RunningEngine::start(source, sink.clone(), test_config());

    sender.tombstone("ghost").expect("send succeeds");
    assert!(matches!(
        engine.next_outcome().await,
        EngineEvent::PublishSkipped { .. }
    ));

    sender
        .added(NodeDescriptor::new("bare"))
        .expect("send succeeds");
    assert!(matches!(
        engine.next_outcome().await,
        EngineEvent::PublishSkipped { .. }
    ));

    assert_eq!(sink.write_calls(), 0);
    engine.shutdown_cleanly().await;
}

#[tokio::test]
async fn file_sink_holds_latest_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("hosts.cluster");
    let sink = AtomicFileSink::new(&path).await.expect("sink construction");

    let (source, sender) = ChannelEventSource::new();
    let mut engine = RunningEngine::start(source, sink, test_config());

    sender.added(internal("b", "10.0.0.2")).expect("send succeeds");
    sender.added(internal("a", "10.0.0.1")).expect("send succeeds");
    sender.synced().expect("send succeeds");
    engine.ready().await;

    let contents = std::fs::read_to_string(&path).expect("hosts file exists");
    assert_eq!(
        contents,
        expected_document(&[("a", "10.0.0.1"), ("b", "10.0.0.2")])
    );

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name())
        .collect();
    assert_eq!(leftovers.len(), 1, "no temporary files remain: {:?}", leftovers);

    engine.shutdown_cleanly().await;
}
