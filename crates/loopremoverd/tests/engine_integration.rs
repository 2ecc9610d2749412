//! End-to-end behaviour of the loop remover against the in-memory store.

use pretty_assertions::assert_eq;
use sonic_loopremoverd::port_status::forwarding_links;
use sonic_loopremoverd::{
    Link, LoopRemover, MemoryPortStatusStore, PortRef, PortStatus, PortStatusMap,
    ProcessorConfig, ProcessorState, RetryPolicy, StoreError,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const DELAY: Duration = Duration::from_millis(1000);

fn engine(store: &Arc<MemoryPortStatusStore>) -> LoopRemover {
    let config = ProcessorConfig {
        refresh_delay: DELAY,
        max_reschedules: 10,
        host_link_marker: "host".to_string(),
    };
    LoopRemover::with_parts("flow:1", config, store.clone(), RetryPolicy::default())
}

/// Sleeps long enough for any pending refresh to complete.
async fn settle() {
    tokio::time::sleep(DELAY * 3).await;
}

fn triangle() -> Vec<Link> {
    vec![
        Link::new("ab", "A", "A:1", "B", "B:1"),
        Link::new("bc", "B", "B:2", "C", "C:1"),
        Link::new("ca", "C", "C:2", "A", "A:2"),
    ]
}

fn expect(entries: &[(&str, &str, PortStatus)]) -> PortStatusMap {
    entries
        .iter()
        .map(|(node, port, status)| (PortRef::new(*node, *port), *status))
        .collect()
}

fn assert_loop_free(engine: &LoopRemover, store: &MemoryPortStatusStore) {
    let links = engine.all_links();
    let records = store.records();
    let mut joined: Vec<BTreeSet<String>> = Vec::new();
    for link in forwarding_links(&links, &records) {
        let a = joined.iter().position(|c| c.contains(link.source_node.as_str()));
        let b = joined.iter().position(|c| c.contains(link.dest_node.as_str()));
        match (a, b) {
            (Some(a), Some(b)) if a == b => panic!("forwarding cycle through {link}"),
            (Some(a), Some(b)) => {
                let merged = joined.remove(a.max(b));
                joined[a.min(b)].extend(merged);
            }
            (Some(i), None) | (None, Some(i)) => {
                joined[i].insert(link.source_node.to_string());
                joined[i].insert(link.dest_node.to_string());
            }
            (None, None) => joined.push(
                [link.source_node.to_string(), link.dest_node.to_string()]
                    .into_iter()
                    .collect(),
            ),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn triangle_converges_to_expected_statuses() {
    let store = Arc::new(MemoryPortStatusStore::new());
    let engine = engine(&store);

    engine.on_link_event(triangle(), vec![]).unwrap();
    settle().await;

    assert_eq!(engine.all_links().len(), 3);
    assert_eq!(engine.links_in_mst().len(), 2);
    assert_eq!(
        store.records(),
        expect(&[
            ("A", "A:1", PortStatus::Forwarding),
            ("A", "A:2", PortStatus::Discarding),
            ("B", "B:1", PortStatus::Forwarding),
            ("B", "B:2", PortStatus::Forwarding),
            ("C", "C:1", PortStatus::Forwarding),
            ("C", "C:2", PortStatus::Discarding),
        ])
    );
    assert_loop_free(&engine, &store);
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn burst_of_events_yields_one_refresh() {
    let store = Arc::new(MemoryPortStatusStore::new());
    let engine = engine(&store);

    for i in 0..50 {
        let link = Link::new(
            format!("l{i}"),
            format!("n{}", i % 7),
            format!("n{}:{i}", i % 7),
            format!("n{}", (i * 3 + 1) % 7),
            format!("n{}:{i}", (i * 3 + 1) % 7),
        );
        engine.on_link_event(vec![link], vec![]).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    settle().await;

    assert_eq!(engine.stats().refreshes, 1);
    assert_eq!(engine.stats().events_received, 50);
    assert_eq!(store.apply_count(), 1);
    assert_eq!(engine.all_links().len(), 50);
    assert_loop_free(&engine, &store);
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_refresh_without_change_writes_nothing() {
    let store = Arc::new(MemoryPortStatusStore::new());
    let engine = engine(&store);

    engine.on_link_event(triangle(), vec![]).unwrap();
    settle().await;
    let written = store.write_count();
    assert_eq!(written, 6);

    engine.on_link_event(triangle(), vec![]).unwrap();
    settle().await;

    assert_eq!(engine.stats().refreshes, 2);
    assert_eq!(store.write_count(), written);
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn removed_bridge_ports_are_discarded() {
    let store = Arc::new(MemoryPortStatusStore::new());
    let engine = engine(&store);
    let bridge = Link::new("cd", "C", "C:3", "D", "D:1");

    let mut links = triangle();
    links.push(bridge.clone());
    links.push(Link::new("de", "D", "D:2", "E", "E:1"));
    engine.on_link_event(links, vec![]).unwrap();
    settle().await;
    assert_eq!(
        store.records()[&PortRef::new("C", "C:3")],
        PortStatus::Forwarding
    );

    engine.on_link_event(vec![], vec![bridge]).unwrap();
    settle().await;

    let records = store.records();
    assert_eq!(records[&PortRef::new("C", "C:3")], PortStatus::Discarding);
    assert_eq!(records[&PortRef::new("D", "D:1")], PortStatus::Discarding);
    assert_eq!(records[&PortRef::new("D", "D:2")], PortStatus::Forwarding);
    assert_eq!(engine.links_in_mst().len(), 3);
    assert_loop_free(&engine, &store);
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn store_outage_delays_but_does_not_lose_changes() {
    let store = Arc::new(MemoryPortStatusStore::new());
    let engine = engine(&store);

    engine.on_link_event(triangle(), vec![]).unwrap();
    settle().await;

    // Two full refreshes worth of failed attempts.
    store.fail_next(6, StoreError::connection("refused"));
    engine
        .on_link_event(vec![], vec![Link::new("ab", "A", "A:1", "B", "B:1")])
        .unwrap();
    tokio::time::sleep(DELAY * 2).await;
    assert!(engine.stats().failed_refreshes >= 1);
    assert_eq!(engine.state(), ProcessorState::RefreshScheduled);

    // Intake keeps working while the store is down.
    engine
        .on_link_event(vec![Link::new("bd", "B", "B:3", "D", "D:1")], vec![])
        .unwrap();
    tokio::time::sleep(DELAY * 6).await;

    assert_eq!(engine.stats().failed_refreshes, 2);
    assert_eq!(engine.state(), ProcessorState::Idle);
    let records = store.records();
    assert_eq!(records[&PortRef::new("A", "A:1")], PortStatus::Discarding);
    assert_eq!(records[&PortRef::new("B", "B:1")], PortStatus::Discarding);
    assert_eq!(records[&PortRef::new("A", "A:2")], PortStatus::Forwarding);
    assert_eq!(records[&PortRef::new("B", "B:3")], PortStatus::Forwarding);
    assert_loop_free(&engine, &store);
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reverse_direction_twins_forward() {
    let store = Arc::new(MemoryPortStatusStore::new());
    let engine = engine(&store);

    engine
        .on_link_event(
            vec![
                Link::new("openflow:1:1", "openflow:1", "openflow:1:1", "openflow:2", "openflow:2:1"),
                Link::new("openflow:2:1", "openflow:2", "openflow:2:1", "openflow:1", "openflow:1:1"),
                Link::new(
                    "host:00:00:00:00:00:01/openflow:1:3",
                    "host:00:00:00:00:00:01",
                    "host:00:00:00:00:00:01",
                    "openflow:1",
                    "openflow:1:3",
                ),
            ],
            vec![],
        )
        .unwrap();
    settle().await;

    assert_eq!(engine.all_links().len(), 2);
    assert_eq!(engine.links_in_mst().len(), 1);
    assert_eq!(
        store.records(),
        expect(&[
            ("openflow:1", "openflow:1:1", PortStatus::Forwarding),
            ("openflow:2", "openflow:2:1", PortStatus::Forwarding),
        ])
    );
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn removal_lost_at_shutdown_is_discarded_after_restart() {
    let store = Arc::new(MemoryPortStatusStore::new());
    let ab = Link::new("ab", "A", "A:1", "B", "B:1");
    let cd = Link::new("cd", "C", "C:1", "D", "D:1");

    let first = engine(&store);
    first
        .on_link_event(vec![ab.clone(), cd.clone()], vec![])
        .unwrap();
    settle().await;
    assert_eq!(store.records()[&PortRef::new("A", "A:1")], PortStatus::Forwarding);

    // Shut down while the removal is still waiting out the delay.
    first.on_link_event(vec![], vec![ab]).unwrap();
    first.shutdown().await;
    assert_eq!(first.stats().refreshes, 1);

    // The restarted daemon only ever hears about the surviving link.
    let second = engine(&store);
    second.request_refresh().unwrap();
    second.on_link_event(vec![cd], vec![]).unwrap();
    settle().await;

    assert_eq!(second.stats().refreshes, 1);
    assert_eq!(
        store.records(),
        expect(&[
            ("A", "A:1", PortStatus::Discarding),
            ("B", "B:1", PortStatus::Discarding),
            ("C", "C:1", PortStatus::Forwarding),
            ("D", "D:1", PortStatus::Forwarding),
        ])
    );
    assert_loop_free(&second, &store);
    second.shutdown().await;
}
