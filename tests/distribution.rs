//! End-to-end distribution scenarios: register, route, long-poll consume,
//! transactional piggyback, capacity pressure.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use signalbox::collector::TransactionNotificationCollector;
use signalbox::config::Config;
use signalbox::context::RequestContext;
use signalbox::message::NotificationMessage;
use signalbox::registry::NotificationRegistry;
use signalbox::utils::bootstrap::init_tracing;

const NO_WAIT: Duration = Duration::ZERO;

fn payload_strings(messages: &[NotificationMessage]) -> Vec<String> {
    messages
        .iter()
        .map(|m| m.payload().as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_long_poll_wakes_on_late_producer() {
    init_tracing();
    let registry = Arc::new(NotificationRegistry::default());
    registry.register_session("node-1", "s1", "alice").await;

    // Long poll starts before anything is produced.
    let consumer = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.consume("node-1", 10, Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    registry.put_for_user("alice", json!("woke-you")).await;

    let messages = consumer.await.unwrap();
    assert_eq!(payload_strings(&messages), vec!["woke-you"]);
}

#[tokio::test]
async fn test_multi_node_fanout_and_isolation() {
    let registry = NotificationRegistry::default();
    registry.register_session("node-1", "s1", "alice").await;
    registry.register_session("node-1", "s2", "bob").await;
    registry.register_session("node-2", "s3", "alice").await;
    registry.register_session("node-3", "s4", "carol").await;

    registry.put_for_all_nodes(json!("broadcast")).await;
    registry.put_for_user("alice", json!("for-alice")).await;
    registry.put_for_session("s4", json!("for-s4")).await;

    let node1 = registry.consume("node-1", 10, NO_WAIT).await;
    let node2 = registry.consume("node-2", 10, NO_WAIT).await;
    let node3 = registry.consume("node-3", 10, NO_WAIT).await;

    assert_eq!(payload_strings(&node1), vec!["broadcast", "for-alice"]);
    assert_eq!(payload_strings(&node2), vec!["broadcast", "for-alice"]);
    assert_eq!(payload_strings(&node3), vec!["broadcast", "for-s4"]);
}

#[tokio::test]
async fn test_transactional_commit_flow() {
    let registry = NotificationRegistry::default();
    registry.register_session("node-1", "s1", "alice").await;
    registry.register_session("node-2", "s2", "alice").await;

    // A request on node-1 opens a transaction and mutates state twice.
    let collector = Arc::new(TransactionNotificationCollector::new());
    let ctx = RequestContext::new("node-1")
        .with_collector(Arc::clone(&collector))
        .with_response(true);
    registry
        .put_transactional_for_user(&ctx, "alice", json!("first-change"))
        .await;
    registry
        .put_transactional_for_user(&ctx, "alice", json!("second-change"))
        .await;

    // Nothing is observable before the commit pipeline drains the collector.
    assert!(registry.consume("node-1", 10, NO_WAIT).await.is_empty());

    // Commit: the response carries both notifications back directly.
    let piggybacked = collector.values().await;
    assert_eq!(
        payload_strings(&piggybacked),
        vec!["first-change", "second-change"]
    );

    // The remote node polls them out of its mailbox as usual.
    let remote = registry.consume("node-2", 10, NO_WAIT).await;
    assert_eq!(
        payload_strings(&remote),
        vec!["first-change", "second-change"]
    );

    // The transaction is done; late arrivals take the mailbox path.
    registry
        .put_transactional_for_user(&ctx, "alice", json!("straggler"))
        .await;
    let local = registry.consume("node-1", 10, NO_WAIT).await;
    assert_eq!(payload_strings(&local), vec!["straggler"]);
}

#[tokio::test]
async fn test_capacity_pressure_keeps_newest() {
    let mut config = Config::default();
    config.registry.mailbox_capacity = 3;

    let registry = NotificationRegistry::new(config.registry.clone());
    registry.register_session("node-1", "s1", "alice").await;

    for i in 0..10 {
        registry.put_for_all_nodes(json!(format!("burst{i}"))).await;
    }

    let messages = registry.consume("node-1", 10, NO_WAIT).await;
    assert_eq!(payload_strings(&messages), vec!["burst7", "burst8", "burst9"]);
}

#[tokio::test]
async fn test_config_driven_cleanup_task() {
    let yaml = "registry:\n  expires_in_secs: 0\ncleanup:\n  interval_secs: 1\n";
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert!(config.cleanup.enabled());

    let registry = Arc::new(NotificationRegistry::new(config.registry.clone()));
    registry.register_session("node-1", "s1", "alice").await;

    // Everything produced under this config expires immediately.
    registry.put_for_all_nodes(json!("ephemeral")).await;
    let handle = registry.spawn_cleanup_task(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.abort();

    assert!(registry.consume("node-1", 10, NO_WAIT).await.is_empty());
}

#[tokio::test]
async fn test_concurrent_producers_single_consumer() {
    let registry = Arc::new(NotificationRegistry::default());
    registry.register_session("node-1", "s1", "alice").await;

    let mut producers = Vec::new();
    for i in 0..8 {
        let registry = Arc::clone(&registry);
        producers.push(tokio::spawn(async move {
            registry.put_for_user("alice", json!(format!("p{i}"))).await;
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    // All eight arrive, each exactly once, within the capacity bound.
    let mut seen = Vec::new();
    while seen.len() < 8 {
        let batch = registry.consume("node-1", 3, Duration::from_secs(1)).await;
        assert!(!batch.is_empty(), "producers finished, messages must be pending");
        seen.extend(payload_strings(&batch));
    }
    seen.sort();
    let expected: Vec<String> = (0..8).map(|i| format!("p{i}")).collect();
    assert_eq!(seen, expected);
}
