// Counter registry and session counter tests

use fleetmon::registry::{CounterRegistry, SessionCounters};

#[test]
fn test_counters_accumulate() {
    let registry = CounterRegistry::new();
    registry.increment_one("queries");
    registry.increment_one("queries");
    registry.increment("queries", 3);
    registry.increment("uploads", 10);

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.get("queries"), Some(&5));
    assert_eq!(snapshot.get("uploads"), Some(&10));
}

#[test]
fn test_negative_increment_is_clamped_to_zero() {
    let registry = CounterRegistry::new();
    registry.increment("queries", -5);
    assert_eq!(registry.snapshot().get("queries"), Some(&0));

    registry.increment("queries", 7);
    registry.increment("queries", -100);
    assert_eq!(registry.snapshot().get("queries"), Some(&7));
}

#[test]
fn test_snapshot_does_not_reset() {
    let registry = CounterRegistry::new();
    registry.increment("queries", 4);
    let first = registry.snapshot();
    let second = registry.snapshot();
    assert_eq!(first, second);
    assert_eq!(second.get("queries"), Some(&4));
}

#[test]
fn test_counter_saturates_instead_of_wrapping() {
    let registry = CounterRegistry::new();
    registry.increment("big", i64::MAX);
    registry.increment("big", i64::MAX);
    registry.increment("big", i64::MAX);
    let value = *registry.snapshot().get("big").unwrap();
    assert_eq!(value, u64::MAX);
}

#[test]
fn test_session_counters_mix_gauges_and_accumulators() {
    let sessions = SessionCounters::new();
    sessions.set_ws_connections(4);
    sessions.set_registered_users(2);
    sessions.set_active_channels(9);
    sessions.record_sent(3, 150);
    sessions.record_sent(1, 50);
    sessions.record_received(2, 1000);

    let stats = sessions.current();
    assert_eq!(stats.ws_connections, 4);
    assert_eq!(stats.registered_users, 2);
    assert_eq!(stats.active_channels, 9);
    assert_eq!(stats.messages_sent, 4);
    assert_eq!(stats.messages_sent_bytes, 200);
    assert_eq!(stats.messages_received, 2);
    assert_eq!(stats.messages_received_bytes, 1000);

    // Gauge-like fields overwrite, they do not add.
    sessions.set_ws_connections(1);
    assert_eq!(sessions.current().ws_connections, 1);
}
