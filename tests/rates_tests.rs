// Rate engine and snapshot store tests: delta-since-last-poll semantics

use fleetmon::models::{
    CpuDerived, CpuUsage, MemoryUsage, ProcessId, ProcessRole, Sample, SessionStats,
};
use fleetmon::rates::{RateEngine, RateTracker, round_rate};
use fleetmon::snapshot::SnapshotStore;
use std::collections::BTreeMap;

fn mk_sample(pid: u32, role: ProcessRole, timestamp_ms: u64) -> Sample {
    Sample {
        pid: ProcessId(pid),
        role,
        mem: MemoryUsage::default(),
        cpu: CpuUsage::default(),
        timestamp_ms,
        sessions: None,
        calls: BTreeMap::new(),
    }
}

#[test]
fn test_store_rotates_latest_into_previous() {
    let mut store = SnapshotStore::new();
    let first = mk_sample(1, ProcessRole::DbWorker, 1_000);
    let second = mk_sample(1, ProcessRole::DbWorker, 2_000);

    store.apply(first.clone());
    let entry = store.get(ProcessId(1)).unwrap();
    assert_eq!(entry.latest, first);
    assert!(entry.previous.is_none());

    store.apply(second.clone());
    let entry = store.get(ProcessId(1)).unwrap();
    assert_eq!(entry.latest, second);
    assert_eq!(entry.previous.as_ref(), Some(&first));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_store_remove_drops_baseline_too() {
    let mut store = SnapshotStore::new();
    store.apply(mk_sample(1, ProcessRole::DbWorker, 1_000));
    assert!(store.remove(ProcessId(1)));
    assert!(!store.remove(ProcessId(1)));
    assert!(store.get(ProcessId(1)).is_none());
    assert!(store.is_empty());
}

#[test]
fn test_round_rate_floors_to_one_decimal() {
    assert_eq!(round_rate(2.35), 2.3);
    assert_eq!(round_rate(1.29), 1.2);
    assert_eq!(round_rate(0.0), 0.0);
    assert_eq!(round_rate(10.0), 10.0);
}

#[test]
fn test_rate_tracker_first_observation_yields_zero() {
    let mut tracker = RateTracker::default();
    assert_eq!(tracker.observe(100.0, 1_000), 0.0);
    assert_eq!(tracker.observe(130.0, 11_000), 3.0);
}

#[test]
fn test_rate_tracker_rebaselines_on_decrease() {
    let mut tracker = RateTracker::default();
    tracker.observe(100.0, 1_000);
    // Restart dropped the cumulative value; no negative rate, new baseline.
    assert_eq!(tracker.observe(10.0, 11_000), 0.0);
    assert_eq!(tracker.observe(40.0, 21_000), 3.0);
}

#[test]
fn test_rate_tracker_zero_elapsed_yields_zero() {
    let mut tracker = RateTracker::default();
    tracker.observe(100.0, 1_000);
    assert_eq!(tracker.observe(200.0, 1_000), 0.0);
    assert_eq!(tracker.observe(200.0, 500), 0.0);
}

#[test]
fn test_cpu_deltas_and_percent_from_sample_timestamps() {
    let mut store = SnapshotStore::new();
    let mut first = mk_sample(1, ProcessRole::DbWorker, 1_000);
    first.cpu = CpuUsage {
        user_micros: 1_000_000,
        system_micros: 500_000,
    };
    let mut second = mk_sample(1, ProcessRole::DbWorker, 2_000);
    second.cpu = CpuUsage {
        user_micros: 2_000_000,
        system_micros: 500_000,
    };
    store.apply(first);
    store.apply(second);

    let mut engine = RateEngine::new();
    let view = engine.aggregate(&store, 2_000);
    let cpu = view.processes.get(&ProcessId(1)).unwrap().cpu;
    assert_eq!(cpu.user_secs, 1.0);
    assert_eq!(cpu.system_secs, 0.0);
    assert_eq!(cpu.total_secs, 1.0);
    assert_eq!(cpu.percent, 1.0);
}

#[test]
fn test_cpu_without_baseline_yields_zeros() {
    let mut store = SnapshotStore::new();
    let mut sample = mk_sample(1, ProcessRole::HttpWorker, 1_000);
    sample.cpu = CpuUsage {
        user_micros: 9_000_000,
        system_micros: 4_000_000,
    };
    store.apply(sample);

    let mut engine = RateEngine::new();
    let view = engine.aggregate(&store, 1_000);
    let cpu = view.processes.get(&ProcessId(1)).unwrap().cpu;
    assert_eq!(cpu, CpuDerived::default());
}

#[test]
fn test_cpu_restart_never_goes_negative() {
    let mut store = SnapshotStore::new();
    let mut first = mk_sample(1, ProcessRole::DbWorker, 1_000);
    first.cpu = CpuUsage {
        user_micros: 2_000_000,
        system_micros: 1_000_000,
    };
    let mut second = mk_sample(1, ProcessRole::DbWorker, 2_000);
    second.cpu = CpuUsage {
        user_micros: 100_000,
        system_micros: 50_000,
    };
    store.apply(first);
    store.apply(second);

    let mut engine = RateEngine::new();
    let view = engine.aggregate(&store, 2_000);
    let cpu = view.processes.get(&ProcessId(1)).unwrap().cpu;
    assert_eq!(cpu.user_secs, 0.0);
    assert_eq!(cpu.system_secs, 0.0);
    assert_eq!(cpu.total_secs, 0.0);
    assert_eq!(cpu.percent, 0.0);
}

#[test]
fn test_call_rates_are_role_qualified_and_floored() {
    let mut store = SnapshotStore::new();
    let mut engine = RateEngine::new();

    let mut sample = mk_sample(1, ProcessRole::DbWorker, 1_000);
    sample.calls.insert("monitoring".into(), 0);
    store.apply(sample);
    let view = engine.aggregate(&store, 1_000);
    assert_eq!(view.call_rates.get("worker_monitoring"), Some(&0.0));

    let mut sample = mk_sample(1, ProcessRole::DbWorker, 4_000);
    sample.calls.insert("monitoring".into(), 7);
    store.apply(sample);
    // 7 calls over 3 seconds, floored to one decimal.
    let view = engine.aggregate(&store, 4_000);
    assert_eq!(view.call_rates.get("worker_monitoring"), Some(&2.3));
}

#[test]
fn test_same_counter_name_stays_separate_per_role() {
    let mut store = SnapshotStore::new();
    let mut engine = RateEngine::new();

    for (pid, role) in [
        (1, ProcessRole::Coordinator),
        (2, ProcessRole::DbWorker),
    ] {
        let mut sample = mk_sample(pid, role, 1_000);
        sample.calls.insert("queries".into(), 0);
        store.apply(sample);
    }
    let view = engine.aggregate(&store, 1_000);
    assert!(view.call_rates.contains_key("main_queries"));
    assert!(view.call_rates.contains_key("worker_queries"));

    for (pid, role, count) in [
        (1, ProcessRole::Coordinator, 10u64),
        (2, ProcessRole::DbWorker, 30),
    ] {
        let mut sample = mk_sample(pid, role, 11_000);
        sample.calls.insert("queries".into(), count);
        store.apply(sample);
    }
    let view = engine.aggregate(&store, 11_000);
    assert_eq!(view.call_rates.get("main_queries"), Some(&1.0));
    assert_eq!(view.call_rates.get("worker_queries"), Some(&3.0));
}

#[test]
fn test_counter_restart_rebaselines_sum() {
    let mut store = SnapshotStore::new();
    let mut engine = RateEngine::new();

    let mut sample = mk_sample(1, ProcessRole::DbWorker, 1_000);
    sample.calls.insert("monitoring".into(), 100);
    store.apply(sample);
    engine.aggregate(&store, 1_000);

    // Worker restarted; its cumulative counter fell back toward zero.
    let mut sample = mk_sample(1, ProcessRole::DbWorker, 11_000);
    sample.calls.insert("monitoring".into(), 5);
    store.apply(sample);
    let view = engine.aggregate(&store, 11_000);
    assert_eq!(view.call_rates.get("worker_monitoring"), Some(&0.0));

    let mut sample = mk_sample(1, ProcessRole::DbWorker, 21_000);
    sample.calls.insert("monitoring".into(), 25);
    store.apply(sample);
    let view = engine.aggregate(&store, 21_000);
    assert_eq!(view.call_rates.get("worker_monitoring"), Some(&2.0));
}

#[test]
fn test_session_traffic_feeds_msg_rates() {
    let mut store = SnapshotStore::new();
    let mut engine = RateEngine::new();

    let mut sample = mk_sample(1, ProcessRole::Coordinator, 1_000);
    sample.sessions = Some(SessionStats {
        messages_sent: 0,
        messages_sent_bytes: 0,
        messages_received: 0,
        messages_received_bytes: 0,
        ..SessionStats::default()
    });
    store.apply(sample);
    engine.aggregate(&store, 1_000);

    let mut sample = mk_sample(1, ProcessRole::Coordinator, 11_000);
    sample.sessions = Some(SessionStats {
        messages_sent: 20,
        messages_sent_bytes: 1000,
        messages_received: 10,
        messages_received_bytes: 500,
        ..SessionStats::default()
    });
    store.apply(sample);
    let view = engine.aggregate(&store, 11_000);
    assert_eq!(view.call_rates.get("msg_sent"), Some(&2.0));
    assert_eq!(view.call_rates.get("msg_sent_size"), Some(&100.0));
    assert_eq!(view.call_rates.get("msg_received"), Some(&1.0));
    assert_eq!(view.call_rates.get("msg_received_size"), Some(&50.0));
}
