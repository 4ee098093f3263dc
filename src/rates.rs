// Rate derivation over cumulative counters and CPU time.
// Semantics are delta-since-last-poll throughout: every figure is the change
// since the previous collection round, never an average since process start.

use crate::models::{AggregatedView, CpuDerived, ProcessMetrics};
use crate::snapshot::{SnapshotStore, StoreEntry};
use std::collections::BTreeMap;

/// One-decimal resolution for exported call rates, to suppress display noise.
pub fn round_rate(value: f64) -> f64 {
    (10.0 * value).floor() / 10.0
}

/// Last observed cumulative value and its timestamp, for one counter name.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateTracker {
    last: Option<(f64, u64)>,
}

impl RateTracker {
    /// Feeds the next cumulative observation and returns the per-second rate
    /// since the previous one. Yields 0 on the first observation (no
    /// baseline), on a zero or negative elapsed interval, and on a value
    /// lower than the baseline (process restart; the new value becomes the
    /// new baseline rather than producing a negative delta).
    pub fn observe(&mut self, value: f64, now_ms: u64) -> f64 {
        let rate = match self.last {
            None => 0.0,
            Some((old_value, old_ms)) => {
                let elapsed_secs = (now_ms as f64 - old_ms as f64) / 1000.0;
                if elapsed_secs <= 0.0 || value < old_value {
                    0.0
                } else {
                    (value - old_value) / elapsed_secs
                }
            }
        };
        self.last = Some((value, now_ms));
        rate
    }
}

/// Derives the aggregated view from the snapshot store. CPU deltas come from
/// each entry's own latest/previous pair; call rates come from per-name
/// trackers over the cross-process, role-qualified counter sums.
#[derive(Debug, Default)]
pub struct RateEngine {
    call_trackers: BTreeMap<String, RateTracker>,
}

impl RateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the exported view. Commutative over reply order: it only
    /// reads the store after the round has resolved.
    pub fn aggregate(&mut self, store: &SnapshotStore, now_ms: u64) -> AggregatedView {
        let mut processes = BTreeMap::new();
        let mut totals: BTreeMap<String, u64> = BTreeMap::new();

        for (pid, entry) in store.iter() {
            let latest = &entry.latest;

            // Coordinator message traffic joins the counter totals under a
            // msg_ prefix, like any other cumulative counter.
            if let Some(sessions) = &latest.sessions {
                for (key, value) in [
                    ("msg_sent", sessions.messages_sent),
                    ("msg_sent_size", sessions.messages_sent_bytes),
                    ("msg_received", sessions.messages_received),
                    ("msg_received_size", sessions.messages_received_bytes),
                ] {
                    *totals.entry(key.to_string()).or_default() += value;
                }
            }

            // Identical counter names may be incremented independently in
            // several processes; qualify by role before summing.
            for (name, count) in &latest.calls {
                let key = format!("{}_{}", latest.role.counter_prefix(), name);
                *totals.entry(key).or_default() += count;
            }

            processes.insert(
                *pid,
                ProcessMetrics {
                    role: latest.role,
                    mem: latest.mem,
                    cpu: cpu_derived(entry),
                    sessions: latest.sessions,
                },
            );
        }

        let mut call_rates = BTreeMap::new();
        for (key, total) in totals {
            let tracker = self.call_trackers.entry(key.clone()).or_default();
            let rate = round_rate(tracker.observe(total as f64, now_ms));
            call_rates.insert(key, rate.max(0.0));
        }

        AggregatedView {
            processes,
            call_rates,
        }
    }
}

/// CPU deltas and percent for one process. The first-ever observation has no
/// baseline and yields zero deltas rather than a since-start spike; a
/// cumulative value below the baseline is a restart and also yields zero.
/// Elapsed time comes from the samples' own timestamps, not wall-clock call
/// time, so scheduling jitter cannot skew the percentage.
fn cpu_derived(entry: &StoreEntry) -> CpuDerived {
    let Some(previous) = &entry.previous else {
        return CpuDerived::default();
    };

    let delta = |current: f64, baseline: f64| {
        let d = current - baseline;
        if d < 0.0 { 0.0 } else { d }
    };
    let user_secs = delta(
        entry.latest.cpu.user_seconds(),
        previous.cpu.user_seconds(),
    );
    let system_secs = delta(
        entry.latest.cpu.system_seconds(),
        previous.cpu.system_seconds(),
    );
    let total_secs = user_secs + system_secs;

    let elapsed_secs =
        (entry.latest.timestamp_ms as f64 - previous.timestamp_ms as f64) / 1000.0;
    let percent = if elapsed_secs <= 0.0 {
        0.0
    } else {
        total_secs / elapsed_secs
    };

    CpuDerived {
        user_secs,
        system_secs,
        total_secs,
        percent,
    }
}
