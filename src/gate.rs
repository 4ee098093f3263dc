// Aggregation cache gate: debounces collection rounds under scrape pressure.
// One mutex does both jobs — callers that arrive mid-round queue on it
// (single flight), and on acquiring it they re-check freshness so a burst is
// served by one round and the cached result.

use crate::correlator::Coordinator;
use crate::models::{AggregatedView, ProcessId, ProcessRole};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, interval};

struct CachedView {
    completed_at: Instant,
    view: Arc<AggregatedView>,
}

struct GateInner {
    coordinator: Coordinator,
    cached: Option<CachedView>,
}

pub struct CacheGate {
    min_interval: Duration,
    inner: Mutex<GateInner>,
}

impl CacheGate {
    pub fn new(coordinator: Coordinator, min_interval: Duration) -> Self {
        Self {
            min_interval,
            inner: Mutex::new(GateInner {
                coordinator,
                cached: None,
            }),
        }
    }

    /// Returns the aggregated view, running a collection round only when the
    /// cached one is older than the configured minimum interval. Always
    /// yields a view; a caller never observes a partially built round.
    pub async fn get(&self) -> Arc<AggregatedView> {
        let mut inner = self.inner.lock().await;
        if let Some(cached) = &inner.cached
            && cached.completed_at.elapsed() < self.min_interval
        {
            return cached.view.clone();
        }
        let view = inner.coordinator.run_round().await;
        inner.cached = Some(CachedView {
            completed_at: Instant::now(),
            view: view.clone(),
        });
        view
    }

    /// Last computed view without forcing a round, however stale.
    /// None until the first round has completed.
    pub async fn cached(&self) -> Option<Arc<AggregatedView>> {
        self.inner.lock().await.cached.as_ref().map(|c| c.view.clone())
    }

    /// Worker-termination notice from the supervisor. The dropped counter
    /// contribution makes the global sums decrease, which the rate trackers
    /// treat as a rebaseline on the next round.
    pub async fn worker_closed(&self, role: ProcessRole, pid: ProcessId) {
        tracing::info!(role = %role, pid = %pid, "worker closed");
        self.inner.lock().await.coordinator.worker_closed(pid);
    }
}

/// Background cadence: refreshes the gate on a fixed interval so the cache
/// never ages beyond it even with no scrape traffic.
pub fn spawn_refresh(
    gate: Arc<CacheGate>,
    every: Duration,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The interval fires immediately; skip that so startup isn't a round.
        tick.tick().await;
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let view = gate.get().await;
                    tracing::debug!(
                        operation = "background_refresh",
                        processes = view.processes.len(),
                        "aggregated view refreshed"
                    );
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("background refresh shutting down");
                    break;
                }
            }
        }
    })
}
