// Collection rounds: broadcast a tagged request to every worker, gather
// replies until all have answered or the round times out.

use crate::models::{CollectRequest, ProcessId, RoundToken, Sample};
use crate::rates::RateEngine;
use crate::registry::{CounterRegistry, SessionCounters};
use crate::sampler::{LocalSampler, now_ms};
use crate::snapshot::SnapshotStore;
use crate::transport::Transport;
use crate::models::AggregatedView;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, timeout_at};

/// One resolved correlation episode.
#[derive(Debug)]
pub struct RoundOutcome {
    pub token: RoundToken,
    /// Samples from workers that answered within the timeout.
    pub answered: Vec<Sample>,
    /// Workers that never replied; their store entries stay stale.
    pub missing: Vec<ProcessId>,
}

/// Issues tagged collection rounds and matches replies to the current round.
/// At most one round runs at a time; the cache gate enforces that globally
/// by holding the coordinator behind a mutex.
pub struct Correlator {
    transport: Arc<dyn Transport>,
    replies: mpsc::Receiver<crate::models::CollectReply>,
    timeout: Duration,
    next_token: u64,
}

impl Correlator {
    pub fn new(
        transport: Arc<dyn Transport>,
        replies: mpsc::Receiver<crate::models::CollectReply>,
        timeout: Duration,
    ) -> Self {
        // Seeded from the clock so tokens from a restarted coordinator never
        // collide with stragglers addressed to the previous incarnation.
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
        Self {
            transport,
            replies,
            timeout,
            next_token: seed,
        }
    }

    fn fresh_token(&mut self) -> RoundToken {
        self.next_token = self.next_token.wrapping_add(1);
        RoundToken(self.next_token)
    }

    /// Runs one collection round. Every known worker gets the same timeout,
    /// armed at broadcast time; a reply counts only when its token matches
    /// this round and its identity is expected and not yet answered.
    pub async fn collect(&mut self) -> RoundOutcome {
        let token = self.fresh_token();
        let mut pending: BTreeSet<ProcessId> = self.transport.workers().into_iter().collect();
        let expected = pending.len();

        self.transport.broadcast(CollectRequest { token });
        let deadline = Instant::now() + self.timeout;

        let mut answered = Vec::with_capacity(expected);
        while !pending.is_empty() {
            let reply = match timeout_at(deadline, self.replies.recv()).await {
                Ok(Some(reply)) => reply,
                // Transport gone: resolve with what we have.
                Ok(None) => break,
                // Timers fired for everything still pending.
                Err(_) => break,
            };
            if reply.token != token {
                // Straggler from an already-closed round; must not corrupt this one.
                tracing::debug!(
                    pid = %reply.pid,
                    stale_token = reply.token.0,
                    "discarding reply with stale round token"
                );
                continue;
            }
            if !pending.remove(&reply.pid) {
                tracing::debug!(pid = %reply.pid, "discarding reply from unexpected identity");
                continue;
            }
            answered.push(reply.sample);
        }

        let missing: Vec<ProcessId> = pending.into_iter().collect();
        if !missing.is_empty() {
            tracing::warn!(
                operation = "collect",
                expected,
                answered = answered.len(),
                missing = ?missing,
                "collection round timed out with unanswered workers"
            );
        }
        RoundOutcome {
            token,
            answered,
            missing,
        }
    }
}

/// Coordinator-side assembly: one correlation round, snapshot-store update,
/// rate derivation. Owned exclusively by the cache gate.
pub struct Coordinator {
    correlator: Correlator,
    store: SnapshotStore,
    engine: RateEngine,
    sampler: Arc<LocalSampler>,
    registry: Arc<CounterRegistry>,
    sessions: Arc<SessionCounters>,
}

impl Coordinator {
    pub fn new(
        correlator: Correlator,
        sampler: Arc<LocalSampler>,
        registry: Arc<CounterRegistry>,
        sessions: Arc<SessionCounters>,
    ) -> Self {
        Self {
            correlator,
            store: SnapshotStore::new(),
            engine: RateEngine::new(),
            sampler,
            registry,
            sessions,
        }
    }

    /// Runs one round end to end and rebuilds the aggregated view.
    /// Per-worker failures are absorbed here; the caller always gets a view.
    pub async fn run_round(&mut self) -> Arc<AggregatedView> {
        let worker_count = self.correlator.transport.workers().len() as u64;
        self.sessions.set_ws_connections(worker_count);

        let outcome = self.correlator.collect().await;

        let received_bytes: u64 = outcome
            .answered
            .iter()
            .map(|s| serde_json::to_vec(s).map(|v| v.len() as u64).unwrap_or(0))
            .sum();
        self.sessions.record_sent(worker_count, worker_count * REQUEST_WIRE_BYTES);
        self.sessions
            .record_received(outcome.answered.len() as u64, received_bytes);

        // The coordinator's own sample needs no round-trip; it is taken
        // after the round so its session counters include this round's traffic.
        let local = self
            .sampler
            .sample(&self.registry, Some(self.sessions.current()));
        self.store.apply(local);
        for sample in outcome.answered {
            self.store.apply(sample);
        }

        Arc::new(self.engine.aggregate(&self.store, now_ms()))
    }

    /// Worker-termination notice: the identity is reclaimed and must not be
    /// confused with a future reuse, so the baseline goes with the entry.
    pub fn worker_closed(&mut self, pid: ProcessId) {
        if self.store.remove(pid) {
            tracing::debug!(pid = %pid, operation = "worker_closed", "snapshot entry removed");
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }
}

/// Approximate wire size of a collection request frame, for the session
/// traffic counters.
const REQUEST_WIRE_BYTES: u64 = 48;
