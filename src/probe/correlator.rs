// Sequence-correlation for the latency probe: pending-reply tables keyed by
// a strictly increasing sequence number, discarded wholesale on disconnect.

use std::collections::HashMap;
use tokio::time::{Duration, Instant};

/// Delay before the next probe: `interval - latency`, floored at zero so a
/// reply slower than the interval triggers the next probe immediately.
/// Probes end up paced at roughly one per interval regardless of latency.
pub fn next_probe_delay(interval: Duration, latency: Duration) -> Duration {
    interval.saturating_sub(latency)
}

/// Pending-reply state for the two probe operations. Outer frame sequence
/// numbers and inner RPC transaction ids are separate spaces, as on the
/// wire. Sequence numbers keep increasing across reconnects; only the
/// pending tables are reset, so a stale reply can never match.
#[derive(Debug, Default)]
pub struct ProbeCorrelator {
    seq: u64,
    rpc_txid: u64,
    pending_pings: HashMap<u64, Instant>,
    pending_rpcs: HashMap<u64, Instant>,
}

impl ProbeCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next outer frame sequence number (JOIN, LEAVE, MSG envelopes).
    pub fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Registers an outgoing ping; returns its sequence number.
    pub fn track_ping(&mut self, sent_at: Instant) -> u64 {
        let seq = self.next_seq();
        self.pending_pings.insert(seq, sent_at);
        seq
    }

    /// Registers an outgoing RPC; returns its transaction id.
    pub fn track_rpc(&mut self, sent_at: Instant) -> u64 {
        self.rpc_txid += 1;
        self.pending_rpcs.insert(self.rpc_txid, sent_at);
        self.rpc_txid
    }

    /// Matches a ping reply; None for unknown sequence numbers (the caller
    /// logs and drops those).
    pub fn settle_ping(&mut self, seq: u64, now: Instant) -> Option<Duration> {
        self.pending_pings
            .remove(&seq)
            .map(|sent_at| now.saturating_duration_since(sent_at))
    }

    /// Matches an RPC reply by its inner transaction id.
    pub fn settle_rpc(&mut self, txid: u64, now: Instant) -> Option<Duration> {
        self.pending_rpcs
            .remove(&txid)
            .map(|sent_at| now.saturating_duration_since(sent_at))
    }

    /// Discards all pending-reply state. Called on disconnect so sequence
    /// numbers from the old connection never match replies on the new one.
    pub fn reset(&mut self) {
        self.pending_pings.clear();
        self.pending_rpcs.clear();
    }

    pub fn pending(&self) -> usize {
        self.pending_pings.len() + self.pending_rpcs.len()
    }
}
