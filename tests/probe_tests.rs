// Latency probe correlation and pacing tests

use fleetmon::probe::correlator::{ProbeCorrelator, next_probe_delay};
use tokio::time::{Duration, Instant, advance};

#[test]
fn test_pacing_subtracts_latency_from_interval() {
    assert_eq!(
        next_probe_delay(Duration::from_millis(10_000), Duration::from_millis(3_000)),
        Duration::from_millis(7_000)
    );
}

#[test]
fn test_pacing_floors_at_zero_for_slow_replies() {
    assert_eq!(
        next_probe_delay(Duration::from_millis(10_000), Duration::from_millis(12_000)),
        Duration::ZERO
    );
    assert_eq!(
        next_probe_delay(Duration::from_millis(10_000), Duration::from_millis(10_000)),
        Duration::ZERO
    );
}

#[tokio::test(start_paused = true)]
async fn test_ping_reply_settles_with_measured_latency() {
    let mut correlator = ProbeCorrelator::new();
    let seq = correlator.track_ping(Instant::now());
    advance(Duration::from_millis(25)).await;
    let latency = correlator.settle_ping(seq, Instant::now());
    assert_eq!(latency, Some(Duration::from_millis(25)));
    assert_eq!(correlator.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unmatched_sequence_is_dropped() {
    let mut correlator = ProbeCorrelator::new();
    let seq = correlator.track_ping(Instant::now());
    assert!(correlator.settle_ping(seq + 1, Instant::now()).is_none());
    // The real reply still settles afterwards.
    assert!(correlator.settle_ping(seq, Instant::now()).is_some());
    // A second settle of the same sequence must not match again.
    assert!(correlator.settle_ping(seq, Instant::now()).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_ping_and_rpc_sequence_spaces_are_separate() {
    let mut correlator = ProbeCorrelator::new();
    let seq = correlator.track_ping(Instant::now());
    let txid = correlator.track_rpc(Instant::now());
    assert_eq!(seq, 1);
    assert_eq!(txid, 1);

    advance(Duration::from_millis(10)).await;
    assert!(correlator.settle_rpc(txid, Instant::now()).is_some());
    assert!(correlator.settle_ping(seq, Instant::now()).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_pending_but_sequences_keep_increasing() {
    let mut correlator = ProbeCorrelator::new();
    let old_seq = correlator.track_ping(Instant::now());
    correlator.track_rpc(Instant::now());
    assert_eq!(correlator.pending(), 2);

    correlator.reset();
    assert_eq!(correlator.pending(), 0);
    // A reply from the old connection can no longer match.
    assert!(correlator.settle_ping(old_seq, Instant::now()).is_none());
    // Fresh sequence numbers continue past the old ones.
    assert!(correlator.next_seq() > old_seq);
}
