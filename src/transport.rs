// Broadcast/reply transport boundary between the coordinator and workers.
// Process supervision owns delivery; the coordinator only needs "broadcast
// to all workers" and a single stream of replies. Delivery is at-most-once
// per attempt: a full or closed mailbox drops the request and the worker
// simply times out for that round.

use crate::models::{CollectReply, CollectRequest, ProcessId};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Per-worker request mailbox capacity. Rounds are serialized by the cache
/// gate, so anything above one request in flight means the worker is stuck.
const REQUEST_CAPACITY: usize = 4;

pub trait Transport: Send + Sync {
    /// Sends a tagged collection request to every known worker.
    fn broadcast(&self, request: CollectRequest);

    /// Identities of the currently registered workers.
    fn workers(&self) -> Vec<ProcessId>;
}

/// A worker's end of the transport: its request stream and the shared
/// reply sender back to the coordinator.
pub struct WorkerMailbox {
    pub pid: ProcessId,
    pub requests: mpsc::Receiver<CollectRequest>,
    pub replies: mpsc::Sender<CollectReply>,
}

/// In-process transport over tokio channels, also used by the tests.
pub struct ChannelTransport {
    workers: Mutex<BTreeMap<ProcessId, mpsc::Sender<CollectRequest>>>,
    reply_tx: mpsc::Sender<CollectReply>,
}

impl ChannelTransport {
    /// Returns the transport and the reply stream the correlator consumes.
    pub fn new(reply_capacity: usize) -> (Self, mpsc::Receiver<CollectReply>) {
        let (reply_tx, reply_rx) = mpsc::channel(reply_capacity);
        (
            Self {
                workers: Mutex::new(BTreeMap::new()),
                reply_tx,
            },
            reply_rx,
        )
    }

    /// Registers a worker identity and hands out its mailbox.
    /// Re-registering an identity replaces the previous mailbox (restart).
    pub fn register(&self, pid: ProcessId) -> WorkerMailbox {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CAPACITY);
        self.lock_workers().insert(pid, request_tx);
        WorkerMailbox {
            pid,
            requests: request_rx,
            replies: self.reply_tx.clone(),
        }
    }

    /// Drops a worker from the broadcast set (termination notice).
    pub fn remove(&self, pid: ProcessId) {
        self.lock_workers().remove(&pid);
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, BTreeMap<ProcessId, mpsc::Sender<CollectRequest>>> {
        match self.workers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Transport for ChannelTransport {
    fn broadcast(&self, request: CollectRequest) {
        for (pid, tx) in self.lock_workers().iter() {
            if let Err(e) = tx.try_send(request) {
                tracing::debug!(pid = %pid, error = %e, "collection request dropped");
            }
        }
    }

    fn workers(&self) -> Vec<ProcessId> {
        self.lock_workers().keys().copied().collect()
    }
}
