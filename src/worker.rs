// Worker-side loop: answer each tagged collection request with a fresh
// local sample, echoing the round token so the coordinator can correlate.

use crate::models::CollectReply;
use crate::registry::CounterRegistry;
use crate::sampler::LocalSampler;
use crate::transport::WorkerMailbox;
use std::sync::Arc;

/// Everything one worker loop needs.
pub struct WorkerDeps {
    pub mailbox: WorkerMailbox,
    pub registry: Arc<CounterRegistry>,
    pub sampler: Arc<LocalSampler>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

pub fn spawn(deps: WorkerDeps) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        mut mailbox,
        registry,
        sampler,
        mut shutdown_rx,
    } = deps;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                request = mailbox.requests.recv() => {
                    let Some(request) = request else {
                        tracing::debug!(pid = %mailbox.pid, "request channel closed");
                        break;
                    };
                    registry.increment_one("monitoring");
                    let reply = CollectReply {
                        pid: mailbox.pid,
                        token: request.token,
                        sample: sampler.sample(&registry, None),
                    };
                    if mailbox.replies.send(reply).await.is_err() {
                        tracing::debug!(pid = %mailbox.pid, "reply channel closed");
                        break;
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!(pid = %mailbox.pid, "worker shutting down");
                    break;
                }
            }
        }
    })
}
