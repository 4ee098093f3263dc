// Process identity, roles, raw samples, and the collection wire messages

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque identity of one coordinator or worker process instance.
/// Unique for the lifetime of that instance; may be reused after a restart.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Functional category of a process, determining which sample fields it reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessRole {
    #[serde(rename = "main")]
    Coordinator,
    #[serde(rename = "db-worker")]
    DbWorker,
    #[serde(rename = "http-worker")]
    HttpWorker,
}

impl ProcessRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessRole::Coordinator => "main",
            ProcessRole::DbWorker => "db-worker",
            ProcessRole::HttpWorker => "http-worker",
        }
    }

    /// Prefix qualifying counter names before cross-process summation, so a
    /// counter incremented in the coordinator is never merged with the same
    /// name incremented in a worker.
    pub fn counter_prefix(&self) -> &'static str {
        match self {
            ProcessRole::Coordinator => "main",
            ProcessRole::DbWorker | ProcessRole::HttpWorker => "worker",
        }
    }
}

impl std::fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time memory figures, all bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub rss: u64,
    pub heap_total: u64,
    pub heap_used: u64,
    pub external: u64,
    pub array_buffers: u64,
}

/// Cumulative CPU time since process start, microseconds.
/// Monotonically non-decreasing until the process restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuUsage {
    pub user_micros: u64,
    pub system_micros: u64,
}

impl CpuUsage {
    pub fn user_seconds(&self) -> f64 {
        self.user_micros as f64 / 1_000_000.0
    }

    pub fn system_seconds(&self) -> f64 {
        self.system_micros as f64 / 1_000_000.0
    }
}

/// Coordinator-only payload: live connection/session statistics.
/// The `messages_*` fields are cumulative and feed the `msg_*` call rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub ws_connections: u64,
    pub registered_users: u64,
    pub active_channels: u64,
    pub messages_sent: u64,
    pub messages_sent_bytes: u64,
    pub messages_received: u64,
    pub messages_received_bytes: u64,
}

/// One process's raw report at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub pid: ProcessId,
    pub role: ProcessRole,
    pub mem: MemoryUsage,
    pub cpu: CpuUsage,
    /// Sampled at the reporting process, milliseconds since the epoch.
    /// CPU percent is derived from this field, not from receive time.
    pub timestamp_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<SessionStats>,
    pub calls: BTreeMap<String, u64>,
}

/// Tag correlating a collection request with its replies.
/// Fresh per round; replies carrying a closed round's token are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundToken(pub u64);

/// Collection request broadcast to every worker
/// (wire: `{command: "GET_MONITORING", roundToken}`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectRequest {
    pub token: RoundToken,
}

/// Worker reply (wire: `{command: "MONITORING", pid, roundToken, sample}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectReply {
    pub pid: ProcessId,
    pub token: RoundToken,
    pub sample: Sample,
}
