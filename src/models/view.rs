// The aggregated, exporter-facing view built once per collection round

use serde::Serialize;
use std::collections::BTreeMap;

use super::{MemoryUsage, ProcessId, ProcessRole, SessionStats};

/// Per-process CPU figures derived from consecutive samples.
/// Deltas are seconds since the previous round; `percent` is the delta total
/// divided by the elapsed time between the two samples' own timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuDerived {
    pub user_secs: f64,
    pub system_secs: f64,
    pub total_secs: f64,
    pub percent: f64,
}

/// One process's entry in the aggregated view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMetrics {
    pub role: ProcessRole,
    pub mem: MemoryUsage,
    pub cpu: CpuDerived,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<SessionStats>,
}

/// Coordinator's exported result: per-process metrics plus the global
/// per-second rate for every role-qualified counter name.
/// Rebuilt only by the rate engine; read-only to the exporter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedView {
    pub processes: BTreeMap<ProcessId, ProcessMetrics>,
    pub call_rates: BTreeMap<String, f64>,
}
