// Domain models shared by the coordinator and workers

mod sample;
mod view;

pub use sample::{
    CollectReply, CollectRequest, CpuUsage, MemoryUsage, ProcessId, ProcessRole, RoundToken,
    Sample, SessionStats,
};
pub use view::{AggregatedView, CpuDerived, ProcessMetrics};
