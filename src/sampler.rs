// Local per-process sampling: RSS via sysinfo, cumulative CPU from
// /proc/self/stat, heap figures from jemalloc stats.

use crate::models::{CpuUsage, MemoryUsage, ProcessId, ProcessRole, Sample, SessionStats};
use crate::registry::CounterRegistry;
use std::sync::Mutex;
use sysinfo::{ProcessesToUpdate, System};

/// Linux USER_HZ; utime/stime in /proc/[pid]/stat are reported in these ticks.
#[cfg(target_os = "linux")]
const CLOCK_TICKS_PER_SEC: u64 = 100;

/// Milliseconds since the epoch, the timestamp carried inside every sample.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}

/// Produces this process's point-in-time sample. One sampler per process
/// role; the demo fleet gives each in-process worker its own identity.
pub struct LocalSampler {
    pid: ProcessId,
    role: ProcessRole,
    sys: Mutex<System>,
    os_pid: sysinfo::Pid,
}

impl LocalSampler {
    pub fn new(pid: ProcessId, role: ProcessRole) -> Self {
        Self {
            pid,
            role,
            sys: Mutex::new(System::new()),
            os_pid: sysinfo::Pid::from_u32(std::process::id()),
        }
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn role(&self) -> ProcessRole {
        self.role
    }

    /// Point-in-time sample: memory figures, cumulative CPU, counter
    /// snapshot, and (coordinator only) session statistics.
    pub fn sample(&self, registry: &CounterRegistry, sessions: Option<SessionStats>) -> Sample {
        Sample {
            pid: self.pid,
            role: self.role,
            mem: self.memory_usage(),
            cpu: read_cpu_usage(),
            timestamp_ms: now_ms(),
            sessions,
            calls: registry.snapshot(),
        }
    }

    fn memory_usage(&self) -> MemoryUsage {
        let rss = {
            let mut sys = match self.sys.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            sys.refresh_processes(ProcessesToUpdate::Some(&[self.os_pid]), true);
            sys.process(self.os_pid).map(|p| p.memory()).unwrap_or(0)
        };

        let (heap_used, heap_total, mapped) = jemalloc_stats().unwrap_or((0, 0, 0));
        MemoryUsage {
            rss,
            heap_total,
            heap_used,
            external: mapped.saturating_sub(heap_total),
            array_buffers: 0,
        }
    }
}

/// Cumulative user/system CPU time of this process, microseconds.
fn read_cpu_usage() -> CpuUsage {
    #[cfg(target_os = "linux")]
    {
        if let Ok(content) = std::fs::read_to_string("/proc/self/stat")
            && let Some((utime_ticks, stime_ticks)) = parse_stat_cpu(&content)
        {
            let to_micros = |ticks: u64| ticks.saturating_mul(1_000_000 / CLOCK_TICKS_PER_SEC);
            return CpuUsage {
                user_micros: to_micros(utime_ticks),
                system_micros: to_micros(stime_ticks),
            };
        }
        tracing::warn!(operation = "read_cpu_usage", "failed to read /proc/self/stat");
    }
    CpuUsage::default()
}

/// Parses utime/stime (clock ticks) out of /proc/[pid]/stat content.
/// The comm field can contain spaces and parentheses, so fields are counted
/// from the last ')': utime and stime are fields 11 and 12 after it.
#[cfg(any(target_os = "linux", test))]
fn parse_stat_cpu(content: &str) -> Option<(u64, u64)> {
    let close_paren = content.rfind(')')?;
    let fields: Vec<&str> = content[close_paren + 1..].split_whitespace().collect();
    let utime = fields.get(11)?.parse().ok()?;
    let stime = fields.get(12)?.parse().ok()?;
    Some((utime, stime))
}

/// jemalloc (allocated, resident, mapped) in bytes.
/// `stats.allocated` maps to heap-used, `stats.resident` to heap-total;
/// mapped-beyond-resident is reported as external memory.
fn jemalloc_stats() -> Option<(u64, u64, u64)> {
    use std::os::raw::c_void;

    unsafe fn read_usize(name: &std::ffi::CStr) -> Option<usize> {
        let mut value: usize = 0;
        let mut len = std::mem::size_of::<usize>();
        let rc = unsafe {
            tikv_jemalloc_sys::mallctl(
                name.as_ptr(),
                (&raw mut value).cast::<c_void>(),
                &mut len,
                std::ptr::null_mut(),
                0,
            )
        };
        (rc == 0).then_some(value)
    }

    unsafe {
        // The stats epoch must be advanced for reads to reflect current state.
        let mut epoch: u64 = 1;
        let rc = tikv_jemalloc_sys::mallctl(
            c"epoch".as_ptr(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            (&raw mut epoch).cast::<c_void>(),
            std::mem::size_of::<u64>(),
        );
        if rc != 0 {
            return None;
        }
        let allocated = read_usize(c"stats.allocated")? as u64;
        let resident = read_usize(c"stats.resident")? as u64;
        let mapped = read_usize(c"stats.mapped")? as u64;
        Some((allocated, resident, mapped))
    }
}
