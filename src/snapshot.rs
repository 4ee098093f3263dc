// Coordinator-side store of the latest (and previous) sample per process

use crate::models::{ProcessId, Sample};
use std::collections::BTreeMap;

/// Latest sample plus the one before it, the baseline for delta computation.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub latest: Sample,
    pub previous: Option<Sample>,
}

/// Mapping from process identity to its most recent reported sample.
/// Mutated only by the coordinator, only from the correlator/rate engine.
/// Entries are created on first report, rotated on every subsequent report,
/// and deleted on a worker-termination notice.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    entries: BTreeMap<ProcessId, StoreEntry>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create-or-rotate: the current latest becomes the previous baseline.
    pub fn apply(&mut self, sample: Sample) {
        match self.entries.get_mut(&sample.pid) {
            Some(entry) => {
                entry.previous = Some(std::mem::replace(&mut entry.latest, sample));
            }
            None => {
                self.entries.insert(
                    sample.pid,
                    StoreEntry {
                        latest: sample,
                        previous: None,
                    },
                );
            }
        }
    }

    /// Drops a terminated process's entry, baseline included, so a reused
    /// identity starts from scratch. Returns whether an entry existed.
    pub fn remove(&mut self, pid: ProcessId) -> bool {
        self.entries.remove(&pid).is_some()
    }

    pub fn get(&self, pid: ProcessId) -> Option<&StoreEntry> {
        self.entries.get(&pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProcessId, &StoreEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
