// Process-local counter registry and coordinator session counters

use crate::models::SessionStats;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing named counters, local to one process.
/// Counters are cumulative for the lifetime of the process and are converted
/// to rates only at read time, on the coordinator.
#[derive(Debug, Default)]
pub struct CounterRegistry {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl CounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `max(amount, 0)` to the named counter. Negative amounts are
    /// clamped to zero; there is no decrementing.
    pub fn increment(&self, name: &str, amount: i64) {
        let amount = amount.max(0) as u64;
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match counters.get_mut(name) {
            Some(value) => *value = value.saturating_add(amount),
            None => {
                counters.insert(name.to_string(), amount);
            }
        }
    }

    pub fn increment_one(&self, name: &str) {
        self.increment(name, 1);
    }

    /// Current cumulative mapping. Never resets the counters.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        match self.counters.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Live connection/session figures reported only by the coordinator.
/// Gauge-like fields are set; `messages_*` fields accumulate.
#[derive(Debug, Default)]
pub struct SessionCounters {
    ws_connections: AtomicU64,
    registered_users: AtomicU64,
    active_channels: AtomicU64,
    messages_sent: AtomicU64,
    messages_sent_bytes: AtomicU64,
    messages_received: AtomicU64,
    messages_received_bytes: AtomicU64,
}

impl SessionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ws_connections(&self, n: u64) {
        self.ws_connections.store(n, Ordering::Relaxed);
    }

    pub fn set_registered_users(&self, n: u64) {
        self.registered_users.store(n, Ordering::Relaxed);
    }

    pub fn set_active_channels(&self, n: u64) {
        self.active_channels.store(n, Ordering::Relaxed);
    }

    pub fn record_sent(&self, messages: u64, bytes: u64) {
        self.messages_sent.fetch_add(messages, Ordering::Relaxed);
        self.messages_sent_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_received(&self, messages: u64, bytes: u64) {
        self.messages_received.fetch_add(messages, Ordering::Relaxed);
        self.messages_received_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn current(&self) -> SessionStats {
        SessionStats {
            ws_connections: self.ws_connections.load(Ordering::Relaxed),
            registered_users: self.registered_users.load(Ordering::Relaxed),
            active_channels: self.active_channels.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_sent_bytes: self.messages_sent_bytes.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_received_bytes: self.messages_received_bytes.load(Ordering::Relaxed),
        }
    }
}
