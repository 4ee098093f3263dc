// Prometheus exposition of the aggregated view

use crate::models::{AggregatedView, ProcessRole};
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("metrics encoding failed: {0}")]
    Encode(#[from] prometheus::Error),
    #[error("metrics text was not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("call gauge table lock poisoned")]
    Poisoned,
}

/// Renders aggregated views in the scraper's text exposition format.
/// Per-process gauges are labeled by pid and role; call rates get one
/// dynamically registered gauge per counter name.
pub struct Exporter {
    registry: Registry,

    rss: GaugeVec,
    heap_total: GaugeVec,
    heap_used: GaugeVec,
    external: GaugeVec,
    array_buffers: GaugeVec,

    cpu_user: GaugeVec,
    cpu_system: GaugeVec,
    cpu_total: GaugeVec,
    cpu_percent: GaugeVec,

    ws_connections: Gauge,
    registered_users: Gauge,
    active_channels: Gauge,

    call_gauges: Mutex<HashMap<String, Gauge>>,
}

impl Exporter {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let labels = &["pid", "role"];

        let labeled = |name: &str, help: &str| GaugeVec::new(Opts::new(name, help), labels);

        let rss = labeled(
            "memory_rss",
            "The amount of space occupied in the main memory device for the process.",
        )?;
        let heap_total = labeled("memory_heap_total", "Total heap memory.")?;
        let heap_used = labeled("memory_heap_used", "Used heap memory.")?;
        let external = labeled(
            "memory_external",
            "Memory mapped by the allocator beyond the resident heap.",
        )?;
        let array_buffers = labeled(
            "memory_array_buffers",
            "Memory allocated for raw transfer buffers.",
        )?;
        let cpu_user = labeled(
            "process_cpu_user_seconds_total",
            "User CPU time spent in seconds during the configured interval.",
        )?;
        let cpu_system = labeled(
            "process_cpu_system_seconds_total",
            "System CPU time spent in seconds during the configured interval.",
        )?;
        let cpu_total = labeled(
            "process_cpu_seconds_total",
            "User and system CPU time spent in seconds during the configured interval.",
        )?;
        let cpu_percent = labeled(
            "process_cpu_percent",
            "User and system CPU time spent divided by the interval duration.",
        )?;

        let ws_connections = Gauge::with_opts(Opts::new(
            "active_websockets",
            "Number of active websocket connections",
        ))?;
        let registered_users = Gauge::with_opts(Opts::new(
            "active_registered_users",
            "Number of registered users online",
        ))?;
        let active_channels = Gauge::with_opts(Opts::new(
            "active_channels",
            "Number of active channels",
        ))?;

        for vec in [
            &rss,
            &heap_total,
            &heap_used,
            &external,
            &array_buffers,
            &cpu_user,
            &cpu_system,
            &cpu_total,
            &cpu_percent,
        ] {
            registry.register(Box::new(vec.clone()))?;
        }
        registry.register(Box::new(ws_connections.clone()))?;
        registry.register(Box::new(registered_users.clone()))?;
        registry.register(Box::new(active_channels.clone()))?;

        Ok(Self {
            registry,
            rss,
            heap_total,
            heap_used,
            external,
            array_buffers,
            cpu_user,
            cpu_system,
            cpu_total,
            cpu_percent,
            ws_connections,
            registered_users,
            active_channels,
            call_gauges: Mutex::new(HashMap::new()),
        })
    }

    /// Content type for the exposition text.
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Updates every gauge from the view and encodes the registry.
    pub fn render(&self, view: &AggregatedView) -> Result<String, ExportError> {
        // Label sets from processes removed since the last scrape must not
        // linger in the output.
        for vec in [
            &self.rss,
            &self.heap_total,
            &self.heap_used,
            &self.external,
            &self.array_buffers,
            &self.cpu_user,
            &self.cpu_system,
            &self.cpu_total,
            &self.cpu_percent,
        ] {
            vec.reset();
        }

        for (pid, metrics) in &view.processes {
            let pid = pid.to_string();
            let labels = &[pid.as_str(), metrics.role.as_str()];
            self.rss.with_label_values(labels).set(metrics.mem.rss as f64);
            self.heap_total
                .with_label_values(labels)
                .set(metrics.mem.heap_total as f64);
            self.heap_used
                .with_label_values(labels)
                .set(metrics.mem.heap_used as f64);
            self.external
                .with_label_values(labels)
                .set(metrics.mem.external as f64);
            self.array_buffers
                .with_label_values(labels)
                .set(metrics.mem.array_buffers as f64);

            self.cpu_user.with_label_values(labels).set(metrics.cpu.user_secs);
            self.cpu_system
                .with_label_values(labels)
                .set(metrics.cpu.system_secs);
            self.cpu_total
                .with_label_values(labels)
                .set(metrics.cpu.total_secs);
            self.cpu_percent
                .with_label_values(labels)
                .set(metrics.cpu.percent);

            if metrics.role == ProcessRole::Coordinator
                && let Some(sessions) = &metrics.sessions
            {
                self.ws_connections.set(sessions.ws_connections as f64);
                self.registered_users.set(sessions.registered_users as f64);
                self.active_channels.set(sessions.active_channels as f64);
            }
        }

        {
            let mut gauges = self
                .call_gauges
                .lock()
                .map_err(|_| ExportError::Poisoned)?;
            for (name, rate) in &view.call_rates {
                match gauges.get(name) {
                    Some(gauge) => gauge.set(*rate),
                    None => {
                        let gauge = Gauge::with_opts(Opts::new(name.clone(), name.clone()))?;
                        self.registry.register(Box::new(gauge.clone()))?;
                        gauge.set(*rate);
                        gauges.insert(name.clone(), gauge);
                    }
                }
            }
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
