use anyhow::Result;
use fleetmon::*;
use std::sync::Arc;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

use models::{ProcessId, ProcessRole};

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Synthetic identities for the in-process demo fleet; a real supervisor
/// would hand out OS pids instead.
const WORKER_PID_BASE: u32 = 1000;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let (transport, reply_rx) = transport::ChannelTransport::new(64);
    let transport = Arc::new(transport);

    // In-process demo fleet. Each worker gets its own identity, registry,
    // and sampler; a supervisor owning real worker processes would wire the
    // same mailboxes over its own transport.
    let mut worker_handles = Vec::new();
    let mut shutdown_txs = Vec::new();
    let roles = std::iter::repeat_n(ProcessRole::DbWorker, app_config.fleet.db_workers)
        .chain(std::iter::repeat_n(
            ProcessRole::HttpWorker,
            app_config.fleet.http_workers,
        ));
    for (i, role) in roles.enumerate() {
        let pid = ProcessId(WORKER_PID_BASE + i as u32);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        shutdown_txs.push(shutdown_tx);
        worker_handles.push(worker::spawn(worker::WorkerDeps {
            mailbox: transport.register(pid),
            registry: Arc::new(registry::CounterRegistry::new()),
            sampler: Arc::new(sampler::LocalSampler::new(pid, role)),
            shutdown_rx,
        }));
        tracing::info!(pid = %pid, role = %role, "worker started");
    }

    let coordinator_pid = ProcessId(std::process::id());
    let coordinator_registry = Arc::new(registry::CounterRegistry::new());
    let sessions = Arc::new(registry::SessionCounters::new());
    let coordinator = correlator::Coordinator::new(
        correlator::Correlator::new(
            transport.clone(),
            reply_rx,
            Duration::from_millis(app_config.fleet.collect_timeout_ms),
        ),
        Arc::new(sampler::LocalSampler::new(
            coordinator_pid,
            ProcessRole::Coordinator,
        )),
        coordinator_registry.clone(),
        sessions,
    );
    let gate = Arc::new(gate::CacheGate::new(
        coordinator,
        Duration::from_millis(app_config.fleet.cache_interval_ms),
    ));

    let (refresh_shutdown_tx, refresh_shutdown_rx) = tokio::sync::oneshot::channel();
    let refresh_handle = gate::spawn_refresh(
        gate.clone(),
        Duration::from_secs(app_config.fleet.refresh_interval_secs),
        refresh_shutdown_rx,
    );
    shutdown_txs.push(refresh_shutdown_tx);

    if app_config.probe.enabled {
        let probe_metrics = Arc::new(probe::ProbeMetrics::new()?);
        let probe_addr = format!(
            "{}:{}",
            app_config.probe.http_host, app_config.probe.http_port
        );
        let probe_listener = tokio::net::TcpListener::bind(&probe_addr).await?;
        tracing::info!("Probe metrics at http://{}/wsmetrics", probe_addr);
        let probe_app = probe::app(probe_metrics.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(probe_listener, probe_app).await {
                tracing::error!(error = %e, "probe metrics server failed");
            }
        });

        let (probe_shutdown_tx, probe_shutdown_rx) = tokio::sync::oneshot::channel();
        probe::spawn(
            app_config.probe.endpoint.clone(),
            app_config.probe.channel.clone(),
            Duration::from_millis(app_config.probe.ping_interval_ms),
            Duration::from_millis(app_config.probe.reconnect_backoff_ms),
            probe_metrics,
            probe_shutdown_rx,
        );
        shutdown_txs.push(probe_shutdown_tx);
    }

    let exporter = Arc::new(exporter::Exporter::new()?);
    let app = routes::app(gate, exporter, coordinator_registry);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal");
            for tx in shutdown_txs {
                let _ = tx.send(());
            }
            for handle in worker_handles {
                let _ = handle.await;
            }
            let _ = refresh_handle.await;
        }
    }

    Ok(())
}
