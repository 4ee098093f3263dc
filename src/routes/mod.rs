// Coordinator HTTP routes

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::exporter::Exporter;
use crate::gate::CacheGate;
use crate::registry::CounterRegistry;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) gate: Arc<CacheGate>,
    pub(crate) exporter: Arc<Exporter>,
    pub(crate) registry: Arc<CounterRegistry>,
}

pub fn app(
    gate: Arc<CacheGate>,
    exporter: Arc<Exporter>,
    registry: Arc<CounterRegistry>,
) -> Router {
    let state = AppState {
        gate,
        exporter,
        registry,
    };
    Router::new()
        .route("/", get(|| async { "fleetmon coordinator" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/metrics", get(http::metrics_handler)) // GET /metrics
        .route("/metrics/cached", get(http::metrics_cached_handler)) // GET /metrics/cached
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
