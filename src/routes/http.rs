// GET handlers: metrics scrape (gated + cached-only) and version

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::models::AggregatedView;
use crate::version::{NAME, VERSION};

/// GET /version — returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /metrics — gate-mediated aggregation, then exposition text.
/// The gate serves its cache inside the debounce interval, so scrape bursts
/// cost one collection round.
pub(super) async fn metrics_handler(State(state): State<AppState>) -> Response {
    state.registry.increment_one("metrics_endpoint");
    let view = state.gate.get().await;
    render(&state, &view)
}

/// GET /metrics/cached — last computed view, however stale, without forcing
/// a round. 500 with an empty body before the first completed round.
pub(super) async fn metrics_cached_handler(State(state): State<AppState>) -> Response {
    state.registry.increment_one("metrics_endpoint_cached");
    match state.gate.cached().await {
        Some(view) => render(&state, &view),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn render(state: &AppState, view: &AggregatedView) -> Response {
    match state.exporter.render(view) {
        Ok(body) => (
            [(header::CONTENT_TYPE, state.exporter.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, operation = "render_metrics", "exposition failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
