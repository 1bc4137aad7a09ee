use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use medlink_shared::{HealthCheck, HealthResponse};

use crate::store::UserDirectory;
use crate::AppState;

/// Liveness plus a storage round trip.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let storage = match state.store.ping().await {
        Ok(()) => HealthCheck::passed("storage"),
        Err(e) => HealthCheck::failed("storage", e.to_string()),
    };

    let response = HealthResponse::new("medlink-graph", env!("CARGO_PKG_VERSION"), vec![storage]);
    (response.http_status(), Json(response)).into_response()
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}
