//! Liveness/readiness probes (spec.md §4.I). Liveness is a static reply;
//! readiness checks that the upstream HTTP client has a live generation,
//! since a `NotInitialized` there means bootstrap hasn't finished.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
}

pub async fn live() -> Response {
    axum::Json(HealthBody { status: "ok" }).into_response()
}

pub async fn ready(State(state): State<Arc<AppState>>) -> Response {
    match state.upstream.acquire() {
        Ok(_) => axum::Json(HealthBody { status: "ok" }).into_response(),
        Err(_) => (
            http::StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(HealthBody { status: "not_ready" }),
        )
            .into_response(),
    }
}
