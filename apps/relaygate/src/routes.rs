//! Route table (spec.md §4.I). Grounded on the teacher's `proxy_router`:
//! one `Router::new()` wired up with `.route(...)` per endpoint and
//! `.with_state(state)` once at the end; CORS/tracing layers come from the
//! broader pack (gproxy has no public CORS surface to imitate since it is
//! loopback-only) rather than the teacher.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{chat, completions, embeddings, health, models, oidc, responses};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/completions", post(completions::completions))
        .route("/v1/embeddings", post(embeddings::embeddings))
        .route("/v1/responses", post(responses::responses))
        .route("/v1/models", get(models::list_models))
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/oidc/login", get(oidc::login))
        .route("/oidc/callback", get(oidc::callback))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
