//! HTTP handlers. Grounded on the teacher's `handler::proxy_handler`: one
//! function per route, a trace id minted once, structured `downstream_*`
//! logging around the dispatch, explicit response construction.

pub mod chat;
pub mod completions;
pub mod embeddings;
pub mod health;
pub mod models;
pub mod oidc;
pub mod responses;

use std::time::{Duration, Instant};

use axum::body::Body;
use axum_extra::extract::CookieJar;
use http::HeaderMap;
use relaygate_common::{ensure_request_id, GatewayError};
use relaygate_governance::AuthContext;

use crate::auth::resolve_auth_context;
use crate::error_response::ApiError;
use crate::state::AppState;

pub async fn authenticate(state: &AppState, headers: &HeaderMap, cookies: &CookieJar) -> Result<AuthContext, ApiError> {
    resolve_auth_context(headers, cookies, state.store.as_ref(), &state.session_codec)
        .await
        .map_err(ApiError::from)
}

pub fn request_id(headers: &HeaderMap) -> String {
    ensure_request_id(headers, None)
}

pub async fn read_body_capped(body: Body, max_body_size: usize) -> Result<bytes::Bytes, ApiError> {
    axum::body::to_bytes(body, max_body_size)
        .await
        .map_err(|e| ApiError(GatewayError::invalid_request(format!("request body too large or unreadable: {e}"))))
}

pub struct Timer(Instant);

impl Timer {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.0.elapsed().as_millis() as u64
    }

    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}
