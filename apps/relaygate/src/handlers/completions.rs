//! `POST /v1/completions` (spec.md §4.I, §6). The legacy prompt-based body
//! is shimmed into a `ChatRequest` with a single user message and handed to
//! the same pipeline `/v1/chat/completions` uses.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use relaygate_common::GatewayError;
use relaygate_protocol::CompletionRequest;

use crate::error_response::ApiError;
use crate::handlers::read_body_capped;
use crate::state::AppState;

pub async fn completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    cookies: CookieJar,
    body: Body,
) -> Response {
    match handle(state, headers, cookies, body).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handle(
    state: Arc<AppState>,
    headers: HeaderMap,
    cookies: CookieJar,
    body: Body,
) -> Result<Response, ApiError> {
    let config = state.config.load_full();
    let body = read_body_capped(body, config.max_body_size).await?;
    let req: CompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError(GatewayError::invalid_request(format!("invalid request body: {e}"))))?;

    super::chat::complete(state, headers, cookies, req.into_chat_request()).await
}
