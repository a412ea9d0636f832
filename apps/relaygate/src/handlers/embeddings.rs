//! `POST /v1/embeddings` (spec.md §4.I). Same entry shape as the chat
//! handler but always unary — no provider ships a streaming embeddings
//! wire format, so there's no forwarder path here.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use relaygate_common::GatewayError;
use relaygate_governance::{AccountInput, RequestInput};
use relaygate_protocol::{CallType, EmbeddingRequest, Usage};
use relaygate_router::RequestContext;

use crate::error_response::ApiError;
use crate::estimate::estimate_tokens;
use crate::handlers::{authenticate, read_body_capped, request_id, Timer};
use crate::observability::PostCallRecord;
use crate::state::AppState;
use crate::upstream::UpstreamBody;

pub async fn embeddings(
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
    let timer = Timer::start();
    let request_id = request_id(&headers);
    let start = time::OffsetDateTime::now_utc();

    let config = state.config.load_full();
    let body = read_body_capped(body, config.max_body_size).await?;
    let req: EmbeddingRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError(GatewayError::invalid_request(format!("invalid request body: {e}"))))?;

    let auth = authenticate(&state, &headers, &cookies).await?;
    let estimated_input_tokens = estimate_embedding_tokens(&req.input);

    let input = RequestInput {
        model: &req.model,
        call_type: CallType::Embedding,
        end_user_id: req.user.as_deref(),
        tags: &[],
        estimated_input_tokens,
    };
    if let Err(err) = state.governance.load().evaluate(&auth, &input).await {
        log(&state, &request_id, &req.model, timer.elapsed_ms(), err.status().as_u16(), Some(&err.message));
        return Err(ApiError(err));
    }

    let ctx = RequestContext {
        model: req.model.clone(),
        tags: Vec::new(),
        tenant_scope: auth.tenant_scope(),
        is_streaming: false,
        estimated_input_tokens,
    };
    let deployment = state.router.pick_with_context(&ctx).map_err(|_| {
        let err = GatewayError::service_unavailable("no healthy deployment for this model");
        log(&state, &request_id, &req.model, timer.elapsed_ms(), err.status().as_u16(), Some(&err.message));
        ApiError(err)
    })?;

    let runtime = state.provider_config_for(&deployment.provider_name).ok_or_else(|| {
        ApiError(GatewayError::internal(format!("no provider config for {}", deployment.provider_name)))
    })?;
    let provider = state
        .registry
        .get(&runtime.kind)
        .ok_or_else(|| ApiError(GatewayError::internal(format!("unknown provider kind {}", runtime.kind))))?;

    if !provider.supports_embedding() {
        let err = GatewayError::invalid_request(format!("{} does not support embeddings", provider.name()));
        log(&state, &request_id, &req.model, timer.elapsed_ms(), err.status().as_u16(), Some(&err.message));
        return Err(ApiError(err));
    }

    let result: Result<Response, GatewayError> = async {
        let upstream_req = provider
            .build_embedding_request(&req, &runtime.api_key, &runtime.base_url)
            .map_err(|e| GatewayError::internal(format!("failed building upstream request: {e}")))?;
        let guard = state
            .upstream
            .acquire()
            .map_err(|_| GatewayError::service_unavailable("upstream client not initialized"))?;
        let resp = guard.send(&upstream_req).await?;

        let status = http::StatusCode::from_u16(resp.status).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
        let body = match resp.body {
            UpstreamBody::Bytes(bytes) => bytes,
            UpstreamBody::Stream(_) => {
                return Err(GatewayError::internal("provider returned a stream for an embeddings call"));
            }
        };
        if !status.is_success() {
            return Err(provider.map_error(status, &body));
        }
        let value = provider
            .parse_embedding_response(&body)
            .map_err(|e| GatewayError::internal(format!("failed parsing upstream response: {e}")))?;

        state.router.report_success(&deployment.id, timer.elapsed());
        Ok(Response::builder()
            .status(200)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&value).unwrap_or_default()))
            .expect("static response parts are always valid"))
    }
    .await;

    match result {
        Ok(response) => {
            state
                .governance
                .load()
                .account(
                    &auth,
                    AccountInput {
                        request_id: request_id.clone(),
                        model: req.model.clone(),
                        call_type: CallType::Embedding,
                        end_user_id: req.user.clone(),
                        tags: Vec::new(),
                        usage: Usage::default(),
                        start,
                        latency_ms: timer.elapsed_ms(),
                        status: 200,
                    },
                )
                .await;
            log(&state, &request_id, &req.model, timer.elapsed_ms(), 200, None);
            Ok(response)
        }
        Err(err) => {
            state.router.report_failure(&deployment.id);
            log(&state, &request_id, &req.model, timer.elapsed_ms(), err.status().as_u16(), Some(&err.message));
            Err(ApiError(err))
        }
    }
}

/// `input` may be a plain string, an array of strings, or pre-tokenized
/// integer arrays (spec.md §6); token ids count directly, text falls back
/// to the same heuristic used for chat prompts.
fn estimate_embedding_tokens(input: &serde_json::Value) -> u32 {
    use serde_json::Value;
    let tokens = match input {
        Value::String(s) => estimate_tokens(s),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => estimate_tokens(s),
                Value::Number(_) => 1,
                Value::Array(tokens) => tokens.len() as u64,
                other => estimate_tokens(&other.to_string()),
            })
            .sum(),
        other => estimate_tokens(&other.to_string()),
    };
    tokens.min(u32::MAX as u64) as u32
}

fn log(state: &AppState, request_id: &str, model: &str, latency_ms: u64, status: u16, error: Option<&str>) {
    state.observability.log_post(&PostCallRecord {
        request_id,
        operation: "embeddings",
        model,
        status,
        latency_ms,
        is_stream: false,
        prompt_tokens: 0,
        completion_tokens: 0,
        error,
    });
}
