//! `POST /v1/chat/completions` (spec.md §4.I). Grounded on the teacher's
//! `proxy_handler`: mint a request id, authenticate, dispatch, log once on
//! the way out. Unary calls run through the bounded tool-call loop only
//! when an MCP tool manager is installed (`AppState::tool_executor`);
//! otherwise the provider is called once and its `tool_calls` pass
//! straight through for the caller to execute itself. Streaming calls
//! hand the upstream byte stream straight to the forwarder and account
//! once it finishes.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use bytes::Bytes;
use relaygate_common::GatewayError;
use relaygate_forward::{cancel_pair, forward, BufferPool, DownstreamWriter, STANDARD_STREAM_HEADERS};
use relaygate_governance::{AccountInput, AuthContext, RequestInput};
use relaygate_protocol::{
    resolved_include_usage, CallType, ChatMessage, ChatRequest, ChatResponse, StreamOptions, Usage,
};
use relaygate_providers::Provider;
use relaygate_router::RequestContext;

use crate::error_response::ApiError;
use crate::estimate::estimate_tokens;
use crate::handlers::{authenticate, read_body_capped, request_id, Timer};
use crate::mcp::run_tool_loop;
use crate::observability::PostCallRecord;
use crate::state::{AppState, ProviderRuntimeConfig};
use crate::upstream::{UpstreamBody, UpstreamResponse};

pub async fn chat_completions(
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
    let req: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError(GatewayError::invalid_request(format!("invalid request body: {e}"))))?;
    complete(state, headers, cookies, req).await
}

/// Runs the shared chat pipeline against an already-decoded request; the
/// `/v1/completions` shim reuses this after translating its legacy body
/// into a `ChatRequest` (spec.md §4.I, §6).
pub(crate) async fn complete(
    state: Arc<AppState>,
    headers: HeaderMap,
    cookies: CookieJar,
    mut req: ChatRequest,
) -> Result<Response, ApiError> {
    let timer = Timer::start();
    let request_id = request_id(&headers);
    let start = time::OffsetDateTime::now_utc();

    let auth = authenticate(&state, &headers, &cookies).await?;

    let tags = req.tags.clone().unwrap_or_default();
    let estimated_input_tokens = estimate_prompt_tokens(&req);
    if let Err(err) = evaluate(&state, &auth, &req, &tags, estimated_input_tokens).await {
        observe_error(&state, &request_id, &req.model, req.stream, timer.elapsed_ms(), &err);
        return Err(ApiError(err));
    }

    // Never silently flip a caller's explicit `include_usage: false`
    // (spec.md §4.I.7), but do ask upstream for usage whenever the caller
    // didn't say otherwise — this is how the fallback estimator gets real
    // numbers most of the time instead of running on every response.
    if req.stream {
        let include_usage = resolved_include_usage(&req.stream_options);
        req.stream_options = Some(StreamOptions {
            include_usage: Some(include_usage),
        });
    }

    let (provider, runtime, deployment_id) = match pick_provider(&state, &req, &tags, &auth, estimated_input_tokens) {
        Ok(picked) => picked,
        Err(err) => {
            observe_error(&state, &request_id, &req.model, req.stream, timer.elapsed_ms(), &err);
            return Err(ApiError(err));
        }
    };

    let result = if req.stream {
        run_streaming(&state, &req, &provider, &runtime, &deployment_id, &request_id, &auth, &tags, timer, start).await
    } else {
        run_unary(&state, &req, &provider, &runtime, &deployment_id, &request_id, &auth, &tags, timer, start).await
    };

    match result {
        Ok(response) => Ok(response),
        Err(err) => {
            state.router.report_failure(&deployment_id);
            observe_error(&state, &request_id, &req.model, req.stream, timer.elapsed_ms(), &err);
            Err(ApiError(err))
        }
    }
}

async fn evaluate(
    state: &AppState,
    auth: &AuthContext,
    req: &ChatRequest,
    tags: &[String],
    estimated_input_tokens: u32,
) -> Result<(), GatewayError> {
    let input = RequestInput {
        model: &req.model,
        call_type: CallType::Chat,
        end_user_id: req.user.as_deref(),
        tags,
        estimated_input_tokens,
    };
    state.governance.load().evaluate(auth, &input).await
}

fn pick_provider(
    state: &AppState,
    req: &ChatRequest,
    tags: &[String],
    auth: &AuthContext,
    estimated_input_tokens: u32,
) -> Result<(Arc<dyn Provider>, ProviderRuntimeConfig, String), GatewayError> {
    let ctx = RequestContext {
        model: req.model.clone(),
        tags: tags.to_vec(),
        tenant_scope: auth.tenant_scope(),
        is_streaming: req.stream,
        estimated_input_tokens,
    };
    let deployment = state
        .router
        .pick_with_context(&ctx)
        .map_err(|_| GatewayError::service_unavailable("no healthy deployment for this model"))?;

    let runtime = state
        .provider_config_for(&deployment.provider_name)
        .ok_or_else(|| GatewayError::internal(format!("no provider config for {}", deployment.provider_name)))?;

    let provider = state
        .registry
        .get(&runtime.kind)
        .ok_or_else(|| GatewayError::internal(format!("unknown provider kind {}", runtime.kind)))?;

    Ok((provider, runtime, deployment.id.clone()))
}

#[allow(clippy::too_many_arguments)]
async fn run_unary(
    state: &Arc<AppState>,
    req: &ChatRequest,
    provider: &Arc<dyn Provider>,
    runtime: &ProviderRuntimeConfig,
    deployment_id: &str,
    request_id: &str,
    auth: &AuthContext,
    tags: &[String],
    timer: Timer,
    start: time::OffsetDateTime,
) -> Result<Response, GatewayError> {
    // Only go through the bounded tool-call loop when an MCP tool manager is
    // actually installed (spec.md §4.I point 9); otherwise a standard
    // request carrying `tools=[...]` for client-side execution must get its
    // raw `tool_calls` straight back, not intercepted and looped through a
    // stand-in executor.
    let response = match &state.tool_executor {
        Some(executor) => {
            let executor = Arc::clone(executor);
            let provider = Arc::clone(provider);
            let runtime = runtime.clone();
            let state_for_loop = Arc::clone(state);

            run_tool_loop(req.messages.clone(), executor.as_ref(), move |messages| {
                let provider = Arc::clone(&provider);
                let runtime = runtime.clone();
                let state = Arc::clone(&state_for_loop);
                let mut turn_req = req.clone();
                turn_req.messages = messages;
                async move { call_provider_once(&state, &provider, &runtime, &turn_req).await }
            })
            .await?
        }
        None => call_provider_once(state, provider, runtime, req).await?,
    };

    state.router.report_success(deployment_id, timer.elapsed());

    let mut usage = response.usage.unwrap_or_default();
    if usage.is_zero() {
        usage = estimate_usage(req, &response);
    }

    account(state, request_id, auth, &req.model, CallType::Chat, tags, req.user.as_deref(), usage, start, timer.elapsed_ms(), 200).await;

    observe_ok(state, request_id, &req.model, false, timer.elapsed_ms(), usage);

    let mut response = response;
    response.usage = Some(usage);
    let body = serde_json::to_vec(&response).map_err(|e| GatewayError::internal(format!("response encode failed: {e}")))?;
    Ok(Response::builder()
        .status(200)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .expect("static response parts are always valid"))
}

async fn call_provider_once(
    state: &AppState,
    provider: &Arc<dyn Provider>,
    runtime: &ProviderRuntimeConfig,
    req: &ChatRequest,
) -> Result<ChatResponse, GatewayError> {
    let upstream_req = provider
        .build_request(req, &runtime.api_key, &runtime.base_url)
        .map_err(|e| GatewayError::internal(format!("failed building upstream request: {e}")))?;

    let guard = state
        .upstream
        .acquire()
        .map_err(|_| GatewayError::service_unavailable("upstream client not initialized"))?;
    let resp = guard.send(&upstream_req).await?;
    into_chat_response(provider, resp)
}

fn into_chat_response(provider: &Arc<dyn Provider>, resp: UpstreamResponse) -> Result<ChatResponse, GatewayError> {
    let status = http::StatusCode::from_u16(resp.status).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
    let body = match resp.body {
        UpstreamBody::Bytes(bytes) => bytes,
        UpstreamBody::Stream(_) => {
            return Err(GatewayError::internal("provider returned a stream for a unary call"));
        }
    };
    if !status.is_success() {
        return Err(provider.map_error(status, &body));
    }
    provider
        .parse_response(&body)
        .map_err(|e| GatewayError::internal(format!("failed parsing upstream response: {e}")))
}

fn estimate_usage(req: &ChatRequest, response: &ChatResponse) -> Usage {
    let prompt_text: String = req
        .messages
        .iter()
        .filter_map(message_text)
        .collect::<Vec<_>>()
        .join("\n");
    let completion_text: String = response
        .choices
        .iter()
        .filter_map(|choice| message_text(&choice.message))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt_tokens = estimate_tokens(&prompt_text);
    let completion_tokens = estimate_tokens(&completion_text);
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
        cost: None,
    }
}

/// Rough input-token estimate from the request's message text, used for
/// routing hints and the TPM governance check ahead of the actual call.
fn estimate_prompt_tokens(req: &ChatRequest) -> u32 {
    let prompt_text: String = req.messages.iter().filter_map(message_text).collect::<Vec<_>>().join("\n");
    estimate_tokens(&prompt_text).min(u32::MAX as u64) as u32
}

fn message_text(message: &ChatMessage) -> Option<String> {
    match message.content.as_ref()? {
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_streaming(
    state: &Arc<AppState>,
    req: &ChatRequest,
    provider: &Arc<dyn Provider>,
    runtime: &ProviderRuntimeConfig,
    deployment_id: &str,
    request_id: &str,
    auth: &AuthContext,
    tags: &[String],
    timer: Timer,
    start: time::OffsetDateTime,
) -> Result<Response, GatewayError> {
    let upstream_req = provider
        .build_request(req, &runtime.api_key, &runtime.base_url)
        .map_err(|e| GatewayError::internal(format!("failed building upstream request: {e}")))?;

    let guard = state
        .upstream
        .acquire()
        .map_err(|_| GatewayError::service_unavailable("upstream client not initialized"))?;
    let resp = guard.send(&upstream_req).await?;

    let status = http::StatusCode::from_u16(resp.status).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
    let upstream_stream = match resp.body {
        UpstreamBody::Stream(stream) => stream,
        UpstreamBody::Bytes(body) => {
            if !status.is_success() {
                return Err(provider.map_error(status, &body));
            }
            return Err(GatewayError::internal("provider returned a buffered body for a streaming call"));
        }
    };
    if !status.is_success() {
        let mut body = Vec::new();
        let mut stream = upstream_stream;
        while let Some(chunk) = futures_util::StreamExt::next(&mut stream).await {
            if let Ok(bytes) = chunk {
                body.extend_from_slice(&bytes);
            }
        }
        return Err(provider.map_error(status, &body));
    }

    let (_cancel_handle, cancel_signal) = cancel_pair();
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(16);
    let writer = ChannelWriter { tx };
    let parser = provider.chunk_parser();
    let pool = BufferPool::new();

    let state = Arc::clone(state);
    let request_id = request_id.to_string();
    let auth = auth.clone();
    let model = req.model.clone();
    let tags = tags.to_vec();
    let end_user_id = req.user.clone();
    let deployment_id = deployment_id.to_string();

    tokio::spawn(async move {
        let usage = std::sync::Mutex::new(Usage::default());
        let content_len = std::sync::atomic::AtomicUsize::new(0);
        let on_chunk = |chunk: &relaygate_protocol::UnifiedChunk| {
            if let Some(u) = chunk.usage {
                *usage.lock().expect("usage mutex poisoned") = u;
            }
            for choice in &chunk.choices {
                if let Some(content) = &choice.delta.content {
                    content_len.fetch_add(content.len(), std::sync::atomic::Ordering::Relaxed);
                }
            }
        };

        let outcome = forward(upstream_stream, writer, cancel_signal, Some(parser), on_chunk, &pool).await;

        let mut final_usage = *usage.lock().expect("usage mutex poisoned");
        if final_usage.is_zero() {
            let completion_tokens = ((content_len.load(std::sync::atomic::Ordering::Relaxed) + 3) / 4) as u64;
            final_usage = Usage {
                prompt_tokens: 0,
                completion_tokens,
                total_tokens: completion_tokens,
                cost: None,
            };
        }

        let status = match &outcome {
            Ok(_) => 200,
            Err(_) => 499,
        };

        if outcome.is_ok() {
            state.router.report_success(&deployment_id, timer.elapsed());
        } else {
            state.router.report_failure(&deployment_id);
        }

        account(&state, &request_id, &auth, &model, CallType::Chat, &tags, end_user_id.as_deref(), final_usage, start, timer.elapsed_ms(), status).await;
        observe_ok(&state, &request_id, &model, true, timer.elapsed_ms(), final_usage);
    });

    let mut builder = Response::builder().status(200);
    for (name, value) in STANDARD_STREAM_HEADERS {
        builder = builder.header(*name, *value);
    }
    Ok(builder
        .body(Body::from_stream(tokio_stream::wrappers::ReceiverStream::new(rx)))
        .expect("static response parts are always valid"))
}

/// Bridges the forwarder's `DownstreamWriter` trait to the outbound
/// channel feeding axum's streaming response body.
struct ChannelWriter {
    tx: tokio::sync::mpsc::Sender<Result<Bytes, std::io::Error>>,
}

impl DownstreamWriter for ChannelWriter {
    async fn write_all(&mut self, data: Bytes) -> std::io::Result<()> {
        self.tx
            .send(Ok(data))
            .await
            .map_err(|_| std::io::Error::other("client disconnected"))
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn account(
    state: &AppState,
    request_id: &str,
    auth: &AuthContext,
    model: &str,
    call_type: CallType,
    tags: &[String],
    end_user_id: Option<&str>,
    usage: Usage,
    start: time::OffsetDateTime,
    latency_ms: u64,
    status: u16,
) {
    state
        .governance
        .load()
        .account(
            auth,
            AccountInput {
                request_id: request_id.to_string(),
                model: model.to_string(),
                call_type,
                end_user_id: end_user_id.map(str::to_string),
                tags: tags.to_vec(),
                usage,
                start,
                latency_ms,
                status,
            },
        )
        .await;
}

fn observe_ok(state: &AppState, request_id: &str, model: &str, is_stream: bool, latency_ms: u64, usage: Usage) {
    state.observability.log_post(&PostCallRecord {
        request_id,
        operation: "chat.completions",
        model,
        status: 200,
        latency_ms,
        is_stream,
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        error: None,
    });
}

fn observe_error(state: &AppState, request_id: &str, model: &str, is_stream: bool, latency_ms: u64, err: &GatewayError) {
    state.observability.log_post(&PostCallRecord {
        request_id,
        operation: "chat.completions",
        model,
        status: err.status().as_u16(),
        latency_ms,
        is_stream,
        prompt_tokens: 0,
        completion_tokens: 0,
        error: Some(&err.message),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygate_protocol::{ChatResponseChoice, CompletionRequest};

    fn message(content: serde_json::Value) -> ChatMessage {
        ChatMessage {
            role: "user".to_string(),
            content: Some(content),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    #[test]
    fn message_text_passes_through_plain_strings() {
        let msg = message(serde_json::json!("hello there"));
        assert_eq!(message_text(&msg), Some("hello there".to_string()));
    }

    #[test]
    fn message_text_stringifies_non_string_content() {
        let msg = message(serde_json::json!([{"type": "text", "text": "hi"}]));
        assert_eq!(message_text(&msg).unwrap(), serde_json::json!([{"type": "text", "text": "hi"}]).to_string());
    }

    #[test]
    fn message_text_is_none_without_content() {
        let msg = ChatMessage {
            role: "assistant".to_string(),
            content: None,
            name: None,
            tool_calls: Some(serde_json::json!([])),
            tool_call_id: None,
        };
        assert!(message_text(&msg).is_none());
    }

    #[test]
    fn estimate_usage_falls_back_on_heuristic_token_counts() {
        let req = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![message(serde_json::json!("a twelve character prompt"))],
            stream: false,
            stream_options: None,
            temperature: None,
            top_p: None,
            n: None,
            stop: None,
            presence_penalty: None,
            frequency_penalty: None,
            max_tokens: None,
            response_format: None,
            tools: None,
            user: None,
            tags: None,
        };
        let response = ChatResponse {
            id: "chatcmpl-1".to_string(),
            object: "chat.completion".to_string(),
            created: 0,
            model: "gpt-4o".to_string(),
            choices: vec![ChatResponseChoice {
                index: 0,
                message: message(serde_json::json!("short reply")),
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        };

        let usage = estimate_usage(&req, &response);
        assert!(usage.prompt_tokens > 0);
        assert!(usage.completion_tokens > 0);
        assert_eq!(usage.total_tokens, usage.prompt_tokens + usage.completion_tokens);
    }

    #[test]
    fn completion_request_becomes_single_user_message_chat_request() {
        let req = CompletionRequest {
            model: "gpt-4o".to_string(),
            prompt: serde_json::json!("translate this"),
            stream: false,
            max_tokens: None,
            temperature: None,
            user: None,
        };
        let chat = req.into_chat_request();
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(message_text(&chat.messages[0]).as_deref(), Some("translate this"));
    }
}
