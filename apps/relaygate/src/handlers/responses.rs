//! `POST /v1/responses` (spec.md §4.I, §6). Shimmed onto the same chat
//! pipeline as `/v1/chat/completions`; the wire shape differs enough
//! (`response.*` event names instead of `chat.completion.chunk`, an
//! `output` array instead of `choices`) that it gets its own thin encoder
//! rather than reusing `relaygate_forward::forward`'s SSE writer, which
//! bakes in the chat-completions chunk shape.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use bytes::Bytes;
use futures_util::StreamExt;
use relaygate_common::GatewayError;
use relaygate_governance::{AccountInput, RequestInput};
use relaygate_protocol::sse::SseParser;
use relaygate_protocol::{CallType, ChatMessage, ChatRequest, ResponseRequest, Usage};
use relaygate_router::RequestContext;
use serde_json::{json, Value};

use crate::error_response::ApiError;
use crate::estimate::estimate_tokens;
use crate::handlers::{authenticate, read_body_capped, request_id, Timer};
use crate::observability::PostCallRecord;
use crate::state::AppState;
use crate::upstream::UpstreamBody;

pub async fn responses(
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
    let req: ResponseRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError(GatewayError::invalid_request(format!("invalid request body: {e}"))))?;

    let auth = authenticate(&state, &headers, &cookies).await?;
    let tags = req.tags.clone().unwrap_or_default();
    let input_text = input_to_content(&req.input).as_str().unwrap_or_default().to_string();
    let estimated_input_tokens = estimate_tokens(&input_text).min(u32::MAX as u64) as u32;

    let input = RequestInput {
        model: &req.model,
        call_type: CallType::Response,
        end_user_id: req.user.as_deref(),
        tags: &tags,
        estimated_input_tokens,
    };
    if let Err(err) = state.governance.load().evaluate(&auth, &input).await {
        log(&state, &request_id, &req.model, req.stream, timer.elapsed_ms(), err.status().as_u16(), Some(&err.message));
        return Err(ApiError(err));
    }

    let chat_req = ChatRequest {
        model: req.model.clone(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: Some(input_to_content(&req.input)),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }],
        stream: req.stream,
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
        user: req.user.clone(),
        tags: req.tags.clone(),
    };

    let ctx = RequestContext {
        model: req.model.clone(),
        tags: tags.clone(),
        tenant_scope: auth.tenant_scope(),
        is_streaming: req.stream,
        estimated_input_tokens,
    };
    let deployment = state.router.pick_with_context(&ctx).map_err(|_| {
        ApiError(GatewayError::service_unavailable("no healthy deployment for this model"))
    })?;
    let runtime = state.provider_config_for(&deployment.provider_name).ok_or_else(|| {
        ApiError(GatewayError::internal(format!("no provider config for {}", deployment.provider_name)))
    })?;
    let provider = state
        .registry
        .get(&runtime.kind)
        .ok_or_else(|| ApiError(GatewayError::internal(format!("unknown provider kind {}", runtime.kind))))?;

    let upstream_req = provider
        .build_request(&chat_req, &runtime.api_key, &runtime.base_url)
        .map_err(|e| ApiError(GatewayError::internal(format!("failed building upstream request: {e}"))))?;
    let guard = state
        .upstream
        .acquire()
        .map_err(|_| ApiError(GatewayError::service_unavailable("upstream client not initialized")))?;
    let resp = guard.send(&upstream_req).await.map_err(ApiError)?;
    let status = http::StatusCode::from_u16(resp.status).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);

    if req.stream {
        let stream = match resp.body {
            UpstreamBody::Stream(stream) => stream,
            UpstreamBody::Bytes(body) => {
                state.router.report_failure(&deployment.id);
                return Err(ApiError(provider.map_error(status, &body)));
            }
        };
        if !status.is_success() {
            state.router.report_failure(&deployment.id);
            let mut body = Vec::new();
            let mut stream = stream;
            while let Some(Ok(chunk)) = stream.next().await {
                body.extend_from_slice(&chunk);
            }
            return Err(ApiError(provider.map_error(status, &body)));
        }

        let response_id = format!("resp_{}", uuid::Uuid::new_v4());
        let model = req.model.clone();
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(16);
        let deployment_id = deployment.id.clone();
        let auth = auth.clone();
        let state_for_task = Arc::clone(&state);
        let request_id_for_task = request_id.clone();
        let tags_for_task = tags.clone();
        let end_user_id = req.user.clone();

        tokio::spawn(async move {
            let mut parser = provider.chunk_parser();
            let mut sse = SseParser::new();
            let mut text = String::new();
            let mut source = stream;
            let mut ended = false;

            while let Some(item) = source.next().await {
                let Ok(chunk) = item else { break };
                for event in sse.push_bytes(&chunk) {
                    let data = event.data.trim();
                    if data.is_empty() {
                        continue;
                    }
                    if data == "[DONE]" {
                        ended = true;
                        break;
                    }
                    let Ok(Some(unified)) = parser.parse_chunk(data) else { continue };
                    for choice in &unified.choices {
                        if let Some(delta) = &choice.delta.content {
                            text.push_str(delta);
                            let frame = sse_frame(&json!({
                                "type": "response.output_text.delta",
                                "response_id": response_id,
                                "delta": delta,
                            }));
                            if tx.send(Ok(frame)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                if ended {
                    break;
                }
            }

            let completed = sse_frame(&json!({
                "type": "response.completed",
                "response": {
                    "id": response_id,
                    "object": "response",
                    "model": model,
                    "output_text": text,
                }
            }));
            let _ = tx.send(Ok(completed)).await;
            let _ = tx.send(Ok(Bytes::from_static(b"data: [DONE]\n\n"))).await;

            state_for_task.router.report_success(&deployment_id, timer.elapsed());
            let completion_tokens = ((text.len() + 3) / 4) as u64;
            state_for_task
                .governance
                .load()
                .account(
                    &auth,
                    AccountInput {
                        request_id: request_id_for_task.clone(),
                        model: model.clone(),
                        call_type: CallType::Response,
                        end_user_id,
                        tags: tags_for_task,
                        usage: Usage {
                            prompt_tokens: 0,
                            completion_tokens,
                            total_tokens: completion_tokens,
                            cost: None,
                        },
                        start,
                        latency_ms: timer.elapsed_ms(),
                        status: 200,
                    },
                )
                .await;
            state_for_task.observability.log_post(&PostCallRecord {
                request_id: &request_id_for_task,
                operation: "responses",
                model: &model,
                status: 200,
                latency_ms: timer.elapsed_ms(),
                is_stream: true,
                prompt_tokens: 0,
                completion_tokens,
                error: None,
            });
        });

        return Ok(Response::builder()
            .status(200)
            .header(http::header::CONTENT_TYPE, "text/event-stream")
            .header(http::header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(tokio_stream::wrappers::ReceiverStream::new(rx)))
            .expect("static response parts are always valid"));
    }

    let body = match resp.body {
        UpstreamBody::Bytes(bytes) => bytes,
        UpstreamBody::Stream(_) => {
            return Err(ApiError(GatewayError::internal("provider returned a stream for a unary call")));
        }
    };
    if !status.is_success() {
        state.router.report_failure(&deployment.id);
        let err = provider.map_error(status, &body);
        log(&state, &request_id, &req.model, false, timer.elapsed_ms(), err.status().as_u16(), Some(&err.message));
        return Err(ApiError(err));
    }

    let chat_response = provider
        .parse_response(&body)
        .map_err(|e| ApiError(GatewayError::internal(format!("failed parsing upstream response: {e}"))))?;
    state.router.report_success(&deployment.id, timer.elapsed());

    let output_text = chat_response
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_ref())
        .map(|content| match content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();
    let usage = chat_response.usage.unwrap_or_default();

    state
        .governance
        .load()
        .account(
            &auth,
            AccountInput {
                request_id: request_id.clone(),
                model: req.model.clone(),
                call_type: CallType::Response,
                end_user_id: req.user.clone(),
                tags: tags.clone(),
                usage,
                start,
                latency_ms: timer.elapsed_ms(),
                status: 200,
            },
        )
        .await;
    log(&state, &request_id, &req.model, false, timer.elapsed_ms(), 200, None);

    let body = json!({
        "id": format!("resp_{}", uuid::Uuid::new_v4()),
        "object": "response",
        "model": req.model,
        "output_text": output_text,
        "usage": usage,
    });
    Ok(Response::builder()
        .status(200)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("static response parts are always valid"))
}

fn input_to_content(input: &Value) -> Value {
    match input {
        Value::String(_) => input.clone(),
        Value::Array(items) => {
            let joined = items
                .iter()
                .map(|v| v.as_str().unwrap_or_default().to_string())
                .collect::<Vec<_>>()
                .join("\n");
            Value::String(joined)
        }
        other => Value::String(other.to_string()),
    }
}

/// `/v1/responses` carries its event name inside the JSON body (`"type"`)
/// rather than as an SSE `event:` header line (spec.md §6); callers embed
/// `"type"` in `data` themselves.
fn sse_frame(data: &Value) -> Bytes {
    let mut out = Vec::new();
    out.extend_from_slice(b"data: ");
    out.extend_from_slice(data.to_string().as_bytes());
    out.extend_from_slice(b"\n\n");
    Bytes::from(out)
}

fn log(state: &AppState, request_id: &str, model: &str, is_stream: bool, latency_ms: u64, status: u16, error: Option<&str>) {
    state.observability.log_post(&PostCallRecord {
        request_id,
        operation: "responses",
        model,
        status,
        latency_ms,
        is_stream,
        prompt_tokens: 0,
        completion_tokens: 0,
        error,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_to_content_passes_plain_strings_through() {
        let input = json!("translate this");
        assert_eq!(input_to_content(&input), json!("translate this"));
    }

    #[test]
    fn input_to_content_joins_array_entries_with_newlines() {
        let input = json!(["first line", "second line"]);
        assert_eq!(input_to_content(&input), json!("first line\nsecond line"));
    }

    #[test]
    fn input_to_content_stringifies_other_shapes() {
        let input = json!({"role": "user"});
        assert_eq!(input_to_content(&input), json!(input.to_string()));
    }

    #[test]
    fn sse_frame_writes_a_plain_data_line_with_no_event_header() {
        let frame = sse_frame(&json!({"type": "response.completed", "a": 1}));
        let text = String::from_utf8(frame.to_vec()).unwrap();
        assert_eq!(text, "data: {\"a\":1,\"type\":\"response.completed\"}\n\n");
    }
}
