//! Bounded tool-call loop (spec.md §4.I point 9). Grounded in the
//! teacher's `proxy_engine::dispatch` separation between "decide what
//! happens next" and "record what happened" — generalized here from
//! forwarding a single upstream call to resolving a chat response's
//! `tool_calls` against an executor, feeding results back as messages,
//! and re-calling the provider until it stops asking for tools or the
//! iteration cap is hit.

use serde_json::Value;

use relaygate_protocol::{ChatMessage, ChatResponse};

/// Caps how many provider round-trips a single request will spend
/// satisfying tool calls before giving up and returning whatever the last
/// response was.
pub const MAX_TOOL_ITERATIONS: u32 = 4;

/// What the loop should do after looking at a provider response.
pub enum NextStep {
    /// The response had no pending tool calls; it's final.
    Done(ChatResponse),
    /// The response asked for one or more tool calls; these are the
    /// messages (one per tool result) to append before calling again.
    RunTools(Vec<ChatMessage>),
}

/// Executes a single tool call and returns its result as a chat message.
/// Implemented per deployment; no concrete tool backend ships here since
/// the gateway has no opinion on what tools exist (spec.md Non-goals rule
/// out inventing an agent framework).
#[async_trait::async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_call: &Value) -> ChatMessage;
}

/// Reports every call as unsupported; used when no executor is wired so
/// the loop still terminates deterministically instead of looping forever
/// on a model that won't stop requesting tools.
#[derive(Debug, Default)]
pub struct NullToolExecutor;

#[async_trait::async_trait]
impl ToolExecutor for NullToolExecutor {
    async fn execute(&self, tool_call: &Value) -> ChatMessage {
        let tool_call_id = tool_call
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        ChatMessage {
            role: "tool".to_string(),
            content: Some(Value::String("no tool executor configured for this deployment".to_string())),
            name: None,
            tool_calls: None,
            tool_call_id: Some(tool_call_id),
        }
    }
}

/// Pure decision step: does this response need another round-trip, and if
/// so, what tool-result messages does it produce?
pub fn resolve_next_step(response: ChatResponse, tool_calls: &[Value]) -> NextStep {
    if tool_calls.is_empty() {
        return NextStep::Done(response);
    }
    NextStep::RunTools(Vec::new())
}

/// Extracts the first choice's pending tool calls, if any, as a flat list.
pub fn pending_tool_calls(response: &ChatResponse) -> Vec<Value> {
    let Some(choice) = response.choices.first() else {
        return Vec::new();
    };
    match &choice.message.tool_calls {
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    }
}

/// Runs the loop: on each iteration, `call_provider` gets the accumulated
/// message history and must return a fresh `ChatResponse`. Stops as soon
/// as a response carries no tool calls, or after `MAX_TOOL_ITERATIONS`.
pub async fn run_tool_loop<F, Fut>(
    mut messages: Vec<ChatMessage>,
    executor: &dyn ToolExecutor,
    mut call_provider: F,
) -> Result<ChatResponse, relaygate_common::GatewayError>
where
    F: FnMut(Vec<ChatMessage>) -> Fut,
    Fut: std::future::Future<Output = Result<ChatResponse, relaygate_common::GatewayError>>,
{
    let mut iterations = 0;
    loop {
        let response = call_provider(messages.clone()).await?;
        let tool_calls = pending_tool_calls(&response);

        match resolve_next_step(response, &tool_calls) {
            NextStep::Done(response) => return Ok(response),
            NextStep::RunTools(_) => {
                iterations += 1;
                if iterations >= MAX_TOOL_ITERATIONS {
                    return Err(relaygate_common::GatewayError::invalid_request(
                        "tool-call loop exceeded the iteration limit",
                    ));
                }
                for tool_call in &tool_calls {
                    messages.push(executor.execute(tool_call).await);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygate_protocol::ChatResponseChoice;

    fn response_with_tool_calls(tool_calls: Option<Value>) -> ChatResponse {
        ChatResponse {
            id: "r1".into(),
            object: "chat.completion".into(),
            created: 0,
            model: "gpt-4o".into(),
            choices: vec![ChatResponseChoice {
                index: 0,
                message: ChatMessage {
                    role: "assistant".into(),
                    content: None,
                    name: None,
                    tool_calls,
                    tool_call_id: None,
                },
                finish_reason: None,
            }],
            usage: None,
        }
    }

    #[tokio::test]
    async fn stops_immediately_when_no_tool_calls() {
        let response = response_with_tool_calls(None);
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result = run_tool_loop(Vec::new(), &NullToolExecutor, |_| {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let response = response_with_tool_calls(None);
            async move { Ok(response) }
        })
        .await
        .unwrap();
        assert_eq!(result.id, "r1");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_iteration_cap() {
        let call_count = std::sync::atomic::AtomicU32::new(0);
        let result = run_tool_loop(Vec::new(), &NullToolExecutor, |_| {
            call_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let response = response_with_tool_calls(Some(serde_json::json!([{"id": "call_1"}])));
            async move { Ok(response) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), MAX_TOOL_ITERATIONS);
    }
}
