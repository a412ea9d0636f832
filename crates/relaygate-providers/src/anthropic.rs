use http::{HeaderMap, HeaderValue, Method, StatusCode};
use relaygate_common::GatewayError;
use relaygate_protocol::stream::anthropic::AnthropicChunkParser;
use relaygate_protocol::{ChatMessage, ChatRequest, ChatResponse, ChatResponseChoice, ChunkParser, Usage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::{Provider, default_map_error};
use crate::request::{ProviderError, UpstreamHttpRequest, join_url};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

const SUPPORTED_MODELS: &[&str] = &[
    "claude-3-5-sonnet-latest",
    "claude-3-5-haiku-latest",
    "claude-3-opus-latest",
];

#[derive(Debug, Default)]
pub struct AnthropicProvider;

impl AnthropicProvider {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    stream: bool,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: Value,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait::async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn supported_models(&self) -> &[&'static str] {
        SUPPORTED_MODELS
    }

    fn build_request(
        &self,
        req: &ChatRequest,
        api_key: &str,
        base_url: &str,
    ) -> Result<UpstreamHttpRequest, ProviderError> {
        let url = join_url(base_url, "/v1/messages");

        let mut system = None;
        let mut messages = Vec::with_capacity(req.messages.len());
        for m in &req.messages {
            if m.role == "system" {
                if let Some(Value::String(s)) = &m.content {
                    system = Some(s.clone());
                }
                continue;
            }
            messages.push(AnthropicMessage {
                role: m.role.clone(),
                content: m.content.clone().unwrap_or(Value::Null),
            });
        }

        let body = AnthropicRequest {
            model: &req.model,
            max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system,
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream,
        };
        let body = serde_json::to_vec(&body).map_err(|e| ProviderError::Other(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key).map_err(|e| ProviderError::InvalidConfig(e.to_string()))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(UpstreamHttpRequest {
            method: Method::POST,
            url,
            headers,
            body: Some(body.into()),
            is_stream: req.stream,
        })
    }

    fn parse_response(&self, body: &[u8]) -> Result<ChatResponse, ProviderError> {
        let raw: AnthropicResponse =
            serde_json::from_slice(body).map_err(|e| ProviderError::Other(e.to_string()))?;

        let text = raw
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(ChatResponse {
            id: raw.id,
            object: "chat.completion".to_string(),
            created: 0,
            model: raw.model,
            choices: vec![ChatResponseChoice {
                index: 0,
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content: Some(Value::String(text)),
                    name: None,
                    tool_calls: None,
                    tool_call_id: None,
                },
                finish_reason: raw.stop_reason.map(|r| map_stop_reason(&r)),
            }],
            usage: raw.usage.map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
                cost: None,
            }),
        })
    }

    fn chunk_parser(&self) -> Box<dyn ChunkParser + Send> {
        Box::new(AnthropicChunkParser::default())
    }

    fn map_error(&self, status: StatusCode, body: &[u8]) -> GatewayError {
        default_map_error(status, body, anthropic_error_message(body).as_deref())
    }
}

fn map_stop_reason(reason: &str) -> String {
    match reason {
        "end_turn" => "stop",
        "max_tokens" => "length",
        "stop_sequence" => "stop",
        "tool_use" => "tool_calls",
        other => other,
    }
    .to_string()
}

fn anthropic_error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_system_message_and_defaults_max_tokens() {
        let provider = AnthropicProvider::new();
        let req = ChatRequest {
            model: "claude-3-5-sonnet-latest".into(),
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: Some(Value::String("be terse".into())),
                    name: None,
                    tool_calls: None,
                    tool_call_id: None,
                },
                ChatMessage {
                    role: "user".into(),
                    content: Some(Value::String("hi".into())),
                    name: None,
                    tool_calls: None,
                    tool_call_id: None,
                },
            ],
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
        let built = provider.build_request(&req, "key", "https://api.anthropic.com").unwrap();
        let body: Value = serde_json::from_slice(&built.body.unwrap()).unwrap();
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }
}
