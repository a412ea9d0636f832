use http::{HeaderMap, HeaderValue, Method, StatusCode};
use relaygate_common::GatewayError;
use relaygate_protocol::stream::gemini::GeminiChunkParser;
use relaygate_protocol::{ChatMessage, ChatRequest, ChatResponse, ChatResponseChoice, ChunkParser, Usage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::{Provider, default_map_error};
use crate::request::{ProviderError, UpstreamHttpRequest};

const SUPPORTED_MODELS: &[&str] = &["gemini-1.5-pro", "gemini-1.5-flash", "gemini-2.0-flash"];

#[derive(Debug, Default)]
pub struct GeminiProvider;

impl GeminiProvider {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u64,
}

#[async_trait::async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
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
        let base = base_url.trim_end_matches('/');
        let method_name = if req.stream {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        let separator = if method_name.contains('?') { "&" } else { "?" };
        let url = format!("{base}/v1beta/models/{}:{method_name}{separator}key={api_key}", req.model);

        let contents = req
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| GeminiContent {
                role: if m.role == "assistant" { "model".to_string() } else { "user".to_string() },
                parts: vec![GeminiPart {
                    text: m
                        .content
                        .as_ref()
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                }],
            })
            .collect();

        let body = GeminiRequest {
            contents,
            generation_config: Some(GeminiGenerationConfig {
                temperature: req.temperature,
                top_p: req.top_p,
                max_output_tokens: req.max_tokens,
            }),
        };
        let body = serde_json::to_vec(&body).map_err(|e| ProviderError::Other(e.to_string()))?;

        let mut headers = HeaderMap::new();
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
        let raw: GeminiResponse =
            serde_json::from_slice(body).map_err(|e| ProviderError::Other(e.to_string()))?;

        let candidate = raw
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Other("gemini response had no candidates".to_string()))?;

        let text = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(ChatResponse {
            id: String::new(),
            object: "chat.completion".to_string(),
            created: 0,
            model: String::new(),
            choices: vec![ChatResponseChoice {
                index: 0,
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content: Some(Value::String(text)),
                    name: None,
                    tool_calls: None,
                    tool_call_id: None,
                },
                finish_reason: candidate.finish_reason.map(|r| map_finish_reason(&r)),
            }],
            usage: raw.usage_metadata.map(|u| Usage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
                cost: None,
            }),
        })
    }

    fn chunk_parser(&self) -> Box<dyn ChunkParser + Send> {
        Box::new(GeminiChunkParser::default())
    }

    fn map_error(&self, status: StatusCode, body: &[u8]) -> GatewayError {
        default_map_error(status, body, gemini_error_message(body).as_deref())
    }
}

fn map_finish_reason(reason: &str) -> String {
    match reason {
        "STOP" => "stop",
        "MAX_TOKENS" => "length",
        "SAFETY" | "RECITATION" => "content_filter",
        other => other,
    }
    .to_string()
}

fn gemini_error_message(body: &[u8]) -> Option<String> {
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
    fn builds_streaming_url_with_key_query_param() {
        let provider = GeminiProvider::new();
        let req = ChatRequest {
            model: "gemini-1.5-pro".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: Some(Value::String("hi".into())),
                name: None,
                tool_calls: None,
                tool_call_id: None,
            }],
            stream: true,
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
        let built = provider.build_request(&req, "gkey", "https://generativelanguage.googleapis.com").unwrap();
        assert!(built.url.contains("streamGenerateContent?alt=sse&key=gkey"));
    }
}
