use http::{HeaderMap, HeaderValue, Method, StatusCode};
use relaygate_common::GatewayError;
use relaygate_protocol::stream::openai::OpenAiChunkParser;
use relaygate_protocol::{ChatRequest, ChatResponse, ChunkParser};

use crate::provider::{Provider, default_map_error};
use crate::request::{ProviderError, UpstreamHttpRequest, join_url};

const SUPPORTED_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4-turbo", "gpt-3.5-turbo", "o1", "o3-mini"];

#[derive(Debug, Default)]
pub struct OpenAiProvider;

impl OpenAiProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
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
        let url = join_url(base_url, "/v1/chat/completions");
        let body = serde_json::to_vec(req).map_err(|e| ProviderError::Other(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            auth_header(api_key)?,
        );
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
        serde_json::from_slice(body).map_err(|e| ProviderError::Other(e.to_string()))
    }

    fn chunk_parser(&self) -> Box<dyn ChunkParser + Send> {
        Box::new(OpenAiChunkParser)
    }

    fn map_error(&self, status: StatusCode, body: &[u8]) -> GatewayError {
        default_map_error(status, body, openai_error_message(body).as_deref())
    }
}

fn auth_header(api_key: &str) -> Result<HeaderValue, ProviderError> {
    HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|e| ProviderError::InvalidConfig(e.to_string()))
}

/// OpenAI error bodies look like `{"error":{"message":"..."}}`.
pub(crate) fn openai_error_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
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
    fn builds_bearer_auth_request() {
        let provider = OpenAiProvider::new();
        let req = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![],
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
        let built = provider.build_request(&req, "sk-test", "https://api.openai.com").unwrap();
        assert_eq!(built.url, "https://api.openai.com/v1/chat/completions");
        assert!(built.is_stream);
        assert_eq!(
            built.headers.get(http::header::AUTHORIZATION).unwrap(),
            "Bearer sk-test"
        );
    }
}
