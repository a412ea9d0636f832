use http::{HeaderMap, HeaderValue, Method, StatusCode};
use relaygate_common::GatewayError;
use relaygate_protocol::stream::openai::OpenAiChunkParser;
use relaygate_protocol::{ChatRequest, ChatResponse, ChunkParser};

use crate::openai::openai_error_message;
use crate::provider::{Provider, default_map_error};
use crate::request::{ProviderError, UpstreamHttpRequest};

const DEFAULT_API_VERSION: &str = "2024-06-01";

/// Azure OpenAI speaks the same wire format as OpenAI, but routes by
/// deployment name in the URL path and authenticates with an `api-key`
/// header instead of a bearer token (spec.md §6 "Azure variant folded into
/// the OpenAI parser").
#[derive(Debug)]
pub struct AzureProvider {
    pub api_version: String,
}

impl Default for AzureProvider {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl AzureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_version(api_version: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
        }
    }
}

#[async_trait::async_trait]
impl Provider for AzureProvider {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn supported_models(&self) -> &[&'static str] {
        // Azure deployment names are tenant-specific, not a fixed catalog.
        &[]
    }

    fn build_request(
        &self,
        req: &ChatRequest,
        api_key: &str,
        base_url: &str,
    ) -> Result<UpstreamHttpRequest, ProviderError> {
        let base = base_url.trim_end_matches('/');
        let deployment = &req.model;
        let url = format!(
            "{base}/openai/deployments/{deployment}/chat/completions?api-version={}",
            self.api_version
        );
        let body = serde_json::to_vec(req).map_err(|e| ProviderError::Other(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(api_key).map_err(|e| ProviderError::InvalidConfig(e.to_string()))?,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_deployment_scoped_url_with_api_key_header() {
        let provider = AzureProvider::new();
        let req = ChatRequest {
            model: "my-gpt4o-deployment".into(),
            messages: vec![],
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
        let built = provider
            .build_request(&req, "azure-key", "https://my-resource.openai.azure.com")
            .unwrap();
        assert!(built.url.contains("/openai/deployments/my-gpt4o-deployment/chat/completions"));
        assert_eq!(built.headers.get("api-key").unwrap(), "azure-key");
    }
}
