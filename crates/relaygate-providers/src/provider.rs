use http::StatusCode;
use relaygate_common::GatewayError;
use relaygate_protocol::{ChatRequest, ChatResponse, ChunkParser, EmbeddingRequest};
use serde_json::Value;

use crate::request::{ProviderError, UpstreamHttpRequest};

/// The capability set every provider adapter satisfies (spec.md §9 design
/// notes). Parsing and request-building are kept on one trait per provider,
/// but a provider's chunk parser is a separate object — streaming and
/// unary response shapes diverge enough between providers that forcing one
/// set of methods to cover both would make at least one of them awkward.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn supported_models(&self) -> &[&'static str];

    fn build_request(
        &self,
        req: &ChatRequest,
        api_key: &str,
        base_url: &str,
    ) -> Result<UpstreamHttpRequest, ProviderError>;

    fn parse_response(&self, body: &[u8]) -> Result<ChatResponse, ProviderError>;

    fn chunk_parser(&self) -> Box<dyn ChunkParser + Send>;

    fn map_error(&self, status: StatusCode, body: &[u8]) -> GatewayError;

    fn supports_embedding(&self) -> bool {
        false
    }

    fn build_embedding_request(
        &self,
        _req: &EmbeddingRequest,
        _api_key: &str,
        _base_url: &str,
    ) -> Result<UpstreamHttpRequest, ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "{} does not support embeddings",
            self.name()
        )))
    }

    fn parse_embedding_response(&self, _body: &[u8]) -> Result<Value, ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "{} does not support embeddings",
            self.name()
        )))
    }
}

/// Shared status→`GatewayError` mapping used by every adapter's `map_error`
/// unless a provider's error body needs bespoke handling.
pub fn default_map_error(status: StatusCode, body: &[u8], message_hint: Option<&str>) -> GatewayError {
    let detail = message_hint
        .map(str::to_string)
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            GatewayError::invalid_request(detail)
        }
        StatusCode::UNAUTHORIZED => GatewayError::authentication(detail),
        StatusCode::FORBIDDEN => GatewayError::permission_denied(detail),
        StatusCode::TOO_MANY_REQUESTS => GatewayError::rate_limited(detail),
        StatusCode::PAYMENT_REQUIRED => GatewayError::insufficient_quota(detail),
        s if s.is_server_error() => {
            GatewayError::service_unavailable(format!("upstream returned {s}"))
        }
        s => GatewayError::service_unavailable(format!("upstream returned {s}: {detail}")),
    }
}
