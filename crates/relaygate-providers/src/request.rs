use bytes::Bytes;
use http::{HeaderMap, Method};

/// A fully-built upstream HTTP request, provider-agnostic from here on —
/// the caller just needs an HTTP client to send it.
#[derive(Debug, Clone)]
pub struct UpstreamHttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub is_stream: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),
    #[error("operation not supported by provider: {0}")]
    Unsupported(String),
    #[error("failed building upstream request: {0}")]
    Other(String),
}

pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
