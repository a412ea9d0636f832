//! Provider registry and adapters (spec.md §9 "Dynamic dispatch across
//! providers"): OpenAI, Azure OpenAI, Anthropic, Gemini.

mod anthropic;
mod azure;
mod gemini;
mod openai;
mod provider;
mod registry;
mod request;

pub use anthropic::AnthropicProvider;
pub use azure::AzureProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use provider::{Provider, default_map_error};
pub use registry::{ProviderRegistry, build_registry};
pub use request::{ProviderError, UpstreamHttpRequest, join_url};
