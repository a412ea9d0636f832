use std::collections::HashMap;
use std::sync::Arc;

use crate::anthropic::AnthropicProvider;
use crate::azure::AzureProvider;
use crate::gemini::GeminiProvider;
use crate::openai::OpenAiProvider;
use crate::provider::Provider;

/// The closed set of provider adapters this workspace ships, keyed by the
/// `kind` string used in `relaygate_common::ProviderConfig` (spec.md §9
/// "Dynamic dispatch across providers").
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn get(&self, kind: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(kind).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        build_registry()
    }
}

pub fn build_registry() -> ProviderRegistry {
    let openai: Arc<dyn Provider> = Arc::new(OpenAiProvider::new());
    let azure: Arc<dyn Provider> = Arc::new(AzureProvider::new());
    let anthropic: Arc<dyn Provider> = Arc::new(AnthropicProvider::new());
    let gemini: Arc<dyn Provider> = Arc::new(GeminiProvider::new());

    let mut providers = HashMap::new();
    providers.insert(openai.name().to_string(), openai);
    providers.insert(azure.name().to_string(), azure);
    providers.insert(anthropic.name().to_string(), anthropic);
    providers.insert(gemini.name().to_string(), gemini);

    ProviderRegistry { providers }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_every_built_in_provider_by_name() {
        let registry = build_registry();
        for name in ["openai", "azure", "anthropic", "gemini"] {
            assert!(registry.get(name).is_some(), "missing provider {name}");
        }
        assert!(registry.get("unknown").is_none());
    }
}
