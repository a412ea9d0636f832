//! Shared, hot-reloadable application state. Grounded directly on the
//! teacher's `state::AppState`: config and the derived router/provider
//! wiring sit behind `ArcSwap` so a config reload never blocks or breaks
//! an in-flight request; the upstream client has its own dedicated
//! hot-swap wrapper since it owns connections that need a drain-then-close
//! step a plain pointer swap doesn't give you.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use relaygate_client::HotSwapClient;
use relaygate_common::GatewayConfig;
use relaygate_governance::{GovernanceEngine, SessionCodec};
use relaygate_providers::ProviderRegistry;
use relaygate_router::{Deployment, Router, RouterConfig};
use relaygate_storage::Store;

use crate::cache_backend::CacheBackend;
use crate::mcp::ToolExecutor;
use crate::observability::ObservabilityManager;
use crate::upstream::UpstreamHttpClient;

/// Per-provider connection details from `GatewayConfig.providers`, looked
/// up by `Deployment::provider_name` at request time.
#[derive(Debug, Clone)]
pub struct ProviderRuntimeConfig {
    pub kind: String,
    pub api_key: String,
    pub base_url: String,
}

pub struct AppState {
    pub config: ArcSwap<GatewayConfig>,
    pub router: Arc<Router>,
    pub provider_configs: ArcSwap<HashMap<String, ProviderRuntimeConfig>>,
    pub registry: Arc<ProviderRegistry>,
    pub governance: ArcSwap<GovernanceEngine>,
    pub upstream: Arc<HotSwapClient<UpstreamHttpClient>>,
    pub cache: Arc<CacheBackend>,
    pub store: Arc<dyn Store>,
    pub observability: Arc<dyn ObservabilityManager>,
    pub session_codec: SessionCodec,
    /// `None` when no MCP tool manager is installed (spec.md §4.I point 9):
    /// chat calls then go straight to the provider instead of through the
    /// tool-call loop, since there is nothing to execute a tool call with.
    pub tool_executor: Option<Arc<dyn ToolExecutor>>,
}

impl AppState {
    pub fn provider_config_for(&self, provider_name: &str) -> Option<ProviderRuntimeConfig> {
        self.provider_configs.load().get(provider_name).cloned()
    }

    /// Installs a freshly loaded config: rebuilds the deployment list, the
    /// per-provider connection table, and (since its policy knobs may have
    /// changed) a new `GovernanceEngine` sharing the same storage-backed
    /// ports as before. The router itself stays the same instance so its
    /// circuit-breaker stats survive the reload.
    pub fn apply_config(&self, config: GatewayConfig, governance: GovernanceEngine) {
        self.router.replace_deployments(deployments_from_config(&config));
        self.provider_configs.store(Arc::new(provider_configs_from(&config)));
        self.governance.store(Arc::new(governance));
        self.config.store(Arc::new(config));
    }
}

pub fn deployments_from_config(config: &GatewayConfig) -> Vec<Deployment> {
    let mut deployments = Vec::new();
    for provider in &config.providers {
        for model in &provider.models {
            let id = format!("{}:{}", provider.name, model.model_name);
            deployments.push(
                Deployment::new(id, provider.name.clone(), model.model_name.clone())
                    .with_tags(model.tags.clone())
                    .with_priority(model.priority.max(0) as u32),
            );
        }
    }
    deployments
}

pub fn provider_configs_from(config: &GatewayConfig) -> HashMap<String, ProviderRuntimeConfig> {
    config
        .providers
        .iter()
        .map(|p| {
            (
                p.name.clone(),
                ProviderRuntimeConfig {
                    kind: p.kind.clone(),
                    api_key: p.api_key.clone().unwrap_or_default(),
                    base_url: p.base_url.clone().unwrap_or_default(),
                },
            )
        })
        .collect()
}

pub fn router_from_config(config: &GatewayConfig) -> Router {
    Router::new(deployments_from_config(config), RouterConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygate_common::{ProviderConfig, ProviderModelConfig};

    #[test]
    fn deployments_are_derived_one_per_provider_model() {
        let mut config = GatewayConfig::default();
        config.providers.push(ProviderConfig {
            name: "openai-primary".into(),
            kind: "openai".into(),
            api_key: Some("sk-test".into()),
            base_url: None,
            allow_private_base_url: false,
            models: vec![ProviderModelConfig {
                model_name: "gpt-4o".into(),
                tags: vec![],
                priority: 10,
                timeout_s: 30,
            }],
        });

        let deployments = deployments_from_config(&config);
        assert_eq!(deployments.len(), 1);
        assert_eq!(deployments[0].provider_name, "openai-primary");
        assert_eq!(deployments[0].model_name, "gpt-4o");
    }
}
