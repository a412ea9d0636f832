//! CLI args and startup wiring. Grounded directly on the teacher's
//! `bootstrap::{CliArgs, bootstrap, bootstrap_from_env}` shape (DSN
//! sanitizing, sqlite parent-dir creation, CLI/ENV merge order); the
//! admin-key generation step has no counterpart here since the
//! key/team/user management surface is out of scope.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use relaygate_client::HotSwapClient;
use relaygate_common::GatewayConfigPatch;
use relaygate_governance::{
    GovernanceEngine, InMemoryIdempotencyStore, LocalRateLimiter, RateLimiterBackend, RedisIdempotencyStore,
};
use relaygate_providers::ProviderRegistry;
use relaygate_storage::{SeaOrmStore, Store};

use crate::cache_backend::CacheBackend;
use crate::config_load::load_config;
use crate::ledger_store::StoreLedger;
use crate::observability::{ObservabilityManager, TracingObservability};
use crate::state::{router_from_config, AppState, provider_configs_from};
use crate::upstream::{UpstreamClientConfig, UpstreamHttpClient};

#[derive(Debug, Clone, Parser)]
#[command(name = "relaygate", version, about = "Multi-provider LLM gateway")]
pub struct CliArgs {
    /// Path to an optional TOML config file (spec.md §6).
    #[arg(long, env = "RELAYGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Storage DSN; defaults to a local sqlite file.
    #[arg(long, env = "RELAYGATE_DSN")]
    pub dsn: Option<String>,

    /// Bind host override.
    #[arg(long, env = "RELAYGATE_HOST")]
    pub host: Option<String>,

    /// Bind port override.
    #[arg(long, env = "RELAYGATE_PORT")]
    pub port: Option<u16>,

    /// Outbound proxy for upstream provider requests.
    #[arg(long, env = "RELAYGATE_PROXY")]
    pub proxy: Option<String>,

    /// Redis URL for the remote cache tier; local-only cache if unset.
    #[arg(long, env = "RELAYGATE_CACHE_REDIS_URL")]
    pub cache_redis_url: Option<String>,

    /// Redis URL for distributed idempotency coordination across
    /// replicas; in-memory only if unset.
    #[arg(long, env = "RELAYGATE_GOVERNANCE_REDIS_URL")]
    pub governance_redis_url: Option<String>,

    /// Session/JWT signing secret; falls back to config-file value.
    #[arg(long, env = "RELAYGATE_SESSION_SECRET")]
    pub session_secret: Option<String>,
}

pub struct Bootstrap {
    pub state: Arc<AppState>,
    pub bind_host: String,
    pub bind_port: u16,
}

pub async fn bootstrap_from_env() -> anyhow::Result<Bootstrap> {
    let args = CliArgs::parse();
    bootstrap(args).await
}

pub async fn bootstrap(args: CliArgs) -> anyhow::Result<Bootstrap> {
    let mut config = load_config(args.config.as_deref()).context("load config file")?;

    let patch = GatewayConfigPatch {
        host: sanitize_optional(args.host.clone()),
        port: args.port,
        max_body_size: None,
    };
    config = patch.apply(config);

    if let Some(secret) = sanitize_optional(args.session_secret.clone()) {
        config.auth.session.secret = secret;
    }
    if config.auth.session.secret.is_empty() {
        config.auth.session.secret = uuid::Uuid::new_v4().to_string();
        tracing::warn!("no session secret configured; generated an ephemeral one for this process");
    }

    let dsn = sanitize_optional(args.dsn.clone()).unwrap_or_else(default_dsn);
    ensure_sqlite_parent_dir(&dsn)?;
    let store = Arc::new(SeaOrmStore::connect(&dsn).await.context("connect storage")?);
    store.sync().await.context("schema sync")?;

    let cache = if let Some(url) = sanitize_optional(args.cache_redis_url.clone()) {
        Arc::new(CacheBackend::connect(&config.cache, &url).await.context("connect cache redis")?)
    } else {
        Arc::new(CacheBackend::local(&config.cache))
    };

    let session_codec = relaygate_governance::SessionCodec::new(config.auth.session.secret.as_bytes());
    let governance = build_governance_engine(&config, Arc::clone(&store), args.governance_redis_url.as_deref()).await?;

    let upstream_config = UpstreamClientConfig {
        proxy: sanitize_optional(args.proxy.clone()),
        ..Default::default()
    };
    let upstream_client =
        UpstreamHttpClient::new(upstream_config).map_err(|e| anyhow::anyhow!("failed building upstream client: {e}"))?;

    let router = Arc::new(router_from_config(&config));
    let provider_configs = provider_configs_from(&config);
    let registry = Arc::new(ProviderRegistry::default());

    let state = Arc::new(AppState {
        config: arc_swap::ArcSwap::from_pointee(config.clone()),
        router,
        provider_configs: arc_swap::ArcSwap::from_pointee(provider_configs),
        registry,
        governance: arc_swap::ArcSwap::from_pointee(governance),
        upstream: Arc::new(HotSwapClient::new(upstream_client)),
        cache,
        store,
        observability: Arc::new(TracingObservability) as Arc<dyn ObservabilityManager>,
        session_codec,
        // No MCP tool manager ships with this workspace (spec.md Non-goals
        // rule out inventing an agent framework); a deployment that wires
        // one in would set this via `Arc::get_mut`/a future config knob.
        tool_executor: None,
    });

    Ok(Bootstrap {
        bind_host: config.server.host.clone(),
        bind_port: config.server.port,
        state,
    })
}

async fn build_governance_engine(
    config: &relaygate_common::GatewayConfig,
    store: Arc<relaygate_storage::SeaOrmStore>,
    governance_redis_url: Option<&str>,
) -> anyhow::Result<GovernanceEngine> {
    let rate_limiter = RateLimiterBackend::Local(
        LocalRateLimiter::new(config.rate_limiter.default_rpm, config.rate_limiter.default_burst)
            .with_tpm(config.rate_limiter.default_tpm),
    );

    let idempotency: Arc<dyn relaygate_governance::IdempotencyStore> =
        if let Some(url) = governance_redis_url {
            Arc::new(
                RedisIdempotencyStore::connect(url)
                    .await
                    .map_err(|e| anyhow::anyhow!("failed connecting idempotency redis: {e}"))?,
            )
        } else {
            Arc::new(InMemoryIdempotencyStore::new())
        };

    let ledger = Arc::new(StoreLedger::new(store as Arc<dyn relaygate_storage::Store>));

    Ok(GovernanceEngine::new(
        config.governance.clone(),
        rate_limiter,
        idempotency,
        ledger.clone(),
        ledger,
    ))
}

fn sanitize_optional(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() || (trimmed.starts_with("${") && trimmed.ends_with('}')) {
        return None;
    }
    Some(trimmed)
}

fn default_dsn() -> String {
    if let Some(data_dir) = sanitize_optional(std::env::var("RELAYGATE_DATA_DIR").ok()) {
        let dir = data_dir.trim_end_matches('/');
        return format!("sqlite://{dir}/relaygate.db?mode=rwc");
    }
    "sqlite://relaygate.db?mode=rwc".to_string()
}

fn ensure_sqlite_parent_dir(dsn: &str) -> anyhow::Result<()> {
    let Some(db_path) = sqlite_file_path_from_dsn(dsn) else {
        return Ok(());
    };
    let Some(parent) = db_path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent)
        .with_context(|| format!("create sqlite parent dir {}", parent.display()))?;
    Ok(())
}

fn sqlite_file_path_from_dsn(dsn: &str) -> Option<PathBuf> {
    let rest = dsn.strip_prefix("sqlite:")?;
    let path_part = rest.split(['?', '#']).next()?.trim();
    if path_part.is_empty() {
        return None;
    }
    let mut normalized = path_part;
    if let Some(stripped) = normalized.strip_prefix("//") {
        normalized = stripped;
    }
    if normalized.to_ascii_lowercase() == ":memory:" {
        return None;
    }
    Some(PathBuf::from(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_dsn_resolves_relative_path() {
        let path = sqlite_file_path_from_dsn("sqlite://relaygate.db?mode=rwc").unwrap();
        assert_eq!(path.to_string_lossy(), "relaygate.db");
    }

    #[test]
    fn sqlite_memory_dsn_is_ignored() {
        assert!(sqlite_file_path_from_dsn("sqlite::memory:").is_none());
    }

    #[test]
    fn placeholder_env_value_is_treated_as_unset() {
        assert!(sanitize_optional(Some("${RELAYGATE_PROXY}".to_string())).is_none());
    }
}
