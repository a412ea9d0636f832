//! Shared config and error types for relaygate. No crate in this workspace
//! other than this one should define its own `GatewayConfig`/`ErrorKind`.

pub mod config;
pub mod error;
pub mod ids;

pub use config::{
    AuthConfig, CacheConfig, GatewayConfig, GatewayConfigPatch, GovernanceConfig,
    HealthcheckConfig, OidcConfig, ProviderConfig, ProviderModelConfig, RateLimiterConfig,
    ServerConfig, SessionConfig,
};
pub use error::{ErrorKind, GatewayError, GatewayResult};
