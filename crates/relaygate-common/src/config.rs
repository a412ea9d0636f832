use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Top-level configuration, recognized per spec.md §6. Every field has a safe
/// default so a gateway can start from an empty file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub providers: Vec<ProviderConfig>,
    pub governance: GovernanceConfig,
    pub rate_limiter: RateLimiterConfig,
    pub healthcheck: HealthcheckConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
    pub max_body_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            providers: Vec::new(),
            governance: GovernanceConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            healthcheck: HealthcheckConfig::default(),
            cache: CacheConfig::default(),
            auth: AuthConfig::default(),
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub allow_private_base_url: bool,
    #[serde(default)]
    pub models: Vec<ProviderModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderModelConfig {
    pub model_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,
}

fn default_priority() -> i32 {
    100
}

fn default_timeout_s() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub enabled: bool,
    pub async_accounting: bool,
    pub idempotency_window_s: u64,
    pub audit_enabled: bool,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            async_accounting: true,
            idempotency_window_s: 300,
            audit_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub default_rpm: u32,
    pub default_burst: u32,
    /// Tokens-per-minute ceiling alongside the request-count limit
    /// (spec.md §6 rate_limiter options); 0 disables token limiting.
    pub default_tpm: u32,
    pub fail_open: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            default_rpm: 600,
            default_burst: 60,
            default_tpm: 0,
            fail_open: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthcheckConfig {
    pub enabled: bool,
    pub interval_s: u64,
    pub timeout_s: u64,
    pub cooldown_period_s: u64,
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_s: 30,
            timeout_s: 10,
            cooldown_period_s: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub local_ttl_s: u64,
    pub remote_ttl_s: u64,
    pub batch_throttle_ms: u64,
    pub max_throttle_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_ttl_s: 60,
            remote_ttl_s: 300,
            batch_throttle_ms: 500,
            max_throttle_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub oidc: Option<OidcConfig>,
    pub session: SessionConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            oidc: None,
            session: SessionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub allowed_email_domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub secret: String,
    #[serde(default = "default_true")]
    pub cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            cookie_secure: true,
        }
    }
}

/// Overlay type used to merge CLI > ENV > file, mirroring the teacher's
/// `GlobalConfigPatch` overlay pattern.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_body_size: Option<usize>,
}

impl GatewayConfigPatch {
    pub fn overlay(&mut self, other: GatewayConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.max_body_size.is_some() {
            self.max_body_size = other.max_body_size;
        }
    }

    pub fn apply(&self, mut base: GatewayConfig) -> GatewayConfig {
        if let Some(host) = &self.host {
            base.server.host = host.clone();
        }
        if let Some(port) = self.port {
            base.server.port = port;
        }
        if let Some(max_body_size) = self.max_body_size {
            base.max_body_size = max_body_size;
        }
        base
    }
}
