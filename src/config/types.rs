use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration structure for Sumi-Reader
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
}

/// Deployment environment; controls error detail in responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default)]
    pub environment: Environment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            environment: Environment::default(),
        }
    }
}

/// Target page fetching configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Total request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Pages larger than this are rejected
    #[serde(rename = "max-body-bytes", default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_fetch_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Which authentication strategies a deployment runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum AuthMode {
    /// API keys and cookie sessions against the identity service
    #[serde(rename = "better-auth")]
    BetterAuth,
    #[serde(rename = "jwt")]
    Jwt,
    #[default]
    #[serde(rename = "none")]
    None,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,

    /// Base URL of the identity service
    #[serde(rename = "identity-base-url", default)]
    pub identity_base_url: Option<String>,

    /// Path of the session endpoint on the identity service
    #[serde(rename = "session-path", default = "default_session_path")]
    pub session_path: String,

    /// How long a resolved API-key session is reused (seconds)
    #[serde(rename = "cache-ttl-secs", default = "default_auth_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(rename = "request-timeout-secs", default = "default_auth_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub jwt: JwtConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            identity_base_url: None,
            session_path: default_session_path(),
            cache_ttl_secs: default_auth_cache_ttl(),
            request_timeout_secs: default_auth_timeout(),
            jwt: JwtConfig::default(),
        }
    }
}

/// JWT verification settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JwtConfig {
    /// HMAC secret; `SUMI_READER_JWT_SECRET` overrides it
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TTL used when a request does not ask for one (seconds)
    #[serde(rename = "default-ttl-secs", default = "default_cache_ttl")]
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: default_cache_ttl(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file; in-memory storage when absent
    #[serde(rename = "database-path", default)]
    pub database_path: Option<String>,

    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    #[serde(rename = "retry-max-attempts", default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_attempts: default_retry_max_attempts(),
        }
    }
}

/// A request quota over a sliding window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuotaConfig {
    pub limit: u32,

    #[serde(rename = "window-secs")]
    pub window_secs: u64,
}

/// Quotas keyed by operation, then by tier name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RateLimitConfig(pub BTreeMap<String, BTreeMap<String, QuotaConfig>>);

impl RateLimitConfig {
    /// Quota for an operation and tier
    pub fn quota(&self, operation: &str, tier: &str) -> Option<QuotaConfig> {
        self.0.get(operation)?.get(tier).copied()
    }

    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let tiers = |free: u32, pro: u32| {
            BTreeMap::from([
                (
                    "free".to_string(),
                    QuotaConfig {
                        limit: free,
                        window_secs: 60,
                    },
                ),
                (
                    "pro".to_string(),
                    QuotaConfig {
                        limit: pro,
                        window_secs: 60,
                    },
                ),
            ])
        };
        Self(BTreeMap::from([
            ("read".to_string(), tiers(20, 200)),
            ("links".to_string(), tiers(10, 100)),
        ]))
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_user_agent() -> String {
    format!("sumi-reader/{}", env!("CARGO_PKG_VERSION"))
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_session_path() -> String {
    "/api/auth/get-session".to_string()
}

fn default_auth_cache_ttl() -> u64 {
    300
}

fn default_auth_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    86_400
}

fn default_retry_base_delay() -> u64 {
    1_000
}

fn default_retry_max_attempts() -> u32 {
    5
}
