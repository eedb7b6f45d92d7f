use crate::config::types::{
    AuthConfig, AuthMode, Config, FetchConfig, RateLimitConfig, ServerConfig, StorageConfig,
};
use crate::ConfigError;
use std::net::SocketAddr;
use url::Url;

/// Tier names accepted in the rate-limit table
pub const KNOWN_TIERS: &[&str] = &["free", "pro"];

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_server_config(&config.server)?;
    validate_fetch_config(&config.fetch)?;
    validate_auth_config(&config.auth)?;
    validate_storage_config(&config.storage)?;
    validate_rate_limits(&config.rate_limit)?;
    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<(), ConfigError> {
    config.bind.parse::<SocketAddr>().map_err(|e| {
        ConfigError::Validation(format!("bind must be a socket address, got '{}': {}", config.bind, e))
    })?;
    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch timeout-secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if config.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch connect-timeout-secs must be >= 1, got {}",
            config.connect_timeout_secs
        )));
    }

    if config.max_body_bytes == 0 {
        return Err(ConfigError::Validation(
            "max-body-bytes must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth_config(config: &AuthConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "auth request-timeout-secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    if let Some(base) = &config.identity_base_url {
        validate_http_url(base)?;
    }

    match config.mode {
        AuthMode::BetterAuth => {
            if config.identity_base_url.is_none() {
                return Err(ConfigError::Validation(
                    "auth mode 'better-auth' requires identity-base-url".to_string(),
                ));
            }

            if !config.session_path.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "session-path must start with '/', got '{}'",
                    config.session_path
                )));
            }
        }
        AuthMode::Jwt => {
            let has_secret = config
                .jwt
                .secret
                .as_deref()
                .map(|s| !s.is_empty())
                .unwrap_or(false);
            if !has_secret {
                return Err(ConfigError::Validation(
                    "auth mode 'jwt' requires a non-empty [auth.jwt] secret".to_string(),
                ));
            }
        }
        AuthMode::None => {}
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if let Some(path) = &config.database_path {
        if path.is_empty() {
            return Err(ConfigError::Validation(
                "database-path cannot be empty".to_string(),
            ));
        }
    }

    if !(1..=10).contains(&config.retry_max_attempts) {
        return Err(ConfigError::Validation(format!(
            "retry-max-attempts must be between 1 and 10, got {}",
            config.retry_max_attempts
        )));
    }

    Ok(())
}

fn validate_rate_limits(config: &RateLimitConfig) -> Result<(), ConfigError> {
    for (operation, tiers) in &config.0 {
        for (tier, quota) in tiers {
            if !KNOWN_TIERS.contains(&tier.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Unknown rate-limit tier '{}' for operation '{}'",
                    tier, operation
                )));
            }

            if quota.limit < 1 || quota.window_secs < 1 {
                return Err(ConfigError::Validation(format!(
                    "Quota for {}.{} needs limit >= 1 and window-secs >= 1",
                    operation, tier
                )));
            }
        }
    }

    Ok(())
}

/// Validates an http(s) URL with a host
fn validate_http_url(raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid identity-base-url '{}': {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "identity-base-url '{}' must be an http(s) URL with a host",
            raw
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::QuotaConfig;
    use std::collections::BTreeMap;

    #[test]
    fn test_validate_http_url() {
        assert!(validate_http_url("https://id.example.com").is_ok());
        assert!(validate_http_url("http://127.0.0.1:3000").is_ok());

        assert!(validate_http_url("ftp://id.example.com").is_err());
        assert!(validate_http_url("not a url").is_err());
    }

    #[test]
    fn test_better_auth_requires_base_url() {
        let mut config = Config::default();
        config.auth.mode = AuthMode::BetterAuth;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));

        config.auth.identity_base_url = Some("https://id.example.com".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_jwt_requires_secret() {
        let mut config = Config::default();
        config.auth.mode = AuthMode::Jwt;
        assert!(validate(&config).is_err());

        config.auth.jwt.secret = Some(String::new());
        assert!(validate(&config).is_err());

        config.auth.jwt.secret = Some("s3cret".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_bind() {
        let mut config = Config::default();
        config.server.bind = "localhost".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_retry_attempts_range() {
        let mut config = Config::default();
        config.storage.retry_max_attempts = 0;
        assert!(validate(&config).is_err());
        config.storage.retry_max_attempts = 11;
        assert!(validate(&config).is_err());
        config.storage.retry_max_attempts = 10;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_quota_rules() {
        let quota = |limit, window_secs| QuotaConfig { limit, window_secs };
        let table = |tier: &str, q| {
            RateLimitConfig(BTreeMap::from([(
                "read".to_string(),
                BTreeMap::from([(tier.to_string(), q)]),
            )]))
        };

        assert!(validate_rate_limits(&table("free", quota(1, 1))).is_ok());
        assert!(validate_rate_limits(&table("free", quota(0, 60))).is_err());
        assert!(validate_rate_limits(&table("pro", quota(10, 0))).is_err());
        assert!(validate_rate_limits(&table("enterprise", quota(10, 60))).is_err());
    }
}
