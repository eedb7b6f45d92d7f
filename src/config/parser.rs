use crate::config::types::Config;
use crate::cache::sha256_hex;
use crate::config::validation::validate;
use crate::ConfigError;
use std::path::Path;

/// Environment variable that overrides `[auth.jwt] secret`
pub const JWT_SECRET_ENV: &str = "SUMI_READER_JWT_SECRET";

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_reader::config::load_config;
///
/// let config = load_config(Path::new("reader.toml")).unwrap();
/// println!("Listening on: {}", config.server.bind);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    load_config_with_hash(path).map(|(config, _)| config)
}

/// Parses configuration from TOML text without validating it
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Replaces the configured JWT secret when an override is present
pub fn apply_jwt_secret_override(config: &mut Config, secret: Option<String>) {
    if let Some(secret) = secret.filter(|s| !s.is_empty()) {
        config.auth.jwt.secret = Some(secret);
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so deployments can tell which configuration is live.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read(path)?;
    Ok(sha256_hex(&content))
}

/// Loads a configuration and the hash of the exact bytes it was parsed from
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let hash = sha256_hex(content.as_bytes());

    let mut config = parse_config(&content)?;
    apply_jwt_secret_override(&mut config, std::env::var(JWT_SECRET_ENV).ok());
    validate(&config)?;

    Ok((config, hash))
}
