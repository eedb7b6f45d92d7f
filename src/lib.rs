//! Sumi-Reader: web pages in, clean markdown out
//!
//! This crate implements the request pipeline of a reader service: it fetches
//! a target page, strips boilerplate markup in a single streaming pass,
//! extracts metadata, converts the content to markdown, and serves the result
//! through an authenticated, rate-limited, cached HTTP API.

pub mod auth;
pub mod cache;
pub mod clean;
pub mod clock;
pub mod config;
pub mod fetch;
pub mod markdown;
pub mod pipeline;
pub mod rate_limit;
pub mod server;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Reader operations
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Auth error: {0}")]
    Auth(#[from] auth::AuthError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("HTML cleaning error: {0}")]
    Clean(#[from] clean::CleanError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-Reader operations
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use auth::{AuthResolver, Session};
pub use config::Config;
pub use pipeline::RequestPipeline;
pub use url::{normalize_url, parse_target_url};
