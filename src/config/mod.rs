//! Configuration module for Sumi-Reader
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_reader::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("reader.toml")).unwrap();
//! println!("Auth mode: {:?}", config.auth.mode);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AuthConfig, AuthMode, CacheConfig, Config, Environment, FetchConfig, JwtConfig, QuotaConfig,
    RateLimitConfig, ServerConfig, StorageConfig,
};

// Re-export parser functions
pub use parser::{
    apply_jwt_secret_override, compute_config_hash, load_config, load_config_with_hash,
    parse_config, JWT_SECRET_ENV,
};
pub use validation::{validate, KNOWN_TIERS};
