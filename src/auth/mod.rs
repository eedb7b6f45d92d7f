//! Request authentication
//!
//! The resolver walks an ordered chain of strategies and adopts the first
//! session one of them produces:
//!
//! 1. A session already attached upstream is used as-is
//! 2. API key (`x-api-key` or bearer), in `better-auth` mode
//! 3. Cookie session, in `better-auth` mode
//! 4. JWT bearer token, in `jwt` mode
//!
//! Resolution never fails; a request with no usable credential is anonymous.

mod api_key;
mod cache;
mod cookie;
mod jwt;
mod session;
mod strategy;
mod transport;

pub use api_key::ApiKeyStrategy;
pub use cache::AuthCache;
pub use cookie::CookieStrategy;
pub use jwt::{JwtClaims, JwtStrategy};
pub use session::{CreatedVia, Session, SessionData, SessionPayload, UserData, UserProfile};
pub use strategy::{extract_api_key, bearer_token, has_cookie, AuthStrategy, StrategyOutcome};
pub use transport::{CookieSessionClient, HttpIdentityClient, SessionLookup, SessionTransport};

use crate::clock::Clock;
use crate::config::{AuthConfig, AuthMode};
use reqwest::header::HeaderMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors inside auth strategies; never returned by [`AuthResolver::resolve`]
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Identity transport error: {0}")]
    Transport(String),

    #[error("Identity service responded with HTTP {0}")]
    Status(u16),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Auth configuration error: {0}")]
    Config(String),
}

/// Optional collaborators for the `better-auth` chain
#[derive(Default, Clone)]
pub struct IdentityBindings {
    /// In-process API key lookup
    pub lookup: Option<Arc<dyn SessionLookup>>,
    /// Cookie-aware client
    pub cookie_client: Option<Arc<dyn CookieSessionClient>>,
    /// Service binding to the session endpoint
    pub binding: Option<Arc<dyn SessionTransport>>,
    /// Plain HTTP to the session endpoint
    pub http: Option<Arc<dyn SessionTransport>>,
}

impl IdentityBindings {
    /// HTTP-only bindings for the configured identity service
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let Some(client) = HttpIdentityClient::from_config(config)? else {
            return Ok(Self::default());
        };
        let client = Arc::new(client);
        Ok(Self {
            lookup: None,
            cookie_client: Some(client.clone()),
            binding: None,
            http: Some(client),
        })
    }
}

/// Resolves the session of a request
pub struct AuthResolver {
    strategies: Vec<Box<dyn AuthStrategy>>,
}

impl AuthResolver {
    pub fn new(strategies: Vec<Box<dyn AuthStrategy>>) -> Self {
        Self { strategies }
    }

    /// A resolver that leaves every request anonymous
    pub fn anonymous() -> Self {
        Self::new(Vec::new())
    }

    /// Builds the strategy chain for the configured auth mode
    ///
    /// # Arguments
    ///
    /// * `config` - Auth configuration
    /// * `bindings` - Identity service collaborators, used in `better-auth` mode
    /// * `clock` - Time source for expiry checks
    pub fn from_config(
        config: &AuthConfig,
        bindings: IdentityBindings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        let strategies: Vec<Box<dyn AuthStrategy>> = match config.mode {
            AuthMode::BetterAuth => {
                let cache = Arc::new(AuthCache::new(config.cache_ttl_secs, clock.clone()));
                vec![
                    Box::new(ApiKeyStrategy::new(
                        cache,
                        bindings.lookup,
                        bindings.http.clone(),
                        clock.clone(),
                    )),
                    Box::new(CookieStrategy::new(
                        bindings.cookie_client,
                        bindings.binding,
                        bindings.http,
                        clock,
                    )),
                ]
            }
            AuthMode::Jwt => vec![Box::new(JwtStrategy::new(&config.jwt)?)],
            AuthMode::None => Vec::new(),
        };
        Ok(Self::new(strategies))
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Returns the session for a request, or `None` for anonymous callers
    ///
    /// # Arguments
    ///
    /// * `headers` - Request headers
    /// * `upstream` - A session attached before the resolver ran
    pub async fn resolve(&self, headers: &HeaderMap, upstream: Option<Session>) -> Option<Session> {
        if let Some(session) = upstream {
            return Some(session);
        }

        for strategy in &self.strategies {
            match strategy.resolve(headers).await {
                StrategyOutcome::Resolved(session) => {
                    tracing::debug!(
                        strategy = strategy.name(),
                        user_id = %session.user_id,
                        "Request authenticated"
                    );
                    return Some(session);
                }
                StrategyOutcome::Skip => {}
                StrategyOutcome::Unavailable => {
                    tracing::debug!(strategy = strategy.name(), "Strategy yielded no session");
                }
            }
        }

        None
    }
}
