//! API-key authentication
//!
//! Resolution order for a key: local cache, then the in-process lookup, then
//! the identity service over HTTP. The HTTP fallback runs only when the
//! in-process lookup is missing or fails.

use super::cache::AuthCache;
use super::session::{CreatedVia, Session, SessionPayload};
use super::strategy::{extract_api_key, AuthStrategy, StrategyOutcome};
use super::transport::{SessionLookup, SessionTransport};
use crate::clock::Clock;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::sync::Arc;

pub struct ApiKeyStrategy {
    cache: Arc<AuthCache>,
    lookup: Option<Arc<dyn SessionLookup>>,
    http: Option<Arc<dyn SessionTransport>>,
    clock: Arc<dyn Clock>,
}

impl ApiKeyStrategy {
    pub fn new(
        cache: Arc<AuthCache>,
        lookup: Option<Arc<dyn SessionLookup>>,
        http: Option<Arc<dyn SessionTransport>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            lookup,
            http,
            clock,
        }
    }

    async fn via_http(&self, key: &str) -> Option<SessionPayload> {
        let http = self.http.as_ref()?;

        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(key).ok()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", key)).ok()?;
        headers.insert("x-api-key", key_value);
        headers.insert(AUTHORIZATION, bearer);

        match http.fetch_session(&headers).await {
            Ok(body) => SessionPayload::parse(&body),
            Err(e) => {
                tracing::debug!(error = %e, "API key HTTP lookup failed");
                None
            }
        }
    }

    async fn lookup(&self, key: &str) -> Option<SessionPayload> {
        if let Some(lookup) = &self.lookup {
            match lookup.lookup_api_key(key).await {
                Ok(payload) => return payload,
                Err(e) => {
                    tracing::debug!(error = %e, "In-process API key lookup failed, trying HTTP");
                }
            }
        }
        self.via_http(key).await
    }

    fn accept(&self, payload: SessionPayload) -> Option<Session> {
        payload.into_session(CreatedVia::ApiKey, self.clock.now())
    }
}

#[async_trait]
impl AuthStrategy for ApiKeyStrategy {
    fn name(&self) -> &'static str {
        "api-key"
    }

    async fn resolve(&self, headers: &HeaderMap) -> StrategyOutcome {
        let Some(key) = extract_api_key(headers) else {
            return StrategyOutcome::Skip;
        };

        if let Some(session) = self.cache.get(key) {
            return StrategyOutcome::Resolved(session);
        }

        match self.lookup(key).await.and_then(|p| self.accept(p)) {
            Some(session) => {
                self.cache.insert(key, &session);
                StrategyOutcome::Resolved(session)
            }
            None => StrategyOutcome::Unavailable,
        }
    }
}
