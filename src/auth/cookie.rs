//! Cookie session authentication

use super::session::{CreatedVia, Session, SessionPayload};
use super::strategy::{has_cookie, AuthStrategy, StrategyOutcome};
use super::transport::{CookieSessionClient, SessionTransport};
use crate::clock::Clock;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::sync::Arc;

/// Resolves a session from the request's cookies
///
/// Tries the cookie client first, then a direct request to the session
/// endpoint forwarding the original headers, through the service binding and
/// then plain HTTP.
pub struct CookieStrategy {
    client: Option<Arc<dyn CookieSessionClient>>,
    binding: Option<Arc<dyn SessionTransport>>,
    http: Option<Arc<dyn SessionTransport>>,
    clock: Arc<dyn Clock>,
}

impl CookieStrategy {
    pub fn new(
        client: Option<Arc<dyn CookieSessionClient>>,
        binding: Option<Arc<dyn SessionTransport>>,
        http: Option<Arc<dyn SessionTransport>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            binding,
            http,
            clock,
        }
    }

    fn accept(&self, payload: Option<SessionPayload>) -> Option<Session> {
        payload?.into_session(CreatedVia::Cookie, self.clock.now())
    }

    async fn via_client(&self, headers: &HeaderMap) -> Option<Session> {
        let client = self.client.as_ref()?;
        match client.get_session(headers).await {
            Ok(payload) => self.accept(payload),
            Err(e) => {
                tracing::debug!(error = %e, "Cookie session client failed");
                None
            }
        }
    }

    /// Body from the binding, or from HTTP when the binding fails or is empty
    async fn direct_body(&self, headers: &HeaderMap) -> Option<Vec<u8>> {
        if let Some(binding) = &self.binding {
            match binding.fetch_session(headers).await {
                Ok(body) if !body.is_empty() => return Some(body),
                Ok(_) => tracing::debug!("Session binding returned an empty body"),
                Err(e) => tracing::debug!(error = %e, "Session binding failed"),
            }
        }

        let http = self.http.as_ref()?;
        match http.fetch_session(headers).await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::debug!(error = %e, "Direct session request failed");
                None
            }
        }
    }
}

#[async_trait]
impl AuthStrategy for CookieStrategy {
    fn name(&self) -> &'static str {
        "cookie"
    }

    async fn resolve(&self, headers: &HeaderMap) -> StrategyOutcome {
        if !has_cookie(headers) {
            return StrategyOutcome::Skip;
        }

        if let Some(session) = self.via_client(headers).await {
            return StrategyOutcome::Resolved(session);
        }

        let payload = self
            .direct_body(headers)
            .await
            .and_then(|body| SessionPayload::parse(&body));
        match self.accept(payload) {
            Some(session) => StrategyOutcome::Resolved(session),
            None => StrategyOutcome::Unavailable,
        }
    }
}
