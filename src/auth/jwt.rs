//! JWT bearer authentication

use super::session::{CreatedVia, Session, UserProfile};
use super::strategy::{bearer_token, AuthStrategy, StrategyOutcome};
use super::AuthError;
use crate::config::JwtConfig;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Claims read from a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl JwtClaims {
    /// Builds a session; the session id defaults to `jwt_{sub}`
    pub fn into_session(self) -> Session {
        Session {
            session_id: self.jti.unwrap_or_else(|| format!("jwt_{}", self.sub)),
            user_id: self.sub,
            expires_at: self
                .exp
                .and_then(|exp| Utc.timestamp_opt(exp, 0).single()),
            created_via: CreatedVia::Jwt,
            user: Some(UserProfile {
                email: self.email,
                name: self.name,
                picture: self.picture,
                plan: self.plan,
            }),
        }
    }
}

/// Verifies HS256 bearer tokens
pub struct JwtStrategy {
    key: DecodingKey,
    validation: Validation,
}

impl JwtStrategy {
    pub fn new(config: &JwtConfig) -> Result<Self, AuthError> {
        let secret = config
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::Config("JWT secret is not configured".to_string()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = HashSet::from(["sub".to_string()]);
        match &config.issuer {
            Some(issuer) => validation.set_issuer(&[issuer]),
            None => validation.iss = None,
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> Result<JwtClaims, AuthError> {
        Ok(decode::<JwtClaims>(token, &self.key, &self.validation)?.claims)
    }
}

#[async_trait]
impl AuthStrategy for JwtStrategy {
    fn name(&self) -> &'static str {
        "jwt"
    }

    async fn resolve(&self, headers: &HeaderMap) -> StrategyOutcome {
        let Some(token) = bearer_token(headers) else {
            return StrategyOutcome::Skip;
        };

        match self.verify(token) {
            Ok(claims) => StrategyOutcome::Resolved(claims.into_session()),
            Err(e) => {
                tracing::warn!(error = %e, "JWT verification failed");
                StrategyOutcome::Unavailable
            }
        }
    }
}
