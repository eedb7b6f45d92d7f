//! Session types and the identity service wire shape

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a session was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatedVia {
    Cookie,
    ApiKey,
    Jwt,
    None,
}

/// Profile fields of the signed-in user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    /// Billing plan, `pro` selects the higher rate-limit tier
    pub plan: Option<String>,
}

/// An authenticated caller, rebuilt for every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_via: CreatedVia,
    pub user: Option<UserProfile>,
}

impl Session {
    /// True while the session has no expiry or expires after `now`
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at > now).unwrap_or(true)
    }

    pub fn plan(&self) -> Option<&str> {
        self.user.as_ref()?.plan.as_deref()
    }
}

/// Body of the identity service's session endpoint
///
/// The endpoint answers `null` or an object with `session` and `user`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionPayload {
    pub session: Option<SessionData>,
    pub user: Option<UserData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub id: String,
    pub user_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserData {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub plan: Option<String>,
}

impl SessionPayload {
    /// Parses a response body; empty bodies and `null` yield `None`
    pub fn parse(body: &[u8]) -> Option<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        serde_json::from_slice::<Option<SessionPayload>>(body)
            .ok()
            .flatten()
    }

    /// Builds a session when both halves are present and unexpired
    pub fn into_session(self, created_via: CreatedVia, now: DateTime<Utc>) -> Option<Session> {
        let (session, user) = (self.session?, self.user?);
        let session = Session {
            session_id: session.id,
            user_id: session.user_id.unwrap_or_else(|| user.id.clone()),
            expires_at: session.expires_at,
            created_via,
            user: Some(UserProfile {
                email: user.email,
                name: user.name,
                picture: user.image,
                plan: user.plan,
            }),
        };
        session.is_live(now).then_some(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_parse_null_and_empty() {
        assert!(SessionPayload::parse(b"").is_none());
        assert!(SessionPayload::parse(b"  \n").is_none());
        assert!(SessionPayload::parse(b"null").is_none());
        assert!(SessionPayload::parse(b"<html>").is_none());
    }

    #[test]
    fn test_into_session_requires_user() {
        let now = Utc::now();
        let payload = SessionPayload::parse(br#"{"session":{"id":"s1"},"user":null}"#).unwrap();
        assert!(payload.into_session(CreatedVia::Cookie, now).is_none());
    }

    #[test]
    fn test_into_session_rejects_expired() {
        let now = Utc::now();
        let body = format!(
            r#"{{"session":{{"id":"s1","userId":"u1","expiresAt":"{}"}},"user":{{"id":"u1"}}}}"#,
            (now - Duration::minutes(1)).to_rfc3339()
        );
        let payload = SessionPayload::parse(body.as_bytes()).unwrap();
        assert!(payload.into_session(CreatedVia::ApiKey, now).is_none());
    }

    #[test]
    fn test_into_session_maps_profile() {
        let now = Utc::now();
        let body = br#"{"session":{"id":"s1"},"user":{"id":"u1","email":"a@example.com","image":"https://example.com/a.png","plan":"pro"}}"#;
        let session = SessionPayload::parse(body)
            .unwrap()
            .into_session(CreatedVia::ApiKey, now)
            .unwrap();

        assert_eq!(session.user_id, "u1");
        assert_eq!(session.created_via, CreatedVia::ApiKey);
        assert_eq!(session.plan(), Some("pro"));
        assert_eq!(
            session.user.unwrap().picture.as_deref(),
            Some("https://example.com/a.png")
        );
    }
}
