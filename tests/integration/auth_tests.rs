//! Integration tests for request authentication
//!
//! The identity service is a wiremock server answering the session endpoint.

use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, COOKIE};
use serde_json::{json, Value};
use std::sync::Arc;
use sumi_reader::auth::{AuthResolver, CreatedVia, IdentityBindings, JwtClaims};
use sumi_reader::clock::{Clock, SystemClock};
use sumi_reader::config::{AuthConfig, AuthMode, Config, JwtConfig};
use sumi_reader::fetch::HttpFetcher;
use sumi_reader::pipeline::{ReadOptions, RequestContext, RequestPipeline};
use sumi_reader::storage::StorageBackends;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SESSION_PATH: &str = "/api/auth/get-session";

fn session_body(user: &str, expires_at: &str, plan: Option<&str>) -> Value {
    json!({
        "session": { "id": format!("sess-{}", user), "userId": user, "expiresAt": expires_at },
        "user": { "id": user, "email": format!("{}@example.com", user), "plan": plan },
    })
}

fn better_auth_config(server: &MockServer) -> AuthConfig {
    AuthConfig {
        mode: AuthMode::BetterAuth,
        identity_base_url: Some(server.uri()),
        ..AuthConfig::default()
    }
}

fn resolver(config: &AuthConfig) -> AuthResolver {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let bindings = IdentityBindings::from_config(config).unwrap();
    AuthResolver::from_config(config, bindings, clock).unwrap()
}

fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        headers.insert(*name, HeaderValue::from_str(value).unwrap());
    }
    headers
}

#[tokio::test]
async fn test_api_key_takes_precedence_over_cookie() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SESSION_PATH))
        .and(header("x-api-key", "key-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(
            "key-user",
            "2999-01-01T00:00:00Z",
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SESSION_PATH))
        .and(header_exists("cookie"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(
            "cookie-user",
            "2999-01-01T00:00:00Z",
            None,
        )))
        .expect(0)
        .mount(&server)
        .await;

    let resolver = resolver(&better_auth_config(&server));
    let request = headers(&[("x-api-key", "key-123"), ("cookie", "session=abc")]);

    let session = resolver.resolve(&request, None).await.unwrap();
    assert_eq!(session.user_id, "key-user");
    assert_eq!(session.created_via, CreatedVia::ApiKey);
}

#[tokio::test]
async fn test_api_key_session_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SESSION_PATH))
        .and(header("authorization", "Bearer key-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(
            "key-user",
            "2999-01-01T00:00:00Z",
            Some("pro"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver(&better_auth_config(&server));
    let request = headers(&[("authorization", "Bearer key-123")]);

    for _ in 0..3 {
        let session = resolver.resolve(&request, None).await.unwrap();
        assert_eq!(session.plan(), Some("pro"));
    }
}

#[tokio::test]
async fn test_unknown_key_falls_through_to_cookie() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SESSION_PATH))
        .and(header("x-api-key", "stale"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SESSION_PATH))
        .and(header("cookie", "session=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(
            "cookie-user",
            "2999-01-01T00:00:00Z",
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver(&better_auth_config(&server));
    let request = headers(&[("x-api-key", "stale"), ("cookie", "session=abc")]);

    let session = resolver.resolve(&request, None).await.unwrap();
    assert_eq!(session.user_id, "cookie-user");
    assert_eq!(session.created_via, CreatedVia::Cookie);
}

#[tokio::test]
async fn test_expired_session_is_anonymous() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(
            "old-user",
            "2001-01-01T00:00:00Z",
            None,
        )))
        .mount(&server)
        .await;

    let resolver = resolver(&better_auth_config(&server));
    let request = headers(&[("cookie", "session=old")]);

    assert!(resolver.resolve(&request, None).await.is_none());
}

#[tokio::test]
async fn test_identity_outage_is_anonymous() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let resolver = resolver(&better_auth_config(&server));
    let request = headers(&[("x-api-key", "key-123"), ("cookie", "session=abc")]);

    assert!(resolver.resolve(&request, None).await.is_none());
}

#[tokio::test]
async fn test_no_credentials_never_calls_identity_service() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let resolver = resolver(&better_auth_config(&server));
    assert!(resolver.resolve(&HeaderMap::new(), None).await.is_none());
}

#[tokio::test]
async fn test_jwt_mode() {
    let config = AuthConfig {
        mode: AuthMode::Jwt,
        jwt: JwtConfig {
            secret: Some("test-secret".to_string()),
            issuer: None,
            audience: None,
        },
        ..AuthConfig::default()
    };
    let resolver = resolver(&config);

    let claims = JwtClaims {
        sub: "jwt-user".to_string(),
        email: None,
        name: Some("Jay".to_string()),
        picture: None,
        plan: Some("pro".to_string()),
        exp: Some(chrono::Utc::now().timestamp() + 3600),
        jti: None,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap();
    let forged = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"other-secret"),
    )
    .unwrap();

    let mut request = HeaderMap::new();
    request.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    let session = resolver.resolve(&request, None).await.unwrap();
    assert_eq!(session.user_id, "jwt-user");
    assert_eq!(session.session_id, "jwt_jwt-user");
    assert_eq!(session.created_via, CreatedVia::Jwt);

    request.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", forged)).unwrap(),
    );
    assert!(resolver.resolve(&request, None).await.is_none());
}

#[tokio::test]
async fn test_pipeline_attributes_activity_to_user() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(
            "reader",
            "2999-01-01T00:00:00Z",
            None,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"<p>Hello</p>".to_vec(), "text/html"),
        )
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.auth = better_auth_config(&server);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let storage = StorageBackends::in_memory(clock.clone());
    let pipeline = RequestPipeline::from_config(
        &config,
        storage.clone(),
        Arc::new(HttpFetcher::new(&config.fetch).unwrap()),
        IdentityBindings::from_config(&config.auth).unwrap(),
        clock,
    )
    .unwrap();

    let mut ctx = RequestContext::new("GET");
    ctx.headers
        .insert(COOKIE, HeaderValue::from_static("session=abc"));

    let response = pipeline
        .read(&ctx, ReadOptions::new(format!("{}/page", server.uri())))
        .await;
    assert_eq!(response.status, 200);
    pipeline.flush().await;

    let entries = storage.activity.recent(1).unwrap();
    assert_eq!(entries[0].user_id.as_deref(), Some("reader"));
}
