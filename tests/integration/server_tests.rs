//! Integration tests for the HTTP router

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use sumi_reader::auth::IdentityBindings;
use sumi_reader::clock::{Clock, SystemClock};
use sumi_reader::config::{Config, QuotaConfig};
use sumi_reader::fetch::HttpFetcher;
use sumi_reader::pipeline::RequestPipeline;
use sumi_reader::server::{create_router, AppState};
use sumi_reader::storage::StorageBackends;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn target_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            b"<html><head><title>Page</title></head><body><p>Hello reader</p></body></html>"
                .to_vec(),
            "text/html",
        ))
        .mount(&server)
        .await;
    server
}

fn app(config: Config) -> Router {
    create_router(state(config))
}

fn state(config: Config) -> AppState {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let pipeline = RequestPipeline::from_config(
        &config,
        StorageBackends::in_memory(clock.clone()),
        Arc::new(HttpFetcher::new(&config.fetch).unwrap()),
        IdentityBindings::default(),
        clock,
    )
    .unwrap();
    AppState::new(pipeline)
}

fn get(uri: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

async fn json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = app(Config::default())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_read_sets_cache_header() {
    let server = target_server().await;
    let app = app(Config::default());
    let uri = format!("/read?url={}/page&format=both", server.uri());

    let response = app.clone().oneshot(get(&uri, "10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-cache"], "MISS");
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );

    let body = json(response).await;
    assert_eq!(body["success"], true);
    assert!(body["markdown"].as_str().unwrap().contains("Hello reader"));
    assert!(body["html"].as_str().unwrap().contains("Hello reader"));
    assert_eq!(body["metadata"]["title"], "Page");
}

#[tokio::test]
async fn test_post_read_json() {
    let server = target_server().await;
    let request = Request::builder()
        .method("POST")
        .uri("/read")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "url": format!("{}/page", server.uri()), "includeMetadata": false })
                .to_string(),
        ))
        .unwrap();

    let response = app(Config::default()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert!(body.get("metadata").is_none());
}

#[tokio::test]
async fn test_get_and_post_cache_separately() {
    let server = target_server().await;
    let state = state(Config::default());
    let app = create_router(state.clone());
    let target = format!("{}/page", server.uri());

    let response = app
        .clone()
        .oneshot(get(&format!("/read?url={}", target), "10.0.0.1"))
        .await
        .unwrap();
    assert_eq!(response.headers()["x-cache"], "MISS");

    state.pipeline.flush().await;

    let request = Request::builder()
        .method("POST")
        .uri("/read")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "10.0.0.1")
        .body(Body::from(serde_json::json!({ "url": target }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-cache"], "MISS");

    state.pipeline.flush().await;
    let response = app
        .oneshot(get(&format!("/read?url={}", target), "10.0.0.1"))
        .await
        .unwrap();
    assert_eq!(response.headers()["x-cache"], "HIT");
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let request = Request::builder()
        .method("POST")
        .uri("/read")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app(Config::default()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["success"], false);
}

#[tokio::test]
async fn test_missing_url_is_422() {
    let response = app(Config::default())
        .oneshot(get("/read", "10.0.0.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_rate_limit_response() {
    let server = target_server().await;
    let mut config = Config::default();
    config.rate_limit.0.entry("read".to_string()).or_default().insert(
        "free".to_string(),
        QuotaConfig {
            limit: 2,
            window_secs: 60,
        },
    );
    let app = app(config);
    let uri = format!("/read?url={}/page", server.uri());

    for _ in 0..2 {
        let response = app.clone().oneshot(get(&uri, "10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.clone().oneshot(get(&uri, "10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    assert!(response.headers().get("x-cache").is_none());

    let body = json(response).await;
    assert_eq!(body["operation"], "read");
    assert_eq!(body["retryAfterSeconds"], retry_after);

    // A different client has its own window
    let response = app.clone().oneshot(get(&uri, "10.0.0.2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Links are counted separately
    let links = format!("/links?url={}/page", server.uri());
    let response = app.oneshot(get(&links, "10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_links_tree_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            br#"<a href="/a/b">B</a><a href="/a/c">C</a>"#.to_vec(),
            "text/html",
        ))
        .mount(&server)
        .await;

    let response = app(Config::default())
        .oneshot(get(&format!("/links?url={}/&tree=true", server.uri()), "10.0.0.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    let a = &body["tree"]["children"][0];
    assert_eq!(a["name"], "a");
    assert_eq!(a["children"].as_array().unwrap().len(), 2);
}
