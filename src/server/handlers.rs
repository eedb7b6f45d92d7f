//! Request handlers

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, ConnectInfo, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;

use super::AppState;
use crate::auth::Session;
use crate::pipeline::{LinksOptions, OutputFormat, PipelineResponse, ReadOptions, RequestContext};

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Query parameters of `GET /read`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadQuery {
    pub url: Option<String>,
    pub format: Option<OutputFormat>,
    pub include_metadata: Option<bool>,
    pub exclude_non_main_tags: Option<bool>,
    /// Comma-separated selectors
    pub remove_selectors: Option<String>,
    pub cache_ttl_days: Option<u32>,
    pub bypass_cache: Option<bool>,
}

impl From<ReadQuery> for ReadOptions {
    fn from(query: ReadQuery) -> Self {
        let mut options = ReadOptions::new(query.url.unwrap_or_default());
        options.format = query.format.unwrap_or_default();
        options.include_metadata = query.include_metadata.unwrap_or(true);
        options.exclude_non_main_tags = query.exclude_non_main_tags.unwrap_or(false);
        options.remove_selectors = query
            .remove_selectors
            .map(|raw| split_list(&raw))
            .unwrap_or_default();
        options.cache_ttl_days = query.cache_ttl_days;
        options.bypass_cache = query.bypass_cache.unwrap_or(false);
        options
    }
}

/// Query parameters of `GET /links`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinksQuery {
    pub url: Option<String>,
    pub tree: Option<bool>,
    pub same_origin: Option<bool>,
    pub cache_ttl_days: Option<u32>,
    pub bypass_cache: Option<bool>,
}

impl From<LinksQuery> for LinksOptions {
    fn from(query: LinksQuery) -> Self {
        let mut options = LinksOptions::new(query.url.unwrap_or_default());
        options.tree = query.tree.unwrap_or(false);
        options.same_origin = query.same_origin.unwrap_or(false);
        options.cache_ttl_days = query.cache_ttl_days;
        options.bypass_cache = query.bypass_cache.unwrap_or(false);
        options
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Caller address, preferring proxy headers over the socket peer
///
/// Checks `cf-connecting-ip`, the first `x-forwarded-for` entry and
/// `x-real-ip`, in that order.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    header("cf-connecting-ip")
        .or_else(|| header("x-forwarded-for"))
        .or_else(|| header("x-real-ip"))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

fn context(
    method: Method,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    session: Option<Extension<Session>>,
) -> RequestContext {
    RequestContext {
        method: method.to_string(),
        client_ip: client_ip(&headers, peer.map(|ConnectInfo(addr)| addr)),
        headers,
        upstream_session: session.map(|Extension(session)| session),
    }
}

/// Maps a pipeline response onto HTTP
fn respond(response: PipelineResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Some(cache) = response.cache {
        headers.insert("x-cache", HeaderValue::from_static(cache.as_str()));
    }
    if let Some(seconds) = response.retry_after {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(seconds));
    }

    (status, headers, Body::from(response.body)).into_response()
}

fn bad_body(rejection: JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": rejection.body_text() })),
    )
        .into_response()
}

pub async fn read_query(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    session: Option<Extension<Session>>,
    Query(query): Query<ReadQuery>,
) -> Response {
    let ctx = context(method, headers, peer, session);
    respond(state.pipeline.read(&ctx, query.into()).await)
}

pub async fn read_json(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    session: Option<Extension<Session>>,
    body: Result<Json<ReadOptions>, JsonRejection>,
) -> Response {
    let Json(options) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let ctx = context(method, headers, peer, session);
    respond(state.pipeline.read(&ctx, options).await)
}

pub async fn links_query(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    session: Option<Extension<Session>>,
    Query(query): Query<LinksQuery>,
) -> Response {
    let ctx = context(method, headers, peer, session);
    respond(state.pipeline.links(&ctx, query.into()).await)
}

pub async fn links_json(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    session: Option<Extension<Session>>,
    body: Result<Json<LinksOptions>, JsonRejection>,
) -> Response {
    let Json(options) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let ctx = context(method, headers, peer, session);
    respond(state.pipeline.links(&ctx, options).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.3"));
        assert_eq!(client_ip(&headers, None).as_deref(), Some("10.0.0.3"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("10.0.0.2, 172.16.0.1"),
        );
        assert_eq!(client_ip(&headers, None).as_deref(), Some("10.0.0.2"));

        headers.insert("cf-connecting-ip", HeaderValue::from_static("10.0.0.1"));
        assert_eq!(client_ip(&headers, None).as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let peer: SocketAddr = "192.0.2.7:4000".parse().unwrap();
        assert_eq!(
            client_ip(&HeaderMap::new(), Some(peer)).as_deref(),
            Some("192.0.2.7")
        );
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }

    #[test]
    fn test_read_query_splits_selectors() {
        let options: ReadOptions = ReadQuery {
            url: Some("https://example.com".to_string()),
            remove_selectors: Some(".ad, #promo,,".to_string()),
            ..ReadQuery::default()
        }
        .into();

        assert_eq!(options.remove_selectors, vec![".ad", "#promo"]);
        assert!(options.include_metadata);
        assert_eq!(options.format, OutputFormat::Markdown);
    }
}
