//! Integration tests for the request pipeline
//!
//! These tests serve target pages from wiremock and run reads and link
//! extractions end-to-end, through the cache and the response records.

use serde_json::{json, Value};
use std::sync::Arc;
use sumi_reader::auth::IdentityBindings;
use sumi_reader::cache::{ResponseRecordService, READ_PATH};
use sumi_reader::clock::{Clock, ManualClock, SystemClock};
use sumi_reader::config::{Config, FetchConfig};
use sumi_reader::fetch::HttpFetcher;
use sumi_reader::pipeline::{
    CacheStatus, LinksOptions, ReadOptions, RequestContext, RequestPipeline,
};
use sumi_reader::storage::StorageBackends;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLE: &str = r#"<!doctype html>
<html>
<head>
  <title>Field Notes</title>
  <meta name="description" content="Notes from the field">
</head>
<body>
  <header><p>Site header</p></header>
  <nav><a href="/home">Site navigation</a></nav>
  <main>
    <article>
      <h1>Field Notes</h1>
      <p>Main body text with a <a href="/docs/intro">link</a>.</p>
    </article>
  </main>
  <script>trackEverything()</script>
  <footer><a href="https://elsewhere.org/">Partner</a></footer>
</body>
</html>"#;

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html; charset=utf-8")
}

fn build_pipeline(config: &Config, storage: StorageBackends, clock: Arc<dyn Clock>) -> RequestPipeline {
    let fetcher = Arc::new(HttpFetcher::new(&FetchConfig::default()).unwrap());
    RequestPipeline::from_config(config, storage, fetcher, IdentityBindings::default(), clock)
        .unwrap()
}

fn memory_pipeline() -> (RequestPipeline, StorageBackends) {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let storage = StorageBackends::in_memory(clock.clone());
    (build_pipeline(&Config::default(), storage.clone(), clock), storage)
}

#[tokio::test]
async fn test_read_strips_boilerplate_and_caches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(html(ARTICLE))
        .expect(1)
        .mount(&server)
        .await;

    let (pipeline, _) = memory_pipeline();
    let ctx = RequestContext::new("GET");
    let url = format!("{}/article", server.uri());

    let first = pipeline.read(&ctx, ReadOptions::new(&url)).await;
    assert_eq!(first.status, 200);
    assert_eq!(first.cache, Some(CacheStatus::Miss));

    let body = first.json_body().unwrap();
    let markdown = body["markdown"].as_str().unwrap();
    assert!(markdown.contains("Main body text"));
    assert!(markdown.contains(&format!("({}/docs/intro)", server.uri())));
    assert!(!markdown.contains("trackEverything"));
    assert_eq!(body["metadata"]["title"], "Field Notes");
    assert_eq!(body["metadata"]["description"], "Notes from the field");
    assert_eq!(body["cached"], false);

    pipeline.flush().await;

    let second = pipeline.read(&ctx, ReadOptions::new(&url)).await;
    assert_eq!(second.cache, Some(CacheStatus::Hit));
    let cached = second.json_body().unwrap();
    assert_eq!(cached["cached"], true);
    assert_eq!(cached["markdown"], body["markdown"]);
}

#[tokio::test]
async fn test_navigation_removed_from_markdown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/snippet"))
        .respond_with(html(
            "<nav><a href=\"/\">Home</a></nav><article><h1>Title</h1><p>Hello <code>world()</code></p></article>",
        ))
        .mount(&server)
        .await;

    let (pipeline, _) = memory_pipeline();
    let response = pipeline
        .read(
            &RequestContext::new("GET"),
            ReadOptions::new(format!("{}/snippet", server.uri())),
        )
        .await;

    assert_eq!(
        response.json_body().unwrap()["markdown"],
        "# Title\n\nHello `world()`"
    );
}

#[tokio::test]
async fn test_exclude_non_main_tags_drops_navigation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(html(ARTICLE))
        .mount(&server)
        .await;

    let (pipeline, _) = memory_pipeline();
    let mut options = ReadOptions::new(format!("{}/article", server.uri()));
    options.exclude_non_main_tags = true;
    options.format = sumi_reader::pipeline::OutputFormat::Both;

    let body = pipeline
        .read(&RequestContext::new("GET"), options)
        .await
        .json_body()
        .unwrap();

    let markdown = body["markdown"].as_str().unwrap();
    assert!(!markdown.contains("Site navigation"));
    assert!(!markdown.contains("Site header"));
    assert!(!markdown.contains("Partner"));
    assert!(body["html"].as_str().unwrap().contains("Main body text"));
}

#[tokio::test]
async fn test_metrics_options_do_not_split_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(html(ARTICLE))
        .expect(1)
        .mount(&server)
        .await;

    let (pipeline, _) = memory_pipeline();
    let ctx = RequestContext::new("POST");
    let url = format!("{}/article", server.uri());

    let mut first = ReadOptions::new(&url);
    first.metrics_options = Some(json!({ "trace": "a" }));
    let response = pipeline.read(&ctx, first).await;
    assert_eq!(response.cache, Some(CacheStatus::Miss));
    pipeline.flush().await;

    let mut second = ReadOptions::new(&url);
    second.metrics_options = Some(json!({ "trace": "b", "sample": 0.5 }));
    let response = pipeline.read(&ctx, second).await;
    assert_eq!(response.cache, Some(CacheStatus::Hit));
    assert_eq!(response.json_body().unwrap()["cached"], true);
}

#[tokio::test]
async fn test_cache_ttl_bucket_splits_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(html(ARTICLE))
        .expect(2)
        .mount(&server)
        .await;

    let (pipeline, _) = memory_pipeline();
    let ctx = RequestContext::new("GET");
    let url = format!("{}/article", server.uri());

    pipeline.read(&ctx, ReadOptions::new(&url)).await;
    pipeline.flush().await;

    let mut weekly = ReadOptions::new(&url);
    weekly.cache_ttl_days = Some(7);
    let response = pipeline.read(&ctx, weekly).await;
    assert_eq!(response.cache, Some(CacheStatus::Miss));
}

#[tokio::test]
async fn test_response_record_is_immutable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(html(ARTICLE))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let storage = StorageBackends::open(&dir.path().join("reader.db"), dyn_clock.clone()).unwrap();
    let pipeline = build_pipeline(&Config::default(), storage.clone(), dyn_clock);

    let ctx = RequestContext::new("GET");
    let mut options = ReadOptions::new(format!("{}/article", server.uri()));
    options.bypass_cache = true;

    let response = pipeline.read(&ctx, options.clone()).await;
    pipeline.flush().await;

    let mut served: Value = response.json_body().unwrap();
    served.as_object_mut().unwrap().remove("cached");
    let (_, response_hash) = ResponseRecordService::hashes(
        READ_PATH,
        &serde_json::to_value(&options).unwrap(),
        &served,
    );

    let first = storage.records.find_by_hash(&response_hash).unwrap().unwrap();
    assert_eq!(first.path, READ_PATH);
    assert_eq!(first.updated_by, "anonymous");

    clock.advance_secs(120);
    pipeline.read(&ctx, options).await;
    pipeline.flush().await;

    let second = storage.records.find_by_hash(&response_hash).unwrap().unwrap();
    assert_eq!(second.content, first.content);
    assert_eq!(second.size, first.size);
    assert!(second.updated_at > first.updated_at);
}

#[tokio::test]
async fn test_upstream_failure_maps_to_502() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"{}".to_vec(), "application/json"))
        .mount(&server)
        .await;

    let (pipeline, storage) = memory_pipeline();
    let ctx = RequestContext::new("GET");

    for target in ["/missing", "/data.json"] {
        let response = pipeline
            .read(&ctx, ReadOptions::new(format!("{}{}", server.uri(), target)))
            .await;
        assert_eq!(response.status, 502, "target {}", target);
        assert_eq!(response.cache, None);
        assert_eq!(response.json_body().unwrap()["success"], false);
    }

    pipeline.flush().await;
    let entries = storage.activity.recent(10).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.status == 502));
}

#[tokio::test]
async fn test_links_same_origin_and_tree() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(html(ARTICLE))
        .mount(&server)
        .await;

    let (pipeline, _) = memory_pipeline();
    let ctx = RequestContext::new("GET");
    let url = format!("{}/article", server.uri());

    let mut flat = LinksOptions::new(&url);
    flat.same_origin = true;
    let body = pipeline.links(&ctx, flat).await.json_body().unwrap();
    let links: Vec<&str> = body["links"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(links.contains(&format!("{}/docs/intro", server.uri()).as_str()));
    assert!(links.iter().all(|l| l.starts_with(&server.uri())));

    let mut tree = LinksOptions::new(&url);
    tree.tree = true;
    let response = pipeline.links(&ctx, tree).await;
    assert_eq!(response.cache, Some(CacheStatus::Miss));
    let body = response.json_body().unwrap();
    assert_eq!(body["tree"]["name"], server.uri());
    assert!(body.get("links").is_none());
}
