//! The request pipeline
//!
//! Every request runs the same sequence: resolve the caller, admit it against
//! the rate limiter, build the cache key and look it up. A hit returns the
//! stored payload untouched. A miss fetches the target, cleans it, converts it
//! and answers; the cache write, the response record and the activity entry
//! are deferred to background tasks.

mod links;
mod options;
mod response;
mod tasks;

pub use links::{build_link_tree, LinkNode};
pub use options::{LinksOptions, OutputFormat, ReadOptions};
pub use response::{CacheStatus, PipelineResponse};
pub use tasks::{BackgroundTasks, TaskFailure};

use crate::auth::{AuthResolver, IdentityBindings, Session};
use crate::cache::{CacheKey, Endpoint, ResponseRecordService, LINKS_PATH, READ_PATH};
use crate::clean::{CleanError, CleanOptions, CleaningEngine, PageMetadata};
use crate::clock::Clock;
use crate::config::Config;
use crate::fetch::Fetcher;
use crate::markdown::MarkdownConverter;
use crate::rate_limit::{EphemeralCache, RateLimiter, SlidingWindowBackend};
use crate::storage::{
    ActivityEntry, ActivityLog, KvMetadata, PutOptions, RetryPolicy, StorageBackends, StorageRetry,
};
use crate::url::{parse_target_url, same_host};
use crate::ReaderError;
use reqwest::header::HeaderMap;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Rate-limit operation of read requests
pub const OP_READ: &str = "read";

/// Rate-limit operation of link extraction requests
pub const OP_LINKS: &str = "links";

/// Longest cache lifetime a caller may request
pub const MAX_CACHE_TTL_DAYS: u32 = 365;

/// How often idle rate limit state is dropped
pub const LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Per-request inputs besides the options
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// HTTP method, part of the cache key
    pub method: String,
    pub headers: HeaderMap,
    pub client_ip: Option<String>,
    /// Session attached before the pipeline ran
    pub upstream_session: Option<Session>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Self::default()
        }
    }
}

/// Behaviour switches taken from the configuration
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub cache_enabled: bool,
    pub default_ttl_secs: u64,
    /// Hide error detail from callers
    pub production: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_enabled: config.cache.enabled,
            default_ttl_secs: config.cache.default_ttl_secs,
            production: config.server.environment.is_production(),
        }
    }
}

/// Everything a pipeline is assembled from
pub struct PipelineComponents {
    pub auth: AuthResolver,
    pub limiter: RateLimiter,
    pub storage: StorageBackends,
    pub retry: RetryPolicy,
    pub fetcher: Arc<dyn Fetcher>,
    pub clock: Arc<dyn Clock>,
    pub settings: PipelineSettings,
}

/// A produced response with what the cache needs to know about it
struct Produced {
    body: Value,
    metadata: PageMetadata,
}

/// Serves read and link extraction requests
pub struct RequestPipeline {
    auth: AuthResolver,
    limiter: Arc<RateLimiter>,
    kv: StorageRetry,
    records: Arc<ResponseRecordService>,
    activity: Arc<dyn ActivityLog>,
    fetcher: Arc<dyn Fetcher>,
    cleaner: CleaningEngine,
    converter: MarkdownConverter,
    tasks: BackgroundTasks,
    clock: Arc<dyn Clock>,
    settings: PipelineSettings,
}

impl RequestPipeline {
    /// Assembles a pipeline; must be called inside a Tokio runtime
    pub fn new(components: PipelineComponents) -> Self {
        let PipelineComponents {
            auth,
            limiter,
            storage,
            retry,
            fetcher,
            clock,
            settings,
        } = components;

        let limiter = Arc::new(limiter);
        let tasks = BackgroundTasks::new();
        let sweeping = Arc::downgrade(&limiter);
        tasks.every("limiter-sweep", LIMITER_SWEEP_INTERVAL, move || {
            let sweeping = sweeping.clone();
            async move {
                match sweeping.upgrade() {
                    Some(limiter) => {
                        limiter.sweep().await;
                        true
                    }
                    None => false,
                }
            }
        });

        Self {
            auth,
            limiter,
            kv: StorageRetry::new(storage.kv, retry),
            records: Arc::new(ResponseRecordService::new(storage.records, clock.clone())),
            activity: storage.activity,
            fetcher,
            cleaner: CleaningEngine::new(),
            converter: MarkdownConverter::new(),
            tasks,
            clock,
            settings,
        }
    }

    /// Builds a pipeline from configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `storage` - Storage backends
    /// * `fetcher` - Target page source
    /// * `bindings` - Identity service collaborators
    /// * `clock` - Time source
    ///
    /// # Returns
    ///
    /// * `Ok(RequestPipeline)` - Ready to serve
    /// * `Err(ReaderError)` - The auth chain could not be built
    pub fn from_config(
        config: &Config,
        storage: StorageBackends,
        fetcher: Arc<dyn Fetcher>,
        bindings: IdentityBindings,
        clock: Arc<dyn Clock>,
    ) -> crate::Result<Self> {
        let auth = AuthResolver::from_config(&config.auth, bindings, clock.clone())?;
        let limiter = RateLimiter::new(
            Arc::new(SlidingWindowBackend::new(clock.clone())),
            config.rate_limit.clone(),
            Arc::new(EphemeralCache::new()),
            clock.clone(),
        );
        let retry = RetryPolicy {
            base_delay: Duration::from_millis(config.storage.retry_base_delay_ms),
            max_attempts: config.storage.retry_max_attempts,
        };

        Ok(Self::new(PipelineComponents {
            auth,
            limiter,
            storage,
            retry,
            fetcher,
            clock,
            settings: PipelineSettings::from_config(config),
        }))
    }

    /// Background task set of this pipeline
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Waits for all deferred work
    pub async fn flush(&self) {
        self.tasks.flush().await;
    }

    /// Stops housekeeping and drains deferred work
    pub async fn shutdown(&self) {
        self.tasks.shutdown().await;
    }

    /// Reads a page and returns it as markdown and/or cleaned HTML
    pub async fn read(&self, ctx: &RequestContext, options: ReadOptions) -> PipelineResponse {
        let started = Instant::now();
        let session = self
            .auth
            .resolve(&ctx.headers, ctx.upstream_session.clone())
            .await;

        if let Err(e) = self
            .limiter
            .check(OP_READ, session.as_ref(), ctx.client_ip.as_deref())
            .await
        {
            return PipelineResponse::rate_limited(&e);
        }

        let target = match parse_target_url(&options.url)
            .map_err(ReaderError::from)
            .and_then(|target| validate_ttl(options.cache_ttl_days).map(|_| target))
        {
            Ok(target) => target,
            Err(e) => return self.fail(OP_READ, &options.url, e, session.as_ref(), started),
        };

        let options_json = serde_json::to_value(&options).unwrap_or_default();
        let key = CacheKey::new(
            &ctx.method,
            Endpoint::Read,
            target.as_str(),
            &options_json,
            options.cache_ttl_days,
        );

        if let Some(hit) = self.lookup(&key, options.bypass_cache).await {
            self.log_activity(OP_READ, &target, 200, true, session.as_ref(), started);
            return PipelineResponse::hit(hit);
        }

        match self.produce_read(&target, &options).await {
            Ok(produced) => self.serve_miss(
                OP_READ,
                READ_PATH,
                &target,
                key,
                options_json,
                produced,
                session.as_ref(),
                started,
            ),
            Err(e) => self.fail(OP_READ, target.as_str(), e, session.as_ref(), started),
        }
    }

    /// Extracts the links of a page as a flat list or a path tree
    pub async fn links(&self, ctx: &RequestContext, options: LinksOptions) -> PipelineResponse {
        let started = Instant::now();
        let session = self
            .auth
            .resolve(&ctx.headers, ctx.upstream_session.clone())
            .await;

        if let Err(e) = self
            .limiter
            .check(OP_LINKS, session.as_ref(), ctx.client_ip.as_deref())
            .await
        {
            return PipelineResponse::rate_limited(&e);
        }

        let target = match parse_target_url(&options.url)
            .map_err(ReaderError::from)
            .and_then(|target| validate_ttl(options.cache_ttl_days).map(|_| target))
        {
            Ok(target) => target,
            Err(e) => return self.fail(OP_LINKS, &options.url, e, session.as_ref(), started),
        };

        let options_json = serde_json::to_value(&options).unwrap_or_default();
        let endpoint = if options.tree {
            Endpoint::Links
        } else {
            Endpoint::LinksFlat
        };
        let key = CacheKey::new(
            &ctx.method,
            endpoint,
            target.as_str(),
            &options_json,
            options.cache_ttl_days,
        );

        if let Some(hit) = self.lookup(&key, options.bypass_cache).await {
            self.log_activity(OP_LINKS, &target, 200, true, session.as_ref(), started);
            return PipelineResponse::hit(hit);
        }

        match self.produce_links(&target, &options).await {
            Ok(produced) => self.serve_miss(
                OP_LINKS,
                LINKS_PATH,
                &target,
                key,
                options_json,
                produced,
                session.as_ref(),
                started,
            ),
            Err(e) => self.fail(OP_LINKS, target.as_str(), e, session.as_ref(), started),
        }
    }

    async fn produce_read(&self, target: &Url, options: &ReadOptions) -> crate::Result<Produced> {
        let page = self.fetcher.fetch(target.as_str()).await?;
        let base = Url::parse(&page.final_url).unwrap_or_else(|_| target.clone());

        let cleaned = self.cleaner.clean(
            &page.html,
            &base,
            &CleanOptions {
                exclude_non_main_tags: options.exclude_non_main_tags,
                remove_selectors: options.remove_selectors.clone(),
            },
        )?;

        let mut body = json!({ "success": true, "url": target.as_str() });
        if options.format.wants_markdown() {
            body["markdown"] = Value::String(self.converter.convert(&cleaned.html));
        }
        if options.format.wants_html() {
            body["html"] = Value::String(cleaned.html);
        }
        if options.include_metadata {
            body["metadata"] = serde_json::to_value(&cleaned.metadata)?;
        }

        Ok(Produced {
            body,
            metadata: cleaned.metadata,
        })
    }

    async fn produce_links(&self, target: &Url, options: &LinksOptions) -> crate::Result<Produced> {
        let page = self.fetcher.fetch(target.as_str()).await?;
        let base = Url::parse(&page.final_url).unwrap_or_else(|_| target.clone());
        let extracted = self.cleaner.extract_links(&page.html, &base)?;

        let links: Vec<String> = extracted
            .links
            .into_iter()
            .filter(|link| {
                !options.same_origin
                    || Url::parse(link)
                        .map(|url| same_host(&url, target))
                        .unwrap_or(false)
            })
            .collect();

        let body = if options.tree {
            json!({
                "success": true,
                "url": target.as_str(),
                "tree": build_link_tree(target, &links),
            })
        } else {
            json!({ "success": true, "url": target.as_str(), "links": links })
        };

        Ok(Produced {
            body,
            metadata: extracted.metadata,
        })
    }

    /// Cached payload for `key`, unless caching is off or bypassed
    async fn lookup(&self, key: &CacheKey, bypass: bool) -> Option<Vec<u8>> {
        if !self.settings.cache_enabled || bypass {
            return None;
        }

        let key = key.to_string();
        match self.kv.store().get(&key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn serve_miss(
        &self,
        operation: &'static str,
        record_path: &'static str,
        target: &Url,
        key: CacheKey,
        options_json: Value,
        produced: Produced,
        session: Option<&Session>,
        started: Instant,
    ) -> PipelineResponse {
        let Produced { body, metadata } = produced;

        if self.settings.cache_enabled {
            self.defer_cache_write(key, &body, &metadata);
        }
        self.defer_record(record_path, options_json, body.clone(), session);
        self.log_activity(operation, target, 200, false, session, started);

        let mut served = body;
        served["cached"] = Value::Bool(false);
        PipelineResponse::miss(&served)
    }

    fn defer_cache_write(&self, key: CacheKey, body: &Value, metadata: &PageMetadata) {
        let mut cached = body.clone();
        cached["cached"] = Value::Bool(true);
        let bytes = match serde_json::to_vec(&cached) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize cache entry");
                return;
            }
        };

        let put_options = PutOptions {
            expiration_ttl: Some(key.ttl_bucket.ttl_secs(self.settings.default_ttl_secs)),
            metadata: Some(KvMetadata {
                timestamp: self.clock.now_ms(),
                title: metadata.display_title().map(str::to_string),
                description: metadata.display_description().map(str::to_string),
            }),
        };

        let kv = self.kv.clone();
        let key = key.to_string();
        self.tasks.defer("cache-write", async move {
            kv.put(&key, &bytes, &put_options).await
        });
    }

    fn defer_record(
        &self,
        path: &'static str,
        options_json: Value,
        body: Value,
        session: Option<&Session>,
    ) {
        let records = self.records.clone();
        let updated_by = session
            .map(|s| s.user_id.clone())
            .unwrap_or_else(|| "anonymous".to_string());
        self.tasks.defer_blocking("response-record", move || {
            records
                .store(path, &options_json, &body, &updated_by)
                .map(|_| ())
        });
    }

    fn log_activity(
        &self,
        operation: &'static str,
        target: &Url,
        status: u16,
        cached: bool,
        session: Option<&Session>,
        started: Instant,
    ) {
        let entry = ActivityEntry {
            user_id: session.map(|s| s.user_id.clone()),
            operation: operation.to_string(),
            target_url: target.to_string(),
            status,
            cached,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: self.clock.now(),
        };
        let activity = self.activity.clone();
        self.tasks
            .defer_blocking("activity-log", move || activity.record(&entry));
    }

    /// Structured failure; detail is withheld in production
    fn fail(
        &self,
        operation: &'static str,
        url: &str,
        error: ReaderError,
        session: Option<&Session>,
        started: Instant,
    ) -> PipelineResponse {
        let status = failure_status(&error);
        tracing::info!(operation, url, status, error = %error, "Request failed");

        if let Ok(target) = Url::parse(url) {
            self.log_activity(operation, &target, status, false, session, started);
        }

        let body = if self.settings.production {
            json!({ "success": false, "url": url, "error": public_message(status) })
        } else {
            json!({
                "success": false,
                "url": url,
                "error": error.to_string(),
                "issues": issues(&error),
            })
        };
        PipelineResponse::json(status, &body, None)
    }
}

fn validate_ttl(days: Option<u32>) -> crate::Result<()> {
    match days {
        Some(days) if days == 0 || days > MAX_CACHE_TTL_DAYS => Err(ReaderError::Validation(
            format!("cacheTtlDays must be between 1 and {}", MAX_CACHE_TTL_DAYS),
        )),
        _ => Ok(()),
    }
}

fn failure_status(error: &ReaderError) -> u16 {
    match error {
        ReaderError::UrlError(_) | ReaderError::Validation(_) => 422,
        ReaderError::Clean(CleanError::Selector { .. }) => 422,
        ReaderError::Fetch(_) => 502,
        _ => 500,
    }
}

fn public_message(status: u16) -> &'static str {
    match status {
        422 => "The request could not be processed",
        502 => "The page could not be fetched",
        _ => "Internal error",
    }
}

/// Error chain of a failure, outermost first
fn issues(error: &ReaderError) -> Vec<String> {
    let mut issues = vec![error.to_string()];
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        issues.push(cause.to_string());
        source = cause.source();
    }
    issues
}
