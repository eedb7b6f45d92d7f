//! Sumi-Reader main entry point
//!
//! This is the command-line interface for the Sumi-Reader service.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_reader::auth::IdentityBindings;
use sumi_reader::clock::{Clock, SystemClock};
use sumi_reader::config::{load_config_with_hash, Config};
use sumi_reader::fetch::HttpFetcher;
use sumi_reader::pipeline::{ReadOptions, RequestContext, RequestPipeline};
use sumi_reader::server::{self, AppState};
use sumi_reader::storage::StorageBackends;
use tracing_subscriber::EnvFilter;

/// Sumi-Reader: web pages in, clean markdown out
///
/// Runs an HTTP service that fetches pages, strips boilerplate, and returns
/// markdown with metadata, behind authentication, rate limits and a cache.
#[derive(Parser, Debug)]
#[command(name = "sumi-reader")]
#[command(version)]
#[command(about = "Web pages in, clean markdown out", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config, print the effective configuration and exit
    #[arg(long, conflicts_with = "convert")]
    check_config: bool,

    /// Convert a single page to markdown and exit
    #[arg(long, value_name = "URL")]
    convert: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.check_config {
        return handle_check_config(&config, &hash);
    }

    let pipeline = build_pipeline(&config)?;

    if let Some(url) = cli.convert {
        return handle_convert(pipeline, url).await;
    }

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    server::serve(AppState::new(pipeline), addr).await
}

/// Sets up logging based on verbosity flags
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_reader=info,tower_http=info,warn"),
            1 => EnvFilter::new("sumi_reader=debug,tower_http=debug,info"),
            2 => EnvFilter::new("sumi_reader=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn build_pipeline(config: &Config) -> anyhow::Result<RequestPipeline> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let storage = match &config.storage.database_path {
        Some(path) => {
            tracing::info!("Using SQLite storage at {}", path);
            StorageBackends::open(Path::new(path), clock.clone())?
        }
        None => {
            tracing::warn!("No database path configured, storage is in-memory");
            StorageBackends::in_memory(clock.clone())
        }
    };

    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
    let bindings = IdentityBindings::from_config(&config.auth)?;
    let pipeline = RequestPipeline::from_config(config, storage, fetcher, bindings, clock)?;
    Ok(pipeline)
}

/// Handles `--check-config`: prints the effective configuration
fn handle_check_config(config: &Config, hash: &str) -> anyhow::Result<()> {
    println!("=== Sumi-Reader Configuration ===\n");
    println!("# hash: {}\n", hash);
    println!("{}", toml::to_string_pretty(config)?);
    println!("Configuration is valid.");
    Ok(())
}

/// Handles `--convert`: runs one read and prints the markdown
async fn handle_convert(pipeline: RequestPipeline, url: String) -> anyhow::Result<()> {
    let response = pipeline
        .read(&RequestContext::new("GET"), ReadOptions::new(url))
        .await;
    pipeline.shutdown().await;

    let body = response
        .json_body()
        .context("Pipeline returned a non-JSON body")?;

    if !response.is_success() {
        anyhow::bail!(
            "Conversion failed with HTTP {}: {}",
            response.status,
            body["error"].as_str().unwrap_or("unknown error")
        );
    }

    println!("{}", body["markdown"].as_str().unwrap_or_default());
    Ok(())
}
