//! HTTP surface of the reader
//!
//! A thin axum layer over [`RequestPipeline`]: handlers turn query strings
//! and JSON bodies into options, run the pipeline and map its response onto
//! status, headers and body.

mod handlers;
mod routes;

pub use handlers::client_ip;
pub use routes::create_router;

use crate::pipeline::RequestPipeline;
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared state for the web server
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RequestPipeline>,
}

impl AppState {
    pub fn new(pipeline: RequestPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Serves until Ctrl-C, then drains deferred work
///
/// # Arguments
///
/// * `state` - Server state
/// * `addr` - Address to bind
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let pipeline = state.pipeline.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!(pending = pipeline.tasks().pending(), "Draining background tasks");
    pipeline.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
