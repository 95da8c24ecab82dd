//! API Gateway Library
//!
//! HTTP REST API for the fiscal back office. The fiscal service runs
//! in-process behind `Arc<dyn FiscalService>`.

pub mod config;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use fiscal_service_lib::config::FiscalServiceConfig;
use fiscal_service_lib::service::FiscalService;
use fiscal_service_lib::worker::ReceiptPoller;

use crate::config::GatewayConfig;
use crate::middleware::Cache;
use crate::routes::create_router;
use crate::state::AppState;

/// Run the gateway as an embedded component (for combined binary).
///
/// With `with_poller` the receipt poller runs in the same process.
pub async fn run_embedded(host: &str, port: u16, with_poller: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::from_env();
    let fiscal_config = FiscalServiceConfig::from_env();
    let fiscal = fiscal_service_lib::connect(&fiscal_config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = with_poller.then(|| ReceiptPoller::new(fiscal.clone(), &fiscal_config.sefaz).spawn(shutdown_rx));

    let result = run_server_with_config(host, port, config, fiscal)
        .await
        .map_err(|e| e.to_string());

    if let Some(handle) = poller {
        shutdown_tx.send(true).ok();
        handle.await.ok();
    }
    result.map_err(Into::into)
}

/// Run the HTTP server with the given configuration.
async fn run_server_with_config(
    host: &str,
    port: u16,
    config: GatewayConfig,
    fiscal: Arc<dyn FiscalService>,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.jwt.secret.is_empty() {
        return Err("JWT_SECRET must be set".into());
    }

    let cache = Arc::new(Cache::connect(&config.redis_url).await?);
    let state = AppState::new(fiscal, cache, config);

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received shutdown signal, stopping gateway...");
    }
}
