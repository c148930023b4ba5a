//! hookrelay webhook relay service.
//!
//! Main entry point. Loads configuration, provisions provider applications,
//! then serves event ingress until a shutdown signal arrives and drains the
//! worker pool.

use std::sync::Arc;

use anyhow::{Context, Result};
use hookrelay_api::{AppState, Config};
use hookrelay_core::{time::real_clock, TracingEventHandler};
use hookrelay_dispatch::{initialize_applications, DeliveryClient, HttpProviderApi, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("Starting hookrelay webhook relay service");

    let config = Config::load()?;
    info!(
        rust_log = %config.rust_log,
        provider_base_url = %config.provider_base_url,
        provider_token = %config.provider_token_masked(),
        projects = ?config.projects,
        max_workers = config.max_workers,
        "Configuration loaded"
    );

    let addr = config.parse_server_addr()?;
    let clock = real_clock();
    let events = Arc::new(TracingEventHandler::new());

    let api = HttpProviderApi::new(config.to_provider_config())
        .context("Failed to create provider client")?;
    let client = Arc::new(DeliveryClient::new(
        Arc::new(api),
        config.to_client_config(),
        config.to_retry_policy(),
        clock.clone(),
        events.clone(),
    ));

    let routes = initialize_applications(
        &client,
        &config.projects,
        &config.to_provisioning_config(),
        &CancellationToken::new(),
    )
    .await
    .context("Failed to provision provider applications")?;
    info!(projects = ?routes.projects(), "Provider applications provisioned");

    let pool = Arc::new(
        WorkerPool::with_clock(config.to_pool_config(), events, clock.clone())
            .context("Failed to start worker pool")?,
    );

    let state = AppState::new(pool.clone(), client, Arc::new(routes), clock);

    info!(addr = %addr, "hookrelay is ready to receive events");

    if let Err(e) = hookrelay_api::start_server(state, addr, config.request_timeout()).await {
        error!(error = %e, "Server failed");
    }

    info!("Draining worker pool");
    if let Err(e) = pool.close_with_timeout(config.shutdown_timeout()).await {
        warn!(error = %e, "Worker pool did not drain in time, in-flight tasks were cancelled");
    }

    info!("hookrelay shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,hookrelay=debug,tower_http=debug"))
        .context("Invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).try_init()?;
    Ok(())
}
