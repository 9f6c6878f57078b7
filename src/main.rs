//! Weathermap poller
//!
//! Polls network interface counters from the data sources declared in the
//! topology documents and serves their current rates.

mod config;
mod poller;
mod service;
mod snmp;
mod topology;
mod web;

use config::ServerConfig;
use service::DataSourceService;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("weathermap=info".parse()?))
        .init();

    // Load configuration
    let mut cfg = ServerConfig::load();
    if let Some(dir) = std::env::args().nth(1) {
        cfg = cfg.with_maps_dir(dir);
    }
    tracing::info!("Starting weathermap poller on port {}...", cfg.http_port);
    tracing::info!("Reading topology documents from {}", cfg.maps_dir.display());

    let sources = topology::load_data_sources(&cfg.maps_dir)?;
    tracing::info!("Loaded {} data sources", sources.len());

    let service = Arc::new(DataSourceService::new(sources, &cfg));
    tracing::info!("Registered {} poll tasks", service.task_count());
    service.start();

    let server = Server::new(cfg, service.clone());
    server
        .start(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down...");
        })
        .await?;

    service.shutdown().await;

    Ok(())
}
