use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

mod api;
mod bill;
mod config;
mod error;
mod ingestion;
mod model;
mod ollama;
mod service;

use crate::service::ExtractionService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting bill extraction service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = Arc::new(crate::config::load_config()?);

    info!(
        host = %config.server.host,
        port = config.server.port,
        model = %config.model.model,
        "Configuration loaded"
    );

    let service = Arc::new(ExtractionService::new(config.clone()).await?);

    let app = api::router(service);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bill_extraction_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
