//! OWS Gateway
//!
//! An OGC web service front end built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ───────────────▶ http::server ──▶ dispatch::Dispatcher ──▶ operation handler
//!                      (request id,     (endpoint, service,      (capabilities,
//!                       timeout,         operation, auth,          feature, map,
//!                       body limit)      body parsing)             tile)
//!     ◀─────────────── response or OWS exception report ◀────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use ows_gateway::config::{load_config, GatewayConfig};
use ows_gateway::http::HttpServer;
use ows_gateway::lifecycle::{build_dispatcher, Shutdown};
use ows_gateway::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "ows-gateway", version, about = "OGC WFS/WMS/WMTS request gateway")]
struct Cli {
    /// Path to the TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability.log_level)?;
    tracing::info!("ows-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        max_body_size = config.limits.max_body_size,
        authorization = config.auth.api_key.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let dispatcher = build_dispatcher(&config)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(shutdown.trigger_on_ctrl_c());

    let server = HttpServer::new(config, dispatcher);
    server.run(listener, rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
