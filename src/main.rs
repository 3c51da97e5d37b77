//! Apex Proxy
//!
//! ```text
//!     Client ──▶ source ip ──▶ method ──▶ path ──▶ forward ──▶ Apex
//!                   │            │          │          │
//!                   └────────────┴──────────┴─ 403     └─ 503 request-id=<id>
//! ```

use clap::Parser;
use tokio::net::TcpListener;

use apex_proxy::cli::Cli;
use apex_proxy::lifecycle::signals::spawn_signal_handler;
use apex_proxy::observability::logging;
use apex_proxy::{HttpServer, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;
    let _log_guard = logging::init(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        apex = %config.origin.url,
        bind = %config.listener.bind_address,
        timeout_secs = config.origin.timeout_secs,
        ips = ?config.access.allow_ips,
        loopback = config.access.allow_loopback,
        private = config.access.allow_private,
        urls = ?config.access.allow_urls,
        xml = config.access.allow_xml_endpoints,
        json = config.access.allow_json_endpoints,
        cache_size = config.access.cache_capacity,
        level = %config.logging.level,
        file = ?config.logging.file,
        "startup"
    );

    let server = HttpServer::new(&config)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
