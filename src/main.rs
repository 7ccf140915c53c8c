//! vibium daemon entry point.
//!
//! Binds the client-facing WebSocket server, routes each client to a
//! dedicated browser, and tears everything down on Ctrl-C.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use vibium::{LaunchOptions, Result, Router, Server};

// ============================================================================
// CLI
// ============================================================================

/// WebDriver BiDi browser-automation proxy.
#[derive(Debug, Parser)]
#[command(name = "vibium", version, about)]
struct Args {
    /// Address to listen on for automation clients.
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Port to listen on.
    #[arg(long, default_value_t = 9223)]
    port: u16,

    /// Run browsers headless.
    #[arg(long)]
    headless: bool,

    /// Browser binary; falls back to VIBIUM_BROWSER, then known locations.
    #[arg(long)]
    browser: Option<PathBuf>,
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let router = Router::new(LaunchOptions {
        binary: args.browser,
        headless: args.headless,
    });

    let addr = SocketAddr::new(args.bind, args.port);
    let server = Server::bind(addr, Arc::clone(&router)).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!(error = %e, "server terminated");
            }
            router.close_all().await;
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            router.close_all().await;
            Ok(())
        }
    }
}
