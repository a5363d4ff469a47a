use std::sync::Arc;

use anyhow::Result;
use cdp_adapter::DriverAdapter;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use simplepage::config::ServiceConfig;
use simplepage::manager::PageManager;
use simplepage::server;

/// Headless-browser control plane.
///
/// Flags override the PORT / HEADLESS / USER_DATA_DIR / SCREENSHOT / TMPDIR
/// environment defaults.
#[derive(Parser, Debug)]
#[command(name = "simplepage", version, about)]
struct Cli {
    /// HTTP port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Run the browser headless.
    #[arg(long)]
    headless: bool,

    /// Browser profile directory.
    #[arg(long)]
    user_data_dir: Option<std::path::PathBuf>,

    /// Capture a screenshot with every recorded action.
    #[arg(long)]
    screenshot: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServiceConfig::from_env();
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.headless {
        config.headless = true;
    }
    if let Some(dir) = cli.user_data_dir {
        config.user_data_dir = dir;
    }
    if cli.screenshot {
        config.screenshot = true;
    }

    let adapter = Arc::new(DriverAdapter::new(config.driver_config()));
    if let Err(err) = Arc::clone(&adapter).start().await {
        // The service stays up; /health reports the browser disconnected
        // and page creation fails until one is reachable.
        tracing::warn!(target: "simplepage", %err, "browser transport failed to start");
    }

    let manager = Arc::new(PageManager::new(config.clone(), Arc::clone(&adapter)));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "simplepage", "ctrl-c received");
            signal_token.cancel();
        }
    });

    server::serve(&config, manager, shutdown).await
}
