use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use relay_proxy::admin::setup_admin_router;
use relay_proxy::config::{load_config, ConfigWatcher, ProxyConfig};
use relay_proxy::http::{AppState, HttpServer};
use relay_proxy::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "relay-proxy", about = "Reverse proxy with pluggable upstream selection")]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when
    /// omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "relay-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstreams = config.upstreams.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let admin = config.admin.clone();

    let state = AppState::new(config).map_err(|errors| {
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    })?;

    // Hot reload: swap the proxy state whenever the config file
    // changes and revalidates.
    let mut watcher_handle = None;
    if let Some(path) = &args.config {
        let (watcher, mut updates) = ConfigWatcher::new(path);
        watcher_handle = Some(watcher.run()?);
        let reload_state = state.clone();
        tokio::spawn(async move {
            while let Some(new_config) = updates.recv().await {
                if let Err(errors) = reload_state.reload(new_config) {
                    for e in errors {
                        tracing::error!(error = %e, "rejected config");
                    }
                }
            }
        });
    }

    if admin.enabled {
        let admin_router = setup_admin_router(state.clone());
        let admin_listener = TcpListener::bind(&admin.bind_address).await?;
        tracing::info!(address = %admin.bind_address, "admin API listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(admin_listener, admin_router).await {
                tracing::error!(error = %e, "admin server error");
            }
        });
    }

    let server = HttpServer::new(state);
    server.run(listener).await?;

    drop(watcher_handle);
    tracing::info!("shutdown complete");
    Ok(())
}
