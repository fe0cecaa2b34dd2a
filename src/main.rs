// markpilot - debounced, cached and cost-metered completions for text editors
// Author: kelexine (https://github.com/kelexine)

use anyhow::Result;
use clap::Parser;
use markpilot::cli::{self, Args, Command};
use markpilot::server::{create_router, AppState};
use markpilot::utils::logging;
use std::net::SocketAddr;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration
    let config = args.load_config()?;

    match args.command() {
        Command::Usage => {
            println!("{}", cli::usage_report(&config)?);
            return Ok(());
        }
        Command::Check => {
            let (ok, report) = cli::check_report(&config);
            println!("{}", report);
            if !ok {
                std::process::exit(1);
            }
            return Ok(());
        }
        Command::Serve => {}
    }

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!("Starting markpilot v{}", env!("CARGO_PKG_VERSION"));

    // Phase 3: Assemble request chains and resume persisted state
    info!("Loading state from {}", config.state.path);
    let state = AppState::from_config(config.clone())?;
    let state_store = state.state_store.clone();

    // Phase 4: Build and start HTTP server
    let app = create_router(state);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Phase 5: Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state_store.save()?;
    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
