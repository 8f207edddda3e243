//! kiln-server entry point.
//!
//! Parses configuration, installs tracing, starts the generation worker and
//! serves `POST /generate-image` until SIGINT or SIGTERM.

mod config;
mod error;
mod handler;
mod logging;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kiln_core::{worker, AutoLoader};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::handler::RequestHandler;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();
    logging::init(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %config.model.display(),
        output = %config.output.display(),
        "kiln-server starting"
    );

    let jobs = worker::spawn(
        Arc::new(AutoLoader),
        config.tuning_flags(),
        config.worker_config(),
    )
    .context("failed to start generation worker")?;
    let handler = Arc::new(RequestHandler::new(config.generation_defaults(), jobs));
    let app = routes::build(handler);

    let bind_address = config.bind_address();
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("kiln-server stopped");
    Ok(())
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
