use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use slidecast_server::Server;
use slidecast_server::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,slidecast=debug")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    debug!(?config, "configuration resolved");

    let server = Server::bind(config)
        .await
        .context("failed to start slidecast")?;
    server
        .run(shutdown_signal())
        .await
        .context("server stopped with an error")?;

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("received SIGINT, shutting down"),
            Err(e) => {
                error!("failed to listen for SIGINT: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received SIGTERM, shutting down");
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
