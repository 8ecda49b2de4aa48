//! Slidecast presentation server.
//!
//! One presenter (whoever knows the current code) drives a slide deck; every
//! other browser connected to `/ws` follows along.

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use slidecast_hub::Hub;

pub use config::{AssetSource, ServerConfig};
pub use error::{GatewayError, ServerError};

/// A bound, not yet running server.
pub struct Server {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
    hub_task: JoinHandle<()>,
}

impl Server {
    /// Validates the code settings, starts the hub and binds the listener.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let totp = Arc::new(config.totp()?);
        let code = totp.generate()?;
        info!(
            %code,
            digits = totp.digits(),
            algorithm = %totp.algorithm(),
            period = totp.period(),
            "presenter code ready"
        );

        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let (hub, hub_task) = Hub::spawn();
        let state = gateway::GatewayState::new(hub, totp, config.limits);
        let router = gateway::router(state, &config.assets);

        Ok(Self {
            listener,
            router,
            local_addr,
            hub_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %self.local_addr, "slidecast listening");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.hub_task.abort();
        info!("slidecast stopped");
        Ok(())
    }
}
