use super::config::{ConfigError, GatewayConfig};
use crate::web::{ConnectionProvider, ConnectorRegistry, GatewayState, gateway_router};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// HTTP front of the gateway
pub struct GatewayServer {
    config: Arc<GatewayConfig>,
    state: GatewayState,
    /// Connection string with the password masked, for logs
    store_url: String,
}

impl GatewayServer {
    /// Fails if the store connection string or client options are unusable.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        Self::with_connectors(config, &ConnectorRegistry::default())
    }

    /// Like [`GatewayServer::new`], resolving the connection string's scheme
    /// against `registry` so other drivers can be plugged in
    pub fn with_connectors(config: GatewayConfig, registry: &ConnectorRegistry) -> Result<Self, ConfigError> {
        let provider = ConnectionProvider::with_registry(registry, &config.connection, &config.client)?;
        let store_url = provider.describe();
        let state =
            GatewayState::new(provider, config.request_timeout()).with_body_limit(config.max_body_bytes);
        Ok(Self {
            config: Arc::new(config),
            state,
            store_url,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn router(&self) -> Router {
        gateway_router(self.state.clone())
    }

    /// Binds `web_host:web_port` and serves until Ctrl-C
    pub async fn serve(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        self.serve_on(listener).await
    }

    pub async fn serve_on(self, listener: TcpListener) -> std::io::Result<()> {
        info!(
            address = %listener.local_addr()?,
            store = %self.store_url,
            "docgate listening"
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
