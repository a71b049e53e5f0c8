//! HTTP server assembly for the chorus relay

mod cors;

use std::net::SocketAddr;

use axum::Router;
use chorus_config::Config;
use chorus_llm::{Registry, Relay};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

const DEFAULT_LISTEN_ADDRESS: ([u8; 4], u16) = ([0, 0, 0, 0], 8080);

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration names a provider the registry
    /// does not know
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let registry = Registry::new();
        check_providers(config, &registry)?;

        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(DEFAULT_LISTEN_ADDRESS));

        let relay_routes = chorus_llm::relay_router(Relay::new(registry));
        let relay_path = config.server.relay_path.as_str();

        let mut app = if relay_path == "/" {
            Router::new().merge(relay_routes)
        } else {
            Router::new().nest(relay_path, relay_routes)
        };

        if let Some(path) = config.server.health.route() {
            app = app.route(path, axum::routing::get(|| async { "ok" }));
        }

        app = app.layer(TraceLayer::new_for_http());

        if let Some(cors_config) = &config.server.cors {
            app = app.layer(cors::cors_layer(cors_config));
        }

        Ok(Self {
            router: app,
            listen_address,
        })
    }

    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Override the configured listen address
    #[must_use]
    pub const fn with_listen_address(mut self, listen_address: SocketAddr) -> Self {
        self.listen_address = listen_address;
        self
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "relay listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}

/// Reject provider ids the registry cannot serve
///
/// Covers both the shared `[providers]` table and every `[[targets]]`
/// entry.
///
/// # Errors
///
/// Returns an error naming the first unknown provider
pub fn check_providers(config: &Config, registry: &Registry) -> anyhow::Result<()> {
    for id in config.providers.keys() {
        if registry.lookup(id).is_none() {
            anyhow::bail!("unknown provider '{id}' in [providers]");
        }
    }

    for target in &config.targets {
        if registry.lookup(&target.provider).is_none() {
            anyhow::bail!("target '{}' uses unknown provider '{}'", target.id, target.provider);
        }
    }

    Ok(())
}
