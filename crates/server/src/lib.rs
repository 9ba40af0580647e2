//! Gateway server library.
//!
//! Provides a reusable server function to serve the gateway, either for the binary or
//! for integration tests.

#![deny(missing_docs)]

mod auth;
pub mod error;
mod logger;
mod rate_limit;

use std::{net::SocketAddr, sync::Arc};

use ::rate_limit::RateLimitManager;
use anyhow::anyhow;
use auth::{AuthLayer, PrincipalLookup};
use config::Config;
use rate_limit::RateLimitLayer;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use auth::AlwaysAdmin;
pub use error::Error;

/// Configuration for serving the gateway.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to.
    pub listen_address: SocketAddr,
    /// The deserialized TOML configuration.
    pub config: Config,
    /// The lookup used to resolve bearer tokens / API keys into principals.
    pub principal_lookup: Arc<dyn PrincipalLookup>,
    /// Whether authentication is disabled (every request authenticates as admin).
    pub auth_disabled: bool,
    /// Cancellation token for graceful shutdown.
    pub shutdown_signal: CancellationToken,
    /// Log filter string (e.g. "info" or "server=debug,llm=debug").
    pub log_filter: String,
    /// The version string to log on startup.
    pub version: String,
    /// Optional oneshot sender to send back the bound address (useful if port 0 was specified).
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts and runs the gateway server with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        principal_lookup,
        auth_disabled,
        shutdown_signal,
        log_filter,
        version,
        bound_addr_sender,
    }: ServeConfig,
) -> anyhow::Result<()> {
    logger::init(&log_filter);

    log::info!("gateway {version}");

    let rate_limit_manager = if config.server.rate_limits.enabled {
        log::debug!("initializing rate limit manager with configured limits");
        Some(Arc::new(RateLimitManager::new(config.server.rate_limits.clone())))
    } else {
        log::debug!("rate limiting disabled, no manager created");
        None
    };

    let auth_layer = AuthLayer::new(principal_lookup, auth_disabled);
    let rate_limit_layer = RateLimitLayer::new(config.server.client_ip.clone(), rate_limit_manager);

    let mut app = llm::router(&config)
        .await
        .map_err(|err| anyhow!("failed to initialize LLM router: {err}"))?;

    app = app.layer(
        tower::ServiceBuilder::new()
            .layer(rate_limit_layer)
            .layer(auth_layer),
    );

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("failed to bind to {listen_address}: {e}"))?;

    if let Some(sender) = bound_addr_sender {
        sender
            .send(listener.local_addr()?)
            .expect("failed to send back bound address");
    }

    log::info!("listening on http://{listen_address}");

    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            result.map_err(|e| anyhow!("failed to start HTTP server: {e}"))?;
        }
        _ = shutdown_signal.cancelled() => {
            log::info!("received shutdown signal, shutting down gracefully");
        }
    }

    Ok(())
}
