//! HTTP server configuration settings.

use std::net::SocketAddr;

use serde::Deserialize;

use crate::{ClientIdentificationConfig, ClientIpConfig, RateLimitConfig};

/// HTTP server configuration settings.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: Option<SocketAddr>,
    /// Rate limiting configuration.
    pub rate_limits: RateLimitConfig,
    /// Client identification configuration, used for per-client rate limiting and
    /// the scheduler's per-account capacity tracking.
    pub client_identification: ClientIdentificationConfig,
    /// Client IP configuration for IP-based rate limiting.
    pub client_ip: ClientIpConfig,
}
