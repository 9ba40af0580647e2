//! Delegate-only passthrough configuration: endpoints that forward bytes to a
//! single fixed upstream rather than going through the router/translator.

use serde::Deserialize;

/// Passthrough proxy configuration.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Anthropic Messages API passthrough.
    pub anthropic: AnthropicProxyConfig,
}

/// Configuration for the Anthropic Messages API passthrough endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnthropicProxyConfig {
    /// Whether the passthrough endpoint is mounted.
    pub enabled: bool,
    /// The path the passthrough endpoint is mounted under.
    pub path: String,
}

impl Default for AnthropicProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/proxy/anthropic".to_string(),
        }
    }
}
