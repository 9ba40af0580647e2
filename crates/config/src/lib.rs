//! Gateway configuration structures, mapping the TOML configuration file.

#![deny(missing_docs)]

mod client_identification;
mod client_ip;
mod error;
mod headers;
mod llm;
mod loader;
mod proxy;
mod rate_limit;
mod router;
mod scheduler;
mod server;
mod time_rules;
mod tool_adapter;

use std::path::Path;

pub use client_identification::*;
pub use client_ip::*;
pub use error::Error;
pub use headers::{
    HeaderForward, HeaderInsert, HeaderRemove, HeaderRenameDuplicate, HeaderRule, NameOrPattern, NamePattern,
};
pub use llm::{
    ApiModelConfig, ApiProviderConfig, LlmConfig, LlmProtocol, LlmProviderConfig, LoopbackProviderConfig,
    ModelConfig, ModelFilter, ProviderType,
};
pub use proxy::{AnthropicProxyConfig, ProxyConfig};
pub use rate_limit::*;
pub use router::{RouteRule, RouterConfig, WorkMode};
pub use scheduler::{CapacityConfig, SchedulerConfig, SchedulerPolicy, PRIORITY_LEVELS};
use serde::Deserialize;
pub use server::ServerConfig;
pub use time_rules::{DayOfWeek, TimeRule, TimeRulesConfig};
pub use tool_adapter::ToolAdapterConfig;

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// LLM routing, translation, and provider configuration.
    pub llm: LlmConfig,
    /// Ordered route table and work-mode override.
    pub router: RouterConfig,
    /// Proxy (delegate-only passthrough) configuration.
    pub proxy: ProxyConfig,
    /// Priority scheduler configuration.
    pub scheduler: SchedulerConfig,
    /// Time-based scheduler rule overrides.
    pub time_rules: TimeRulesConfig,
    /// Tool adapter configuration.
    pub tool_adapter: ToolAdapterConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates that the configuration has at least one functional downstream.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate_has_downstreams(self)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use crate::Config;

    #[test]
    fn defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        Config {
            server: ServerConfig {
                listen_address: None,
                rate_limits: RateLimitConfig {
                    enabled: false,
                    storage: Memory,
                    global: None,
                    per_ip: None,
                },
                client_identification: ClientIdentificationConfig {
                    enabled: false,
                },
                client_ip: ClientIpConfig {
                    x_real_ip: false,
                    x_forwarded_for_trusted_hops: None,
                },
            },
            llm: LlmConfig {
                enabled: true,
                protocols: LlmProtocolsConfig {
                    openai: OpenAIProtocolConfig {
                        enabled: true,
                        path: "/v1",
                    },
                    anthropic: AnthropicProtocolConfig {
                        enabled: true,
                        path: "/anthropic",
                    },
                },
                max_tokens_ceiling: 16384,
                providers: {},
            },
            router: RouterConfig {
                work_mode: Auto,
                routes: [],
            },
            proxy: ProxyConfig {
                anthropic: AnthropicProxyConfig {
                    enabled: false,
                    path: "/proxy/anthropic",
                },
            },
            scheduler: SchedulerConfig {
                enabled: false,
                policy: Hybrid,
                default_priority: 5,
                max_queue_depth: 256,
                queue_timeout: 30s,
                stats_interval: 5s,
                capacity: CapacityConfig {
                    max_concurrent: 64,
                    max_rps: None,
                    max_tokens_per_sec: None,
                    max_context_length: None,
                },
            },
            time_rules: TimeRulesConfig {
                enabled: false,
                rules: [],
                check_interval: 30s,
                file_check_interval: 30s,
                source_path: None,
            },
            tool_adapter: ToolAdapterConfig {
                filtered_tools: {},
                guidance_template: None,
            },
        }
        "#);
    }
}
