//! Builder for the LLM server: turns configuration into live provider handles.

use std::sync::Arc;

use config::Config;
use rate_limit::TokenRateLimitManager;

use crate::{
    error::LlmError,
    provider::{Provider, anthropic::AnthropicProvider, loopback::LoopbackProvider, openai::OpenAIProvider},
    router::Router,
    scheduler_client::SchedulerClient,
    server::{LlmHandler, LlmServer, LlmServerInner},
};

pub(crate) struct LlmServerBuilder<'a> {
    config: &'a Config,
}

impl<'a> LlmServerBuilder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub async fn build(self) -> crate::Result<LlmHandler> {
        log::debug!(
            "Initializing LLM server with {} providers",
            self.config.llm.providers.len()
        );

        let mut providers = Vec::with_capacity(self.config.llm.providers.len());

        for (name, provider_config) in self.config.llm.providers.clone().into_iter() {
            log::debug!("Initializing provider: {name}");

            let provider: Box<dyn Provider> = match provider_config {
                config::LlmProviderConfig::Openai(api_config) => {
                    Box::new(OpenAIProvider::new(name.clone(), api_config)?)
                }
                config::LlmProviderConfig::Anthropic(api_config) => {
                    Box::new(AnthropicProvider::new(name.clone(), api_config)?)
                }
                config::LlmProviderConfig::Loopback(loopback_config) => {
                    Box::new(LoopbackProvider::new(name.clone(), loopback_config)?)
                }
            };

            providers.push(provider);
        }

        // Check if any providers were successfully initialized
        if providers.is_empty() {
            return Err(LlmError::InternalError(Some(
                "Failed to initialize any LLM providers.".to_string(),
            )));
        } else {
            log::debug!("LLM server initialized with {} active provider(s)", providers.len());
        }

        // Initialize token rate limiter if any provider has rate limits configured
        let has_token_rate_limits = self
            .config
            .llm
            .providers
            .values()
            .any(|p| p.rate_limits().is_some() || p.models().values().any(|m| m.rate_limits().is_some()));

        let token_rate_limiter = if has_token_rate_limits {
            log::debug!("Provider or model token rate limits configured, starting token rate limiter");
            Some(TokenRateLimitManager::new())
        } else {
            None
        };

        let router = Router::new(&self.config.router);
        let model_discovery = super::ModelDiscovery::new();
        let scheduler = SchedulerClient::new(self.config);

        let server: LlmHandler = LlmServer {
            shared: Arc::new(LlmServerInner {
                providers,
                config: self.config.llm.clone(),
                tool_adapter: self.config.tool_adapter.clone(),
                token_rate_limiter,
                router,
                model_discovery,
                scheduler,
                responses_sessions: crate::responses::SessionRegistry::new(),
            }),
        };

        Ok(server)
    }
}
