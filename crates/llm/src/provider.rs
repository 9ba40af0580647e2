//! Provider abstraction: a uniform interface over concrete LLM backends.
//!
//! Every provider speaks [`crate::messages::unified`] types at its boundary; wire-format
//! conversion happens inside each provider module, not here.

pub mod anthropic;
pub mod loopback;
pub mod openai;

use std::{collections::BTreeMap, pin::Pin};

use async_trait::async_trait;
use config::HeaderRule;
use futures::Stream;
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};

use crate::{
    error::LlmError,
    messages::{
        anthropic::CountTokensResponse,
        openai::Model,
        unified::{UnifiedChunk, UnifiedRequest, UnifiedResponse},
    },
    request::RequestContext,
};

/// A streamed chat completion: a boxed, pinned stream of unified chunks.
pub type ChatCompletionStream = Pin<Box<dyn Stream<Item = crate::Result<UnifiedChunk>> + Send>>;

/// A concrete LLM backend (OpenAI, Anthropic, the in-process loopback echo, ...).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send a non-streaming chat completion request.
    async fn chat_completion(&self, request: UnifiedRequest, context: &RequestContext) -> crate::Result<UnifiedResponse>;

    /// Send a streaming chat completion request.
    async fn chat_completion_stream(
        &self,
        request: UnifiedRequest,
        context: &RequestContext,
    ) -> crate::Result<ChatCompletionStream>;

    /// List the models this provider exposes (explicitly configured and/or discovered).
    async fn list_models(&self) -> anyhow::Result<Vec<Model>>;

    /// Whether this provider supports streaming responses.
    fn supports_streaming(&self) -> bool;

    /// The name this provider was registered under.
    fn name(&self) -> &str;

    /// Count the input tokens a request would consume, without generating a completion.
    ///
    /// Only Anthropic exposes a dedicated endpoint for this; other providers fall back
    /// to reporting that the operation isn't supported.
    async fn count_tokens(&self, _request: UnifiedRequest, _context: &RequestContext) -> crate::Result<CountTokensResponse> {
        Err(LlmError::InvalidRequest(format!(
            "provider '{}' does not support token counting",
            self.name()
        )))
    }
}

/// Shared behavior for providers that speak to an upstream HTTP API.
pub(crate) trait HttpProvider {
    /// Header transformation rules configured at the provider level.
    fn get_provider_headers(&self) -> &[HeaderRule];

    /// The shared HTTP client used for upstream calls.
    fn get_http_client(&self) -> &Client;

    /// Build a request, merging provider-level and model-level header rules and
    /// applying them on top of the inbound request's headers.
    fn request_builder(
        &self,
        method: Method,
        url: &str,
        context: &RequestContext,
        model_config: Option<&config::ModelConfig>,
    ) -> RequestBuilder {
        let builder = self.get_http_client().request(method, url);

        let mut rules = self.get_provider_headers().to_vec();
        if let Some(model_config) = model_config {
            rules.extend(model_config.headers().iter().cloned());
        }

        header_rules::apply(builder, &context.headers, &rules)
    }
}

/// Resolves configured model aliases to the name a provider expects, and answers
/// discovery queries for explicitly configured models.
pub(crate) struct ModelManager {
    models: BTreeMap<String, config::ModelConfig>,
    provider_name: String,
}

impl ModelManager {
    pub(crate) fn new(models: BTreeMap<String, config::ModelConfig>, provider_name: &str) -> Self {
        Self {
            models,
            provider_name: provider_name.to_string(),
        }
    }

    /// Resolve a requested model id to the upstream name, applying a configured
    /// `rename` if one exists. Returns `None` if the model isn't explicitly configured.
    pub(crate) fn resolve_model(&self, requested: &str) -> Option<String> {
        let config = self.models.get(requested)?;
        Some(config.rename().unwrap_or(requested).to_string())
    }

    /// The configuration for an explicitly configured model, keyed by its alias.
    pub(crate) fn get_model_config(&self, requested: &str) -> Option<&config::ModelConfig> {
        self.models.get(requested)
    }

    /// All explicitly configured models, prefixed with this provider's name.
    pub(crate) fn get_configured_models(&self) -> Vec<Model> {
        self.models
            .keys()
            .map(|id| Model {
                id: format!("{}/{id}", self.provider_name),
                object: crate::messages::openai::ObjectType::Model,
                created: 0,
                owned_by: self.provider_name.clone(),
            })
            .collect()
    }
}

/// Resolves the API key to use for an outbound request: the user-supplied BYOK key
/// when token forwarding is enabled and one was provided, otherwise the configured key.
pub(crate) mod token {
    use super::*;

    pub(crate) fn get(
        forward_token: bool,
        configured_key: &Option<SecretString>,
        context: &RequestContext,
    ) -> crate::Result<SecretString> {
        if forward_token
            && let Some(key) = context.api_key.as_ref()
        {
            return Ok(key.clone());
        }

        configured_key
            .clone()
            .ok_or_else(|| LlmError::AuthenticationFailed("no API key configured for this provider".to_string()))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn byok_key_wins_when_forwarding_enabled() {
            let configured = Some(SecretString::from("configured".to_string()));
            let mut context = RequestContext::default();
            context.api_key = Some(SecretString::from("byok".to_string()));

            let key = get(true, &configured, &context).unwrap();
            assert_eq!(key.expose_secret(), "byok");
        }

        #[test]
        fn configured_key_used_when_forwarding_disabled() {
            let configured = Some(SecretString::from("configured".to_string()));
            let mut context = RequestContext::default();
            context.api_key = Some(SecretString::from("byok".to_string()));

            let key = get(false, &configured, &context).unwrap();
            assert_eq!(key.expose_secret(), "configured");
        }

        #[test]
        fn missing_key_is_an_auth_error() {
            let context = RequestContext::default();
            assert!(get(false, &None, &context).is_err());
        }
    }
}
