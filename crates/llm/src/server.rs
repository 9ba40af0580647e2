mod builder;
mod model_discovery;
mod service;

pub(crate) use builder::LlmServerBuilder;
use model_discovery::ModelDiscovery;
pub(crate) use service::LlmService;

/// No metrics/tracing middleware layer exists in this build; `LlmServer` is served
/// directly.
pub(crate) type LlmHandler = LlmServer;

use std::{fmt, sync::Arc};

use config::{LlmConfig, ToolAdapterConfig};
use futures::stream::StreamExt;
use itertools::Itertools;
use rate_limit::{TokenRateLimitManager, TokenRateLimitRequest};

use crate::{
    error::LlmError,
    messages::{
        anthropic::CountTokensResponse,
        openai::{ModelsResponse, ObjectType},
        unified::{UnifiedRequest, UnifiedResponse},
    },
    provider::{ChatCompletionStream, Provider},
    request::RequestContext,
    router::{self, EndpointFamily, Router},
    scheduler_client::SchedulerClient,
    tool_adapter,
};

#[derive(Clone)]
pub(crate) struct LlmServer {
    shared: Arc<LlmServerInner>,
}

pub(crate) struct LlmServerInner {
    /// Live provider handles that service requests.
    pub(crate) providers: Vec<Box<dyn Provider>>,
    /// Resolved configuration snapshot used for routing and limits.
    pub(crate) config: LlmConfig,
    /// Tool-filtering configuration applied before dispatching to a provider.
    pub(crate) tool_adapter: ToolAdapterConfig,
    /// Optional token rate limiter shared across providers.
    pub(crate) token_rate_limiter: Option<TokenRateLimitManager>,
    /// Glob route table and work-mode override, built from `config.router`.
    router: Router,
    /// Model discovery and caching for pattern-based providers.
    model_discovery: ModelDiscovery,
    /// Priority scheduler admission gate. A no-op when disabled.
    scheduler: SchedulerClient,
    /// Live Responses-API sessions awaiting a tool round trip or a reconnect.
    pub(crate) responses_sessions: crate::responses::SessionRegistry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelRouteSource {
    LegacyPrefix,
    RouteTable,
    ModelFilter,
}

struct ResolvedModelRoute<'providers, 'model> {
    providers: &'providers [Box<dyn Provider>],
    provider_index: usize,
    model_name: &'model str,
    source: ModelRouteSource,
}

impl<'providers, 'model> ResolvedModelRoute<'providers, 'model> {
    fn provider(&self) -> &dyn Provider {
        self.providers[self.provider_index].as_ref()
    }

    fn provider_name(&self) -> &str {
        self.provider().name()
    }
}

/// Parse the `X-Priority` header (0 = highest, 9 = lowest). Missing or out-of-range
/// values fall back to the scheduler's configured default.
fn priority_from_headers(headers: &axum::http::HeaderMap) -> Option<u8> {
    headers
        .get("X-Priority")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u8>().ok())
        .filter(|&priority| priority < config::PRIORITY_LEVELS)
}

impl fmt::Debug for ResolvedModelRoute<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedModelRoute")
            .field("provider", &self.provider_name())
            .field("model_name", &self.model_name)
            .field("source", &self.source)
            .finish()
    }
}

impl LlmServer {
    /// Process a unified chat completion request (protocol-agnostic).
    pub async fn unified_completions(
        &self,
        endpoint: EndpointFamily,
        request: UnifiedRequest,
        context: &RequestContext,
    ) -> crate::Result<UnifiedResponse> {
        // Resolve routing for the requested model
        let original_model = request.model.clone();
        let route = self.resolve_model_route(&original_model)?;
        self.arbitrate_work_mode(endpoint, &route)?;

        // Check token rate limits first
        self.check_and_enforce_rate_limit(&request, context, &route).await?;

        // Admission into the priority scheduler; held for the duration of the provider
        // call so its concurrency slot is released exactly once, on every exit path.
        let _permit = self
            .shared
            .scheduler
            .admit(&request, priority_from_headers(&context.headers))
            .await?;

        let provider = self.shared.providers[route.provider_index].as_ref();
        let provider_name = route.provider_name().to_string();

        // Create a modified request with the routed model name
        let mut modified_request = request;
        modified_request.model = route.model_name.to_string();
        modified_request = tool_adapter::adapt(modified_request, &self.shared.tool_adapter, &provider_name);

        // Call provider with unified types directly
        let unified_response = provider.chat_completion(modified_request, context).await?;

        // Restore the full model name with provider prefix in the response
        let mut final_response = unified_response;
        final_response.model = original_model;

        Ok(final_response)
    }

    /// Process a unified streaming chat completion request (protocol-agnostic).
    pub async fn unified_completions_stream(
        &self,
        endpoint: EndpointFamily,
        request: UnifiedRequest,
        context: &RequestContext,
    ) -> crate::Result<ChatCompletionStream> {
        // Resolve routing for the requested model
        let original_model = request.model.clone();
        let route = self.resolve_model_route(&original_model)?;
        self.arbitrate_work_mode(endpoint, &route)?;

        // Check token rate limits first
        self.check_and_enforce_rate_limit(&request, context, &route).await?;

        let provider = self.shared.providers[route.provider_index].as_ref();

        // Check if provider supports streaming
        if !provider.supports_streaming() {
            let provider_name = route.provider_name();
            log::debug!("Provider '{provider_name}' does not support streaming");
            return Err(LlmError::StreamingNotSupported);
        }

        // Held alongside the stream below so its concurrency slot releases when the
        // stream is fully consumed or dropped, not just when it's created.
        let permit = self
            .shared
            .scheduler
            .admit(&request, priority_from_headers(&context.headers))
            .await?;

        // Create a modified request with the stripped model name
        let mut modified_request = request;
        modified_request.model = route.model_name.to_string();
        modified_request = tool_adapter::adapt(modified_request, &self.shared.tool_adapter, route.provider_name());

        // Get the stream from the provider
        let stream = provider.chat_completion_stream(modified_request, context).await?;

        // Transform the stream to restore the full model name with prefix
        let transformed_stream = stream.map(move |chunk_result| {
            let _keep_permit_alive = &permit;

            chunk_result.map(|mut chunk| {
                // Restore the full model name with provider prefix
                chunk.model = original_model.clone().into();
                chunk
            })
        });

        Ok(Box::pin(transformed_stream))
    }

    /// Check token rate limits for a request.
    ///
    /// Returns the duration to wait before retrying if rate limited, or None if the request can proceed.
    async fn check_token_rate_limit(
        &self,
        request: &UnifiedRequest,
        context: &RequestContext,
        route: &ResolvedModelRoute<'_, '_>,
    ) -> Option<std::time::Duration> {
        // Per-account token rate limiting requires an authenticated principal.
        let Some(account_id) = context.principal.as_ref().map(|p| p.account_id.clone()) else {
            log::debug!(
                "No account id on this request. \
                Token rate limiting requires client identification to be enabled."
            );
            return None;
        };

        let provider_name = route.provider_name();

        log::debug!(
            "Checking token rate limit for account_id={account_id}, model={}, provider={}, route_source={:?}",
            route.model_name,
            provider_name,
            route.source
        );

        // Get provider config
        let provider_config = self.shared.config.providers.get(provider_name)?;

        // Get model config if it exists
        let models = provider_config.models();
        let model_config = models.get(route.model_name);

        // Check rate limit if token rate limiter is configured
        let Some(ref token_rate_limiter) = self.shared.token_rate_limiter else {
            log::debug!(
                "Token rate limiter not initialized - no providers have token rate limits configured. \
                Allowing request without token rate limiting."
            );
            return None;
        };

        // Gather provider and model rate limit configurations
        let (provider_limits, model_limits) = (
            provider_config.rate_limits(),
            model_config.and_then(|m| m.rate_limits()),
        );

        // Count request tokens (input only, no output buffering)
        let input_tokens = crate::token_counter::count_input_tokens(request);

        log::debug!("Token accounting: input={input_tokens} (output tokens not counted for rate limiting)",);

        // Create token rate limit request
        let token_request = TokenRateLimitRequest {
            account_id: Some(account_id),
            provider: provider_name.to_string(),
            model: Some(route.model_name.to_string()),
            input_tokens,
        };

        match token_rate_limiter
            .check_request(&token_request, provider_limits, model_limits)
            .await
        {
            Ok(duration) => duration,
            Err(e) => {
                log::error!("Error checking token rate limit: {e}");
                None
            }
        }
    }

    /// Get a provider by name.
    fn resolve_model_route<'a>(&'a self, requested_model: &'a str) -> crate::Result<ResolvedModelRoute<'a, 'a>> {
        if let Some((provider_name, model_name)) = requested_model.split_once('/') {
            if model_name.is_empty() {
                return Err(LlmError::InvalidModelFormat(requested_model.to_string()));
            }

            let Some(provider_index) = self
                .shared
                .providers
                .iter()
                .position(|provider| provider.name() == provider_name)
            else {
                log::error!(
                    "Provider '{provider_name}' not found. Available providers: [{providers}]",
                    providers = self.shared.providers.iter().map(|p| p.name()).join(", ")
                );

                return Err(LlmError::ProviderNotFound(provider_name.to_string()));
            };

            return Ok(ResolvedModelRoute {
                providers: &self.shared.providers,
                provider_index,
                model_name,
                source: ModelRouteSource::LegacyPrefix,
            });
        }

        if let Some(provider_name) = self.shared.router.resolve(requested_model)
            && let Some(provider_index) = self
                .shared
                .providers
                .iter()
                .position(|provider| provider.name() == provider_name)
        {
            log::debug!("Model '{requested_model}' matched route table entry for provider '{provider_name}'");
            return Ok(ResolvedModelRoute {
                providers: &self.shared.providers,
                provider_index,
                model_name: requested_model,
                source: ModelRouteSource::RouteTable,
            });
        }

        if let Some(provider_index) = self.shared.providers.iter().position(|provider| {
            self.shared
                .config
                .providers
                .get(provider.name())
                .and_then(|config| config.model_filter())
                .is_some_and(|filter| filter.is_match(requested_model))
        }) {
            log::debug!("Model '{requested_model}' matched a provider's model_filter");
            return Ok(ResolvedModelRoute {
                providers: &self.shared.providers,
                provider_index,
                model_name: requested_model,
                source: ModelRouteSource::ModelFilter,
            });
        }

        log::warn!("Model '{requested_model}' did not match any route or provider model_filter");

        Err(LlmError::ModelNotFound(requested_model.to_string()))
    }

    /// Reject requests the configured work mode doesn't allow for this endpoint/provider
    /// pair. Loopback routes never fail this check; it only ever rejects real providers.
    fn arbitrate_work_mode(&self, endpoint: EndpointFamily, route: &ResolvedModelRoute<'_, '_>) -> crate::Result<()> {
        let provider_type = self
            .shared
            .config
            .providers
            .get(route.provider_name())
            .map(|config| config.provider_type())
            .unwrap_or(config::ProviderType::Loopback);

        router::arbitrate(endpoint, provider_type, self.shared.router.work_mode()).map(|_mode| ())
    }

    /// Check rate limits and return an error if exceeded.
    async fn check_and_enforce_rate_limit(
        &self,
        request: &UnifiedRequest,
        context: &RequestContext,
        route: &ResolvedModelRoute<'_, '_>,
    ) -> crate::Result<()> {
        if let Some(wait_duration) = self.check_token_rate_limit(request, context, route).await {
            // Duration::MAX is used as a sentinel value to indicate the request can never succeed
            // (requires more tokens than the rate limit allows)
            if wait_duration == std::time::Duration::MAX {
                log::debug!("Request requires more tokens than rate limit allows - cannot be fulfilled");

                return Err(LlmError::RateLimitExceeded {
                    message: "Token rate limit exceeded. Request requires more tokens than the configured limit allows and cannot be fulfilled.".to_string(),
                });
            } else {
                log::debug!("Request rate limited, need to wait {wait_duration:?}");

                return Err(LlmError::RateLimitExceeded {
                    message: "Token rate limit exceeded. Please try again later.".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Current scheduler queue depths and dispatch counters, for the admin status
    /// endpoint. `None` when the scheduler is disabled.
    pub(crate) fn scheduler_stats(&self) -> Option<scheduler::Stats> {
        self.shared.scheduler.stats()
    }

    /// Time rules currently in effect, for the admin status endpoint.
    pub(crate) fn active_time_rules(&self) -> Vec<config::TimeRule> {
        self.shared.scheduler.active_time_rules()
    }

    /// Force an immediate time-rule re-evaluation.
    pub(crate) fn apply_time_rules_now(&self) {
        self.shared.scheduler.apply_time_rules_now();
    }

    /// Force an immediate reload of the time rules' `source_path` file.
    pub(crate) async fn reload_time_rules_now(&self) {
        self.shared.scheduler.reload_time_rules_now().await;
    }

    /// Registry of in-flight Responses-API sessions.
    pub(crate) fn responses_sessions(&self) -> &crate::responses::SessionRegistry {
        &self.shared.responses_sessions
    }
}

impl LlmService for LlmServer {
    async fn models(&self) -> ModelsResponse {
        let models = self.shared.model_discovery.get_all_models(&self.shared.providers).await;

        ModelsResponse {
            object: ObjectType::List,
            data: models,
        }
    }

    async fn completions(
        &self,
        endpoint: EndpointFamily,
        request: UnifiedRequest,
        context: &RequestContext,
    ) -> crate::Result<UnifiedResponse> {
        self.unified_completions(endpoint, request, context).await
    }

    async fn completions_stream(
        &self,
        endpoint: EndpointFamily,
        request: UnifiedRequest,
        context: &RequestContext,
    ) -> crate::Result<ChatCompletionStream> {
        self.unified_completions_stream(endpoint, request, context).await
    }

    async fn count_tokens(&self, request: UnifiedRequest, context: &RequestContext) -> crate::Result<CountTokensResponse> {
        let route = self.resolve_model_route(&request.model)?;
        let provider = self.shared.providers[route.provider_index].as_ref();

        let mut modified_request = request;
        modified_request.model = route.model_name.to_string();

        provider.count_tokens(modified_request, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use indoc::indoc;
    use insta::assert_debug_snapshot;
    use std::sync::Arc;

    struct DummyProvider {
        name: String,
    }

    impl DummyProvider {
        fn new(name: impl Into<String>) -> Self {
            Self { name: name.into() }
        }
    }

    #[async_trait]
    impl Provider for DummyProvider {
        async fn chat_completion(
            &self,
            _request: crate::messages::unified::UnifiedRequest,
            _context: &crate::request::RequestContext,
        ) -> crate::Result<crate::messages::unified::UnifiedResponse> {
            Err(crate::error::LlmError::InternalError(None))
        }

        async fn chat_completion_stream(
            &self,
            _request: crate::messages::unified::UnifiedRequest,
            _context: &crate::request::RequestContext,
        ) -> crate::Result<crate::provider::ChatCompletionStream> {
            Err(crate::error::LlmError::StreamingNotSupported)
        }

        async fn list_models(&self) -> anyhow::Result<Vec<crate::messages::openai::Model>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn supports_streaming(&self) -> bool {
            false
        }
    }

    fn build_test_server(llm_toml: &str, router_toml: &str) -> LlmServer {
        let config: LlmConfig = toml::from_str(llm_toml).expect("valid LLM config");
        let router_config: config::RouterConfig = toml::from_str(router_toml).expect("valid router config");
        let provider_names: Vec<String> = config.providers.keys().cloned().collect();

        let providers: Vec<Box<dyn Provider>> = provider_names
            .iter()
            .map(|name| Box::new(DummyProvider::new(name.clone())) as Box<dyn Provider>)
            .collect();

        let router = Router::new(&router_config);
        let model_discovery = ModelDiscovery::new();

        LlmServer {
            shared: Arc::new(LlmServerInner {
                providers,
                config,
                tool_adapter: ToolAdapterConfig::default(),
                token_rate_limiter: None,
                router,
                model_discovery,
                scheduler: SchedulerClient::disabled(),
                responses_sessions: crate::responses::SessionRegistry::new(),
            }),
        }
    }

    #[test]
    fn routes_prefixed_models_using_legacy_format() {
        let server = build_test_server(
            indoc! {r#"
                [providers.openai]
                type = "openai"
                api_key = "test"
                model_filter = "gpt-4.*"
            "#},
            "",
        );

        let route = server
            .resolve_model_route("openai/gpt-4o-mini")
            .expect("route should resolve");

        assert_debug_snapshot!((&route.provider_name(), route.model_name, route.source), @r###"
        (
            "openai",
            "gpt-4o-mini",
            LegacyPrefix,
        )
        "###);
    }

    #[test]
    fn routes_models_using_the_configured_route_table() {
        let server = build_test_server(
            indoc! {r#"
                [providers.openai]
                type = "openai"
                api_key = "test"

                [providers.anthropic]
                type = "anthropic"
                api_key = "test"
            "#},
            indoc! {r#"
                [[routes]]
                pattern = "gpt-4o*"
                target_provider = "openai"

                [[routes]]
                pattern = "claude*"
                target_provider = "anthropic"
            "#},
        );

        let route = server.resolve_model_route("GPT-4O-MINI").expect("route should resolve");

        assert_debug_snapshot!((&route.provider_name(), route.model_name, route.source), @r###"
        (
            "openai",
            "GPT-4O-MINI",
            RouteTable,
        )
        "###);
    }

    #[test]
    fn falls_back_to_provider_model_filter_when_no_route_matches() {
        let server = build_test_server(
            indoc! {r#"
                [providers.openai]
                type = "openai"
                api_key = "test"
                model_filter = "gpt-4.*"
            "#},
            "",
        );

        let route = server.resolve_model_route("gpt-4o-mini").expect("route should resolve");

        assert_debug_snapshot!((&route.provider_name(), route.model_name, route.source), @r###"
        (
            "openai",
            "gpt-4o-mini",
            ModelFilter,
        )
        "###);
    }

    #[test]
    fn returns_error_when_model_cannot_be_resolved() {
        let server = build_test_server(
            indoc! {r#"
                [providers.openai]
                type = "openai"
                api_key = "test"
                model_filter = "gpt-4.*"
            "#},
            "",
        );

        let error = server
            .resolve_model_route("unknown-model")
            .expect_err("route resolution should fail");

        let message = error.to_string();
        insta::assert_snapshot!(message, @r###"Model 'unknown-model' not found"###);
    }
}
