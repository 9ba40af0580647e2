//! LLM configuration structures for AI model providers.

use std::{borrow::Cow, collections::BTreeMap, fmt};

use indexmap::IndexMap;

use crate::headers::HeaderRule;
use crate::rate_limit::TokenRateLimitsConfig;
use regex::{Regex, RegexBuilder};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

/// Configuration for an individual model within a provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiModelConfig {
    /// Optional rename - the actual provider model name.
    /// If not specified, the model ID (map key) is used.
    #[serde(default)]
    pub rename: Option<String>,
    /// Rate limits for this model.
    #[serde(default)]
    pub rate_limits: Option<TokenRateLimitsConfig>,
    /// Header transformation rules for this model.
    #[serde(default)]
    pub headers: Vec<HeaderRule>,
}

/// Per-model configuration, keyed by the model id used in requests.
#[derive(Debug, Clone)]
pub struct ModelConfig(
    /// The underlying model configuration.
    pub ApiModelConfig,
);

impl ModelConfig {
    /// Get the optional rename for this model.
    pub fn rename(&self) -> Option<&str> {
        self.0.rename.as_deref()
    }

    /// Get the rate limits for this model.
    pub fn rate_limits(&self) -> Option<&TokenRateLimitsConfig> {
        self.0.rate_limits.as_ref()
    }

    /// Get the headers for this model.
    pub fn headers(&self) -> &[HeaderRule] {
        &self.0.headers
    }
}

/// Case-insensitive regex filter for matching model identifiers.
#[derive(Clone)]
pub struct ModelFilter {
    regex: Regex,
}

impl ModelFilter {
    /// Create a new validated model filter.
    fn new(pattern: &str) -> Result<Self, String> {
        let trimmed = pattern.trim();

        if trimmed.is_empty() {
            return Err("model_filter cannot be empty".to_string());
        }

        let regex = RegexBuilder::new(trimmed)
            .case_insensitive(true)
            .build()
            .map_err(|err| format!("invalid model_filter regex: {err}"))?;

        Ok(Self { regex })
    }

    /// Return the original pattern string.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Return the compiled regex.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Check whether the supplied model identifier matches the pattern.
    pub fn is_match(&self, model: &str) -> bool {
        self.regex.is_match(model)
    }
}

impl fmt::Debug for ModelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFilter").field("pattern", &self.pattern()).finish()
    }
}

impl<'de> Deserialize<'de> for ModelFilter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pattern = Cow::<'de, str>::deserialize(deserializer)?;
        ModelFilter::new(pattern.as_ref()).map_err(serde::de::Error::custom)
    }
}

/// Protocol type for LLM endpoints.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProtocol {
    /// OpenAI protocol (default).
    OpenAI,
    /// Anthropic protocol.
    Anthropic,
}

impl Default for LlmProtocol {
    fn default() -> Self {
        Self::OpenAI
    }
}

/// OpenAI protocol configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpenAIProtocolConfig {
    /// Whether the OpenAI-compatible endpoints are exposed.
    pub enabled: bool,
    /// The path the endpoints are nested under.
    pub path: String,
}

impl Default for OpenAIProtocolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/v1".to_string(),
        }
    }
}

/// Anthropic protocol configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnthropicProtocolConfig {
    /// Whether the Anthropic-compatible endpoints are exposed.
    pub enabled: bool,
    /// The path the endpoints are nested under.
    pub path: String,
}

impl Default for AnthropicProtocolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/anthropic".to_string(),
        }
    }
}

/// Configuration for all LLM protocol endpoints.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct LlmProtocolsConfig {
    /// OpenAI protocol endpoint configuration.
    pub openai: OpenAIProtocolConfig,
    /// Anthropic protocol endpoint configuration.
    pub anthropic: AnthropicProtocolConfig,
}

/// LLM configuration for AI model integration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Whether the LLM functionality is enabled.
    enabled: bool,

    /// Protocol-specific endpoint configurations.
    pub protocols: LlmProtocolsConfig,

    /// Maximum `max_tokens` value passed through to OpenAI-shaped providers; larger
    /// values from an Anthropic request are clamped down to this, never rejected.
    pub max_tokens_ceiling: u32,

    /// Map of LLM provider configurations, in declaration order.
    pub providers: IndexMap<String, LlmProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            protocols: LlmProtocolsConfig::default(),
            max_tokens_ceiling: 16_384,
            providers: IndexMap::new(),
        }
    }
}

impl LlmConfig {
    /// Whether the LLM functionality is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether there are any LLM providers configured.
    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Whether there are any protocol endpoints enabled.
    pub fn has_protocol_endpoints(&self) -> bool {
        self.protocols.openai.enabled || self.protocols.anthropic.enabled
    }
}

/// Provider type enumeration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    /// OpenAI provider.
    Openai,
    /// Anthropic provider.
    Anthropic,
    /// In-process echo provider, used for testing without network access.
    Loopback,
}

/// Configuration specific to API-based providers (OpenAI, Anthropic).
#[derive(Debug, Clone)]
pub struct ApiProviderConfig {
    /// API key for authentication.
    pub api_key: Option<SecretString>,

    /// Custom base URL for the provider API.
    pub base_url: Option<String>,

    /// Enable token forwarding from user requests.
    pub forward_token: bool,

    /// Regular expression filter for automatically routing models to this provider.
    pub model_filter: Option<ModelFilter>,

    /// Explicitly configured models for this provider.
    pub models: BTreeMap<String, ApiModelConfig>,

    /// Provider-level rate limits.
    pub rate_limits: Option<TokenRateLimitsConfig>,

    /// Header transformation rules for this provider.
    pub headers: Vec<HeaderRule>,
}

impl<'de> Deserialize<'de> for ApiProviderConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "snake_case")]
        struct ApiProviderConfigSerde {
            #[serde(default)]
            api_key: Option<SecretString>,
            #[serde(default)]
            base_url: Option<String>,
            #[serde(default)]
            forward_token: bool,
            #[serde(default)]
            model_filter: Option<ModelFilter>,
            #[serde(default)]
            models: BTreeMap<String, ApiModelConfig>,
            #[serde(default)]
            rate_limits: Option<TokenRateLimitsConfig>,
            #[serde(default)]
            headers: Vec<HeaderRule>,
        }

        let raw = ApiProviderConfigSerde::deserialize(deserializer)?;

        Ok(Self {
            api_key: raw.api_key,
            base_url: raw.base_url,
            forward_token: raw.forward_token,
            model_filter: raw.model_filter,
            models: raw.models,
            rate_limits: raw.rate_limits,
            headers: raw.headers,
        })
    }
}

/// Configuration for the in-process loopback/echo provider.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct LoopbackProviderConfig {
    /// Explicitly configured model aliases; loopback accepts any model name if empty.
    pub models: BTreeMap<String, ApiModelConfig>,
}

/// Complete LLM provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum LlmProviderConfig {
    /// OpenAI provider configuration.
    Openai(ApiProviderConfig),
    /// Anthropic provider configuration.
    Anthropic(ApiProviderConfig),
    /// In-process echo provider configuration.
    Loopback(LoopbackProviderConfig),
}

impl LlmProviderConfig {
    /// Get the provider type for this configuration.
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::Openai(_) => ProviderType::Openai,
            Self::Anthropic(_) => ProviderType::Anthropic,
            Self::Loopback(_) => ProviderType::Loopback,
        }
    }

    /// Get the API key (only available for API-based providers).
    pub fn api_key(&self) -> Option<&SecretString> {
        match self {
            Self::Openai(config) => config.api_key.as_ref(),
            Self::Anthropic(config) => config.api_key.as_ref(),
            Self::Loopback(_) => None,
        }
    }

    /// Get the base URL (if applicable for this provider type).
    pub fn base_url(&self) -> Option<&str> {
        match self {
            Self::Openai(config) => config.base_url.as_deref(),
            Self::Anthropic(config) => config.base_url.as_deref(),
            Self::Loopback(_) => None,
        }
    }

    /// Get the configured model filter for this provider, if any.
    pub fn model_filter(&self) -> Option<&ModelFilter> {
        match self {
            Self::Openai(config) => config.model_filter.as_ref(),
            Self::Anthropic(config) => config.model_filter.as_ref(),
            Self::Loopback(_) => None,
        }
    }

    /// Check if token forwarding is enabled (only applicable for API-based providers).
    pub fn forward_token(&self) -> bool {
        match self {
            Self::Openai(config) => config.forward_token,
            Self::Anthropic(config) => config.forward_token,
            Self::Loopback(_) => false,
        }
    }

    /// Get the configured models for this provider as unified ModelConfig.
    pub fn models(&self) -> BTreeMap<String, ModelConfig> {
        let models = match self {
            Self::Openai(config) => &config.models,
            Self::Anthropic(config) => &config.models,
            Self::Loopback(config) => &config.models,
        };

        models.iter().map(|(k, v)| (k.clone(), ModelConfig(v.clone()))).collect()
    }

    /// Get the rate limits for this provider (only available for API-based providers).
    pub fn rate_limits(&self) -> Option<&TokenRateLimitsConfig> {
        match self {
            Self::Openai(config) => config.rate_limits.as_ref(),
            Self::Anthropic(config) => config.rate_limits.as_ref(),
            Self::Loopback(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use insta::assert_debug_snapshot;

    #[test]
    fn llm_config_defaults() {
        let config: LlmConfig = toml::from_str("").unwrap();

        assert_debug_snapshot!(&config, @r#"
        LlmConfig {
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
        }
        "#);
    }

    #[test]
    fn llm_config_with_providers() {
        let config = indoc! {r#"
            [providers.openai]
            type = "openai"
            api_key = "sk-test"

            [providers.claude]
            type = "anthropic"
            api_key = "sk-ant-test"

            [providers.echo]
            type = "loopback"
        "#};

        let config: LlmConfig = toml::from_str(config).unwrap();

        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.providers["openai"].provider_type(), ProviderType::Openai);
        assert_eq!(config.providers["claude"].provider_type(), ProviderType::Anthropic);
        assert_eq!(config.providers["echo"].provider_type(), ProviderType::Loopback);
    }

    #[test]
    fn model_filter_rejects_empty_pattern() {
        let err = ModelFilter::new("   ").unwrap_err();
        assert_eq!(err, "model_filter cannot be empty");
    }
}
