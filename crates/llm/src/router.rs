//! Routing table and work-mode arbitration.
//!
//! Given `(endpoint_family, model_name, work_mode)` this module decides which
//! provider serves a request and whether the gateway may translate between wire
//! formats or must delegate the request as-is.

use config::{ProviderType, RouterConfig, WorkMode};
use regex::{Regex, RegexBuilder};

use crate::error::LlmError;

/// The endpoint family a request came in on, used to look up the arbitration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndpointFamily {
    ChatCompletions,
    Responses,
    Embeddings,
    AnthropicMessages,
}

/// Whether a request is forwarded natively (delegate) or must go through the
/// unified-type translator first (translate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Delegate,
    Translate,
}

struct CompiledRoute {
    matcher: Regex,
    target_provider: String,
}

/// Compiled route table plus the work-mode override, built once at startup.
pub(crate) struct Router {
    routes: Vec<CompiledRoute>,
    work_mode: WorkMode,
}

impl Router {
    pub(crate) fn new(config: &RouterConfig) -> Self {
        let routes = config
            .routes
            .iter()
            .filter_map(|rule| {
                let matcher = compile_glob_pattern(&rule.pattern)?;
                Some(CompiledRoute {
                    matcher,
                    target_provider: rule.target_provider.clone(),
                })
            })
            .collect();

        Self {
            routes,
            work_mode: config.work_mode,
        }
    }

    /// Resolve a model name to a configured provider, first route wins. Matching
    /// happens on the original model name, before any provider-side alias is applied.
    pub(crate) fn resolve(&self, model_name: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|route| route.matcher.is_match(model_name))
            .map(|route| route.target_provider.as_str())
    }

    pub(crate) fn work_mode(&self) -> WorkMode {
        self.work_mode
    }
}

/// A glob with `*` as the only wildcard, compiled into a case-insensitive anchored regex.
fn compile_glob_pattern(pattern: &str) -> Option<Regex> {
    let mut regex_str = String::with_capacity(pattern.len() + 2);
    regex_str.push('^');

    for segment in pattern.split('*') {
        regex_str.push_str(&regex::escape(segment));
        regex_str.push_str(".*");
    }

    // Undo the trailing ".*" added after the last (non-wildcard-terminated) segment.
    regex_str.truncate(regex_str.len() - 2);
    regex_str.push('$');

    RegexBuilder::new(&regex_str).case_insensitive(true).build().ok()
}

/// Arbitrate the mode for `(endpoint, provider_type)` per the endpoint/provider table,
/// then enforce the configured work-mode override.
pub(crate) fn arbitrate(endpoint: EndpointFamily, provider_type: ProviderType, work_mode: WorkMode) -> crate::Result<Mode> {
    let natural_mode = match (endpoint, provider_type.clone()) {
        (EndpointFamily::ChatCompletions, ProviderType::Openai) => Some(Mode::Delegate),
        (EndpointFamily::ChatCompletions, ProviderType::Anthropic) => Some(Mode::Translate),
        (EndpointFamily::Responses, ProviderType::Openai) => Some(Mode::Delegate),
        (EndpointFamily::Responses, ProviderType::Anthropic) => Some(Mode::Translate),
        (EndpointFamily::Embeddings, ProviderType::Openai) => Some(Mode::Delegate),
        (EndpointFamily::Embeddings, ProviderType::Anthropic) => None,
        (EndpointFamily::AnthropicMessages, ProviderType::Openai) => Some(Mode::Translate),
        (EndpointFamily::AnthropicMessages, ProviderType::Anthropic) => Some(Mode::Delegate),
        // Loopback speaks unified types directly, so it never needs translation.
        (_, ProviderType::Loopback) => Some(Mode::Delegate),
    };

    let Some(natural_mode) = natural_mode else {
        return Err(LlmError::InvalidRequest(format!(
            "{provider_type:?} has no analog for this endpoint"
        )));
    };

    match (work_mode, natural_mode) {
        (WorkMode::Auto, mode) => Ok(mode),
        (WorkMode::Passthrough, Mode::Delegate) => Ok(Mode::Delegate),
        (WorkMode::Passthrough, Mode::Translate) => Err(LlmError::InvalidRequest(
            "work_mode=passthrough forbids requests that require translation".to_string(),
        )),
        (WorkMode::Translation, Mode::Translate) => Ok(Mode::Translate),
        (WorkMode::Translation, Mode::Delegate) => Err(LlmError::InvalidRequest(
            "work_mode=translation forbids requests that would be delegated untranslated".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{RouteRule, RouterConfig};

    fn router(routes: Vec<(&str, &str)>) -> Router {
        let config = RouterConfig {
            work_mode: WorkMode::Auto,
            routes: routes
                .into_iter()
                .map(|(pattern, target_provider)| RouteRule {
                    pattern: pattern.to_string(),
                    target_provider: target_provider.to_string(),
                })
                .collect(),
        };

        Router::new(&config)
    }

    #[test]
    fn first_matching_route_wins() {
        let router = router(vec![("gpt-*", "openai"), ("claude*", "anthropic"), ("*", "fallback")]);

        assert_eq!(router.resolve("gpt-4o"), Some("openai"));
        assert_eq!(router.resolve("claude-3-opus"), Some("anthropic"));
        assert_eq!(router.resolve("some-other-model"), Some("fallback"));
    }

    #[test]
    fn glob_match_is_case_insensitive() {
        let router = router(vec![("gpt-*", "openai")]);
        assert_eq!(router.resolve("GPT-4O-MINI"), Some("openai"));
    }

    #[test]
    fn no_match_returns_none() {
        let router = router(vec![("gpt-*", "openai")]);
        assert_eq!(router.resolve("claude-3"), None);
    }

    #[test]
    fn passthrough_rejects_translation() {
        let err = arbitrate(EndpointFamily::ChatCompletions, ProviderType::Anthropic, WorkMode::Passthrough).unwrap_err();
        assert!(err.to_string().contains("passthrough"));
    }

    #[test]
    fn translation_rejects_delegate() {
        let err = arbitrate(EndpointFamily::ChatCompletions, ProviderType::Openai, WorkMode::Translation).unwrap_err();
        assert!(err.to_string().contains("translation"));
    }

    #[test]
    fn embeddings_have_no_anthropic_analog() {
        assert!(arbitrate(EndpointFamily::Embeddings, ProviderType::Anthropic, WorkMode::Auto).is_err());
    }
}
