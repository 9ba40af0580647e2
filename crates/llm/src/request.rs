use axum::http::HeaderMap;
use context::Principal;
use secrecy::SecretString;

/// Header name for user-provided API keys (BYOK - Bring Your Own Key).
const PROVIDER_API_KEY_HEADER: &str = "X-Provider-API-Key";

/// Runtime context for provider requests.
///
/// Carries runtime information that may override provider configuration, such as a
/// user-provided API key for BYOK (Bring Your Own Key) support, the authenticated
/// principal for rate limiting and session ownership, and incoming request headers
/// for header transformation rules.
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestContext {
    /// User-provided API key that overrides the configured key.
    /// Only used when BYOK is enabled for the provider.
    pub api_key: Option<SecretString>,

    /// The authenticated principal, if any, for per-account rate limiting and quotas.
    pub principal: Option<Principal>,

    /// Incoming request headers for header transformation rules.
    pub headers: HeaderMap,
}

/// Extract request context from request headers and the authenticated principal.
pub(super) fn extract_context(headers: &HeaderMap, principal: Option<Principal>) -> RequestContext {
    let api_key = headers
        .get(PROVIDER_API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|key| SecretString::from(key.to_string()));

    RequestContext {
        api_key,
        principal,
        headers: headers.clone(),
    }
}
