//! The authenticated principal attached to a request by the auth layer.

/// The authenticated principal resolved for an inbound request, via
/// `server::auth::PrincipalLookup`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    /// Stable account identifier, used for per-account rate limiting, scheduler
    /// quotas, and Responses-API session ownership.
    pub account_id: String,
    /// Whether this principal may call `/admin/*` endpoints.
    pub is_admin: bool,
    /// The API key id the principal authenticated with, if any (never the raw key).
    pub api_key_id: Option<String>,
}

impl Principal {
    /// The synthetic principal used when `auth_disabled = true`.
    pub fn synthetic_admin() -> Self {
        Self {
            account_id: "root".to_string(),
            is_admin: true,
            api_key_id: None,
        }
    }
}

/// The authentication state resolved for an inbound request.
#[derive(Default, Clone, Debug)]
pub struct Authentication {
    /// The resolved principal, if the request authenticated successfully.
    pub principal: Option<Principal>,
    /// Whether the request carried a bearer token meant for a delegated
    /// (passthrough) upstream, rather than gateway-validated auth.
    pub has_passthrough_authorization: bool,
}
