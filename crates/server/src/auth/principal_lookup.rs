//! The trait boundary at which identity/API-key storage is owned externally.

use context::Principal;

use super::AuthResult;

/// Resolves a bearer token or API key into a `Principal`.
///
/// The gateway core never stores users or API keys itself — it depends on this
/// trait object, supplied at wiring time, to look the token up against whatever
/// userstore the deployment uses.
#[async_trait::async_trait]
pub trait PrincipalLookup: Send + Sync {
    /// Resolve `token` (the raw bearer token or API key) into a `Principal`.
    async fn lookup(&self, token: &str) -> AuthResult<Principal>;
}

/// A trivial `PrincipalLookup` that authenticates every token as the synthetic
/// admin principal. Backs `auth_disabled = true` and integration tests.
pub struct AlwaysAdmin;

#[async_trait::async_trait]
impl PrincipalLookup for AlwaysAdmin {
    async fn lookup(&self, _token: &str) -> AuthResult<Principal> {
        Ok(Principal::synthetic_admin())
    }
}
