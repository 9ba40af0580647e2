//! Authentication and authorization errors.

/// Errors produced while resolving or checking a request's principal.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No usable credential was present, or the credential did not resolve to a principal.
    #[error("Unauthorized")]
    Unauthorized,
    /// A principal was resolved but lacks the role required for the endpoint.
    #[error("Forbidden")]
    Forbidden,
    /// The `PrincipalLookup` implementation failed unexpectedly.
    #[error("Internal server error")]
    Internal,
}
