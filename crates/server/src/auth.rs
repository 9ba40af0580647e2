//! Authentication: resolves the `Authorization: Bearer …` / `X-API-Key` header into a
//! `context::Principal` via an externally-supplied `PrincipalLookup`.

mod error;
mod layer;
mod principal_lookup;

pub(crate) use layer::*;
pub use principal_lookup::{AlwaysAdmin, PrincipalLookup};

type AuthResult<T> = Result<T, error::AuthError>;
