//! Request-scoped principal types shared between the auth layer, the rate limiter,
//! and the LLM handlers.

#![deny(missing_docs)]

mod authentication;

pub use authentication::{Authentication, Principal};
