//! Client identification: whether per-account rate limiting and scheduler quotas
//! key off the authenticated principal's account id.

use serde::Deserialize;

/// Configuration controlling whether clients are identified for rate limiting and
/// scheduling, beyond the bare client IP.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ClientIdentificationConfig {
    /// Whether per-account identification is enabled. When disabled, rate limits
    /// and scheduler quotas are only ever applied per client IP.
    pub enabled: bool,
}
