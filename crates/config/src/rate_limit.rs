//! Rate limit configuration shared by the HTTP layer and individual providers/models.

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Storage backend for the rate limiter's counters.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitStorage {
    /// In-process counters. Lost on restart, not shared across instances.
    #[default]
    Memory,
}

/// A single rate limit: a request budget over a time window.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Quota {
    /// Maximum number of requests allowed within `interval`.
    pub limit: u32,
    /// The window over which `limit` applies, e.g. `"1s"`, `"1m"`.
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: std::time::Duration,
}

/// HTTP-layer rate limit configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled at all.
    pub enabled: bool,
    /// Storage backend for counters.
    pub storage: RateLimitStorage,
    /// A limit applied across all traffic, regardless of client.
    pub global: Option<Quota>,
    /// A limit applied per client IP address.
    pub per_ip: Option<Quota>,
}

/// Token-based rate limits for a provider or a specific model.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TokenRateLimitsConfig {
    /// Maximum requests per second.
    pub requests_per_second: Option<u32>,
    /// Maximum input+output tokens per minute.
    pub tokens_per_minute: Option<u64>,
}
