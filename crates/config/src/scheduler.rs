//! Priority scheduler configuration.

use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Number of priority tiers the scheduler supports (0..=9).
pub const PRIORITY_LEVELS: u8 = 10;

/// Dispatch policy used to pick the next request among non-empty tiers.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPolicy {
    /// Lower priority number always served first, no fairness.
    Strict,
    /// Weighted fair queuing among all tiers.
    Wfq,
    /// P0 strict, P1-P9 weighted fair queuing. The default.
    #[default]
    Hybrid,
}

/// Capacity limits enforced on admission.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapacityConfig {
    /// Maximum number of concurrently in-flight requests.
    pub max_concurrent: u32,
    /// Maximum requests per second, enforced via a token bucket.
    pub max_rps: Option<u32>,
    /// Maximum input+output tokens per second, enforced via a token bucket.
    pub max_tokens_per_sec: Option<u32>,
    /// Maximum context length (input tokens) a single request may declare.
    pub max_context_length: Option<u32>,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 64,
            max_rps: None,
            max_tokens_per_sec: None,
            max_context_length: None,
        }
    }
}

/// Priority scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Whether the scheduler gates requests. When disabled, requests are admitted immediately.
    pub enabled: bool,
    /// The dispatch policy.
    pub policy: SchedulerPolicy,
    /// Default priority tier (0..=9) assigned to requests with no/invalid `X-Priority` header.
    pub default_priority: u8,
    /// Maximum queue depth per tier.
    pub max_queue_depth: usize,
    /// How long a request may wait in its tier's queue before it is rejected as expired.
    #[serde(deserialize_with = "deserialize_duration")]
    pub queue_timeout: Duration,
    /// How often the stats snapshot is refreshed.
    #[serde(deserialize_with = "deserialize_duration")]
    pub stats_interval: Duration,
    /// Capacity trackers.
    pub capacity: CapacityConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            policy: SchedulerPolicy::default(),
            default_priority: 5,
            max_queue_depth: 256,
            queue_timeout: Duration::from_secs(30),
            stats_interval: Duration::from_secs(5),
            capacity: CapacityConfig::default(),
        }
    }
}
