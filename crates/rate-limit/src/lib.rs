//! In-process, token-bucket rate limiting, shared by the HTTP rate-limit layer and
//! reused by the scheduler's RPS / tokens-per-second capacity trackers.

#![deny(missing_docs)]

use std::{
    net::IpAddr,
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

use config::{Quota as ConfigQuota, RateLimitConfig, TokenRateLimitsConfig};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::{InMemoryState, keyed::DefaultKeyedStateStore},
};

/// Errors produced while checking a rate limit.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The request was rejected because a configured limit was exceeded.
    #[error("rate limit exceeded")]
    TooManyRequests,
    /// The limiter's storage failed unexpectedly.
    #[error("rate limit storage error: {0}")]
    Storage(String),
}

/// A single rate-limit check against IP and, if identified, account id.
pub struct RateLimitRequest {
    ip: IpAddr,
    account_id: Option<String>,
}

impl RateLimitRequest {
    /// Start building a request.
    pub fn builder() -> RateLimitRequestBuilder {
        RateLimitRequestBuilder::default()
    }
}

/// Builder for [`RateLimitRequest`].
#[derive(Default)]
pub struct RateLimitRequestBuilder {
    ip: Option<IpAddr>,
    account_id: Option<String>,
}

impl RateLimitRequestBuilder {
    /// Set the client IP address.
    pub fn ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Set the identified account id, if any.
    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Build the request. Panics if `ip` was never set.
    pub fn build(self) -> RateLimitRequest {
        RateLimitRequest {
            ip: self.ip.expect("RateLimitRequest requires an ip"),
            account_id: self.account_id,
        }
    }
}

type KeyedLimiter<K> = RateLimiter<K, DefaultKeyedStateStore<K>, DefaultClock>;
type GlobalLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

fn governor_quota(quota: &ConfigQuota) -> Quota {
    let burst = NonZeroU32::new(quota.limit).unwrap_or(NonZeroU32::new(1).unwrap());
    let replenish_interval = quota.interval / quota.limit.max(1);

    Quota::with_period(replenish_interval)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

/// Manages the HTTP layer's global, per-IP, and per-account rate limits.
pub struct RateLimitManager {
    global: Option<GlobalLimiter>,
    per_ip: Option<KeyedLimiter<IpAddr>>,
    per_account: DashMap<String, Arc<GlobalLimiter>>,
    per_account_quota: Option<Quota>,
}

impl RateLimitManager {
    /// Build a new manager from the HTTP rate limit configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            global: config.global.as_ref().map(governor_quota).map(RateLimiter::direct),
            per_ip: config.per_ip.as_ref().map(governor_quota).map(RateLimiter::keyed),
            per_account: DashMap::new(),
            per_account_quota: config.per_ip.as_ref().map(governor_quota),
        }
    }

    /// Check (and consume a token from) every configured limit applicable to this request.
    pub async fn check_request(&self, request: &RateLimitRequest) -> Result<(), RateLimitError> {
        if let Some(global) = &self.global
            && global.check().is_err()
        {
            return Err(RateLimitError::TooManyRequests);
        }

        if let Some(per_ip) = &self.per_ip
            && per_ip.check_key(&request.ip).is_err()
        {
            return Err(RateLimitError::TooManyRequests);
        }

        if let (Some(account_id), Some(quota)) = (&request.account_id, self.per_account_quota) {
            let limiter = self
                .per_account
                .entry(account_id.clone())
                .or_insert_with(|| Arc::new(RateLimiter::direct(quota)))
                .clone();

            if limiter.check().is_err() {
                return Err(RateLimitError::TooManyRequests);
            }
        }

        Ok(())
    }
}

/// A plain token-bucket limiter, reused by the scheduler for RPS and
/// tokens-per-second capacity tracking outside the HTTP rate-limit layer.
pub struct TokenBucket {
    limiter: GlobalLimiter,
}

impl TokenBucket {
    /// Build a bucket allowing `rate` events per second, with a burst equal to `rate`.
    pub fn per_second(rate: u32) -> Self {
        let rate = NonZeroU32::new(rate).unwrap_or(NonZeroU32::new(1).unwrap());
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        }
    }

    /// Try to consume `n` units (e.g. tokens) from the bucket. Returns `false` if
    /// the bucket has insufficient capacity right now.
    pub fn try_consume(&self, n: u32) -> bool {
        match NonZeroU32::new(n) {
            Some(n) => self.limiter.check_n(n).is_ok_and(|r| r.is_ok()),
            None => true,
        }
    }

    /// Block until `n` units are available.
    pub async fn until_ready(&self, n: u32) {
        let Some(n) = NonZeroU32::new(n) else { return };

        loop {
            match self.limiter.check_n(n) {
                Ok(Ok(())) => return,
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
    }
}

/// A single request to the token-based provider/model rate limiter.
pub struct TokenRateLimitRequest {
    /// The authenticated account id, if client identification is enabled.
    pub account_id: Option<String>,
    /// The provider the request was routed to.
    pub provider: String,
    /// The model the request was routed to, if resolved.
    pub model: Option<String>,
    /// Input tokens counted for this request.
    pub input_tokens: u64,
}

/// Tracks per-provider and per-model request-rate and token-rate budgets, scoped by
/// account id when available, falling back to a shared bucket otherwise.
#[derive(Default)]
pub struct TokenRateLimitManager {
    requests: DashMap<(String, String, Option<String>), Arc<GlobalLimiter>>,
    tokens: DashMap<(String, String, Option<String>), Arc<GlobalLimiter>>,
}

impl TokenRateLimitManager {
    /// Build an empty manager. Buckets are created lazily per provider/model/account
    /// the first time a configured limit is seen for that key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the effective rate limit for a request, where model-level configuration
    /// overrides the provider-level one field at a time. Returns `Ok(Some(duration))`
    /// with an (approximate) retry-after when the request should be delayed or
    /// rejected, `Ok(None)` when it may proceed immediately.
    pub async fn check_request(
        &self,
        request: &TokenRateLimitRequest,
        provider_limits: Option<&TokenRateLimitsConfig>,
        model_limits: Option<&TokenRateLimitsConfig>,
    ) -> Result<Option<Duration>, RateLimitError> {
        let requests_per_second = model_limits
            .and_then(|l| l.requests_per_second)
            .or_else(|| provider_limits.and_then(|l| l.requests_per_second));

        let tokens_per_minute = model_limits
            .and_then(|l| l.tokens_per_minute)
            .or_else(|| provider_limits.and_then(|l| l.tokens_per_minute));

        let model = request.model.clone().unwrap_or_default();
        let key = (request.provider.clone(), model, request.account_id.clone());

        if let Some(rps) = requests_per_second {
            let limiter = self
                .requests
                .entry(key.clone())
                .or_insert_with(|| Arc::new(RateLimiter::direct(Quota::per_second(NonZeroU32::new(rps.max(1)).unwrap()))))
                .clone();

            if let Err(not_until) = limiter.check() {
                return Ok(Some(not_until.wait_time_from(DefaultClock::default().now())));
            }
        }

        if let Some(tpm) = tokens_per_minute {
            let burst = NonZeroU32::new(tpm.min(u32::MAX as u64).max(1) as u32).unwrap();
            let limiter = self
                .tokens
                .entry(key)
                .or_insert_with(|| Arc::new(RateLimiter::direct(Quota::per_minute(burst).allow_burst(burst))))
                .clone();

            let tokens = NonZeroU32::new(request.input_tokens.min(u32::MAX as u64).max(1) as u32).unwrap();

            if let Err(not_until) = limiter.check_n(tokens).map_err(|e| RateLimitError::Storage(e.to_string()))? {
                return Ok(Some(not_until.wait_time_from(DefaultClock::default().now())));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_requests_under_the_limit() {
        let config = RateLimitConfig {
            enabled: true,
            global: Some(ConfigQuota {
                limit: 5,
                interval: Duration::from_secs(1),
            }),
            ..Default::default()
        };

        let manager = RateLimitManager::new(config);
        let request = RateLimitRequest::builder().ip("127.0.0.1".parse().unwrap()).build();

        manager.check_request(&request).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_requests_once_the_bucket_is_empty() {
        let config = RateLimitConfig {
            enabled: true,
            global: Some(ConfigQuota {
                limit: 1,
                interval: Duration::from_secs(60),
            }),
            ..Default::default()
        };

        let manager = RateLimitManager::new(config);
        let request = RateLimitRequest::builder().ip("127.0.0.1".parse().unwrap()).build();

        manager.check_request(&request).await.unwrap();
        let err = manager.check_request(&request).await.unwrap_err();
        assert!(matches!(err, RateLimitError::TooManyRequests));
    }

    #[test]
    fn token_bucket_denies_overdraft() {
        let bucket = TokenBucket::per_second(2);
        assert!(bucket.try_consume(2));
        assert!(!bucket.try_consume(2));
    }
}
