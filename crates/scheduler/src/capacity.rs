//! Admission-time capacity checks: concurrency, request rate, token rate, context length.
//!
//! All four trackers must admit a request for it to be dispatched. Concurrency is
//! released explicitly by the caller; the rate-based trackers consume on check and are
//! never refunded, matching a standard token-bucket's semantics.

use std::{
    num::NonZeroU32,
    sync::atomic::{AtomicU32, Ordering},
};

use governor::{Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::NotKeyed};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Why a request was rejected at admission time.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum CapacityError {
    /// The concurrent in-flight limit is already saturated.
    #[error("max_concurrent limit reached")]
    ConcurrencyExhausted,
    /// The requests-per-second bucket has no tokens left.
    #[error("max_rps limit reached")]
    RpsExhausted,
    /// The tokens-per-second bucket has no tokens left for this request's size.
    #[error("max_tokens_per_sec limit reached")]
    TokenRateExhausted,
    /// The request's estimated context length exceeds the configured maximum.
    #[error("request context length exceeds max_context_length")]
    ContextTooLong,
}

/// Live capacity trackers, rebuilt from configuration and adjustable by time rules.
pub struct Capacity {
    max_concurrent: AtomicU32,
    in_flight: AtomicU32,
    max_context_length: AtomicU32,
    rps: Option<DirectLimiter>,
    tokens_per_sec: Option<DirectLimiter>,
}

const UNLIMITED: u32 = u32::MAX;

impl Capacity {
    pub(crate) fn new(config: &config::CapacityConfig) -> Self {
        Self {
            max_concurrent: AtomicU32::new(config.max_concurrent),
            in_flight: AtomicU32::new(0),
            max_context_length: AtomicU32::new(config.max_context_length.unwrap_or(UNLIMITED)),
            rps: config.max_rps.and_then(build_limiter),
            tokens_per_sec: config.max_tokens_per_sec.and_then(build_limiter),
        }
    }

    /// Try to admit a request with the given estimated token count. On success, the
    /// caller must call [`Capacity::release`] exactly once, even on an error path after
    /// dispatch.
    pub(crate) fn try_admit(&self, estimated_tokens: u32) -> Result<(), CapacityError> {
        let max_context = self.max_context_length.load(Ordering::Relaxed);
        if max_context != UNLIMITED && estimated_tokens > max_context {
            return Err(CapacityError::ContextTooLong);
        }

        if let Some(limiter) = &self.rps
            && limiter.check().is_err()
        {
            return Err(CapacityError::RpsExhausted);
        }

        if let Some(limiter) = &self.tokens_per_sec {
            let cells = NonZeroU32::new(estimated_tokens.max(1)).expect("max(1) is never zero");
            match limiter.check_n(cells) {
                Ok(Ok(())) => {}
                _ => return Err(CapacityError::TokenRateExhausted),
            }
        }

        let max_concurrent = self.max_concurrent.load(Ordering::Relaxed);
        loop {
            let current = self.in_flight.load(Ordering::Acquire);
            if current >= max_concurrent {
                return Err(CapacityError::ConcurrencyExhausted);
            }
            if self
                .in_flight
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    /// Release a concurrency slot admitted by [`Capacity::try_admit`].
    pub(crate) fn release(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Current in-flight count, for stats snapshots.
    pub(crate) fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Apply a time rule's `max_concurrent` override, or restore `default` if `None`.
    pub(crate) fn set_max_concurrent(&self, value: Option<u32>, default: u32) {
        self.max_concurrent.store(value.unwrap_or(default), Ordering::Relaxed);
    }
}

fn build_limiter(per_second: u32) -> Option<DirectLimiter> {
    let quota = Quota::per_second(NonZeroU32::new(per_second)?);
    Some(RateLimiter::direct(quota))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capacity(max_concurrent: u32) -> Capacity {
        Capacity::new(&config::CapacityConfig {
            max_concurrent,
            max_rps: None,
            max_tokens_per_sec: None,
            max_context_length: None,
        })
    }

    #[test]
    fn admits_up_to_the_concurrency_limit_then_rejects() {
        let capacity = capacity(2);
        assert!(capacity.try_admit(10).is_ok());
        assert!(capacity.try_admit(10).is_ok());
        assert_eq!(capacity.try_admit(10), Err(CapacityError::ConcurrencyExhausted));
    }

    #[test]
    fn release_frees_a_concurrency_slot() {
        let capacity = capacity(1);
        capacity.try_admit(10).unwrap();
        assert_eq!(capacity.try_admit(10), Err(CapacityError::ConcurrencyExhausted));
        capacity.release();
        assert!(capacity.try_admit(10).is_ok());
    }

    #[test]
    fn rejects_requests_longer_than_max_context_length() {
        let capacity = Capacity::new(&config::CapacityConfig {
            max_concurrent: 10,
            max_rps: None,
            max_tokens_per_sec: None,
            max_context_length: Some(100),
        });

        assert_eq!(capacity.try_admit(200), Err(CapacityError::ContextTooLong));
        assert!(capacity.try_admit(50).is_ok());
    }
}
