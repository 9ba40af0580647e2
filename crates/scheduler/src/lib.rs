//! Priority scheduler: gates admission of requests into the LLM providers behind
//! capacity limits and fair dispatch across priority tiers.
//!
//! Callers submit a request with an estimated token count and a priority (0 = highest).
//! [`Scheduler::submit`] either rejects synchronously (queue full for that tier, or the
//! request is too large to ever run) or hands back a receiver that resolves once the
//! dispatcher has admitted or expired the request.

mod capacity;
mod policy;
mod time_rules;

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use config::{PRIORITY_LEVELS, SchedulerConfig};
use tokio::sync::{Notify, oneshot};

pub use capacity::CapacityError;
pub use config::{CapacityConfig, SchedulerPolicy};
pub use time_rules::TimeRuleEngine;

use capacity::Capacity;
use policy::Weights;

const TIERS: usize = PRIORITY_LEVELS as usize;

/// Why a submission was rejected without ever being queued.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("priority {0} is outside the valid range 0..{PRIORITY_LEVELS}")]
    InvalidPriority(u8),
    #[error("queue for this priority tier is full")]
    QueueFull,
    #[error("request exceeds max_context_length and can never be admitted")]
    TooLarge,
}

/// Outcome of a queued submission, delivered once the dispatcher has handled it.
pub struct ScheduleResult {
    pub accepted: bool,
    pub reason: Option<&'static str>,
    /// Present only when `accepted` is true. Drop it (or let it go out of scope) once
    /// the request has finished running to free its concurrency slot.
    pub permit: Option<Permit>,
}

/// RAII handle for an admitted request's concurrency slot. Releases on drop and wakes
/// the dispatcher so a queued request can claim the freed slot right away.
pub struct Permit {
    capacity: Arc<Capacity>,
    notify: Arc<Notify>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.capacity.release();
        self.notify.notify_one();
    }
}

struct QueuedRequest {
    estimated_tokens: u32,
    enqueued_at: tokio::time::Instant,
    result_tx: oneshot::Sender<ScheduleResult>,
}

/// Point-in-time view of queue depths and in-flight count, for status endpoints.
#[derive(Debug, Clone)]
pub struct Stats {
    pub queue_depth: [usize; TIERS],
    pub in_flight: u32,
    pub dispatched_total: u64,
    pub rejected_total: u64,
    pub expired_total: u64,
}

pub struct Scheduler {
    config: SchedulerConfig,
    queues: std::sync::Mutex<[VecDeque<QueuedRequest>; TIERS]>,
    queue_depth: [AtomicUsize; TIERS],
    notify: Arc<Notify>,
    capacity: Arc<Capacity>,
    time_rules: Arc<TimeRuleEngine>,
    dispatched_total: AtomicU64,
    rejected_total: AtomicU64,
    expired_total: AtomicU64,
}

impl Scheduler {
    /// Build a scheduler and spawn its dispatcher and time-rule evaluation tasks.
    ///
    /// Both background tasks run for the lifetime of the process; the dispatcher stops
    /// once every strong reference to the returned `Scheduler` is dropped.
    pub fn spawn(config: SchedulerConfig, time_rules: config::TimeRulesConfig) -> Arc<Self> {
        let capacity = Arc::new(Capacity::new(&config.capacity));
        let time_rule_engine = Arc::new(TimeRuleEngine::new(time_rules));
        let default_max_concurrent = config.capacity.max_concurrent;

        let scheduler = Arc::new(Scheduler {
            queue_depth: std::array::from_fn(|_| AtomicUsize::new(0)),
            queues: std::sync::Mutex::new(std::array::from_fn(|_| VecDeque::new())),
            notify: Arc::new(Notify::new()),
            capacity: capacity.clone(),
            time_rules: time_rule_engine.clone(),
            dispatched_total: AtomicU64::new(0),
            rejected_total: AtomicU64::new(0),
            expired_total: AtomicU64::new(0),
            config,
        });

        let weak = Arc::downgrade(&scheduler);
        tokio::spawn(async move { dispatch_loop(weak).await });
        time_rule_engine.spawn(capacity, default_max_concurrent);

        scheduler
    }

    /// The active time rules, for status reporting.
    pub fn time_rules(&self) -> &TimeRuleEngine {
        &self.time_rules
    }

    /// Submit a request at the given priority tier (0 = highest, 9 = lowest).
    ///
    /// Rejects synchronously if the tier's queue is already at `max_queue_depth` or the
    /// request's estimated size exceeds the configured `max_context_length`. Otherwise
    /// returns a receiver that resolves once the dispatcher admits or expires it.
    pub fn submit(&self, priority: u8, estimated_tokens: u32) -> Result<oneshot::Receiver<ScheduleResult>, SubmitError> {
        if priority as usize >= TIERS {
            return Err(SubmitError::InvalidPriority(priority));
        }

        if let Some(max) = self.config.capacity.max_context_length
            && estimated_tokens > max
        {
            self.rejected_total.fetch_add(1, Ordering::Relaxed);
            return Err(SubmitError::TooLarge);
        }

        let (result_tx, result_rx) = oneshot::channel();

        {
            let mut queues = self.queues.lock().expect("lock poisoned");
            let tier = &mut queues[priority as usize];

            if tier.len() >= self.config.max_queue_depth {
                self.rejected_total.fetch_add(1, Ordering::Relaxed);
                return Err(SubmitError::QueueFull);
            }

            tier.push_back(QueuedRequest {
                estimated_tokens,
                enqueued_at: tokio::time::Instant::now(),
                result_tx,
            });
        }

        self.queue_depth[priority as usize].fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();

        Ok(result_rx)
    }

    /// Snapshot current queue depths and dispatch counters.
    pub fn stats(&self) -> Stats {
        Stats {
            queue_depth: std::array::from_fn(|tier| self.queue_depth[tier].load(Ordering::Relaxed)),
            in_flight: self.capacity.in_flight(),
            dispatched_total: self.dispatched_total.load(Ordering::Relaxed),
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
            expired_total: self.expired_total.load(Ordering::Relaxed),
        }
    }

    fn non_empty_mask(&self) -> [bool; TIERS] {
        let queues = self.queues.lock().expect("lock poisoned");
        std::array::from_fn(|tier| !queues[tier].is_empty())
    }

    /// Try to dispatch exactly one request. Returns `true` if one was admitted or
    /// expired out of a queue (either way, progress was made and the caller should call
    /// this again before waiting).
    fn try_dispatch_one(&self, weights: &mut Weights) -> bool {
        let mut mask = self.non_empty_mask();
        let timeout = self.config.queue_timeout;

        loop {
            let Some(tier) = weights.select(&mask) else {
                return false;
            };

            let action = {
                let mut queues = self.queues.lock().expect("lock poisoned");
                let queue = &mut queues[tier as usize];

                match queue.front() {
                    None => DispatchAction::TierEmpty,
                    Some(req) if req.enqueued_at.elapsed() >= timeout => {
                        DispatchAction::Expired(queue.pop_front().expect("front just checked"))
                    }
                    Some(req) => DispatchAction::TryAdmit(req.estimated_tokens),
                }
            };

            match action {
                DispatchAction::TierEmpty => {
                    mask[tier as usize] = false;
                    continue;
                }
                DispatchAction::Expired(req) => {
                    self.queue_depth[tier as usize].fetch_sub(1, Ordering::Relaxed);
                    self.expired_total.fetch_add(1, Ordering::Relaxed);
                    let _ = req.result_tx.send(ScheduleResult {
                        accepted: false,
                        reason: Some("expired"),
                        permit: None,
                    });
                    continue;
                }
                DispatchAction::TryAdmit(estimated_tokens) => match self.capacity.try_admit(estimated_tokens) {
                    Ok(()) => {
                        let req = {
                            let mut queues = self.queues.lock().expect("lock poisoned");
                            queues[tier as usize].pop_front().expect("front just checked")
                        };
                        self.queue_depth[tier as usize].fetch_sub(1, Ordering::Relaxed);
                        self.dispatched_total.fetch_add(1, Ordering::Relaxed);

                        let _ = req.result_tx.send(ScheduleResult {
                            accepted: true,
                            reason: None,
                            permit: Some(Permit {
                                capacity: self.capacity.clone(),
                                notify: self.notify.clone(),
                            }),
                        });
                        return true;
                    }
                    Err(_) => {
                        mask[tier as usize] = false;
                        continue;
                    }
                },
            }
        }
    }
}

enum DispatchAction {
    TierEmpty,
    Expired(QueuedRequest),
    TryAdmit(u32),
}

async fn dispatch_loop(scheduler: std::sync::Weak<Scheduler>) {
    let Some(strong) = scheduler.upgrade() else { return };
    let mut weights = Weights::new(strong.config.policy);
    drop(strong);

    loop {
        let Some(scheduler) = scheduler.upgrade() else { return };

        let made_progress = scheduler.try_dispatch_one(&mut weights);
        if made_progress {
            continue;
        }

        // Wake on new submissions, a capacity release, or a bounded timeout so
        // time-rule-driven capacity changes and queue expiry are still noticed.
        let notified = scheduler.notify.notified();
        let poll_interval = scheduler.config.stats_interval.min(std::time::Duration::from_secs(1));
        drop(scheduler);

        tokio::select! {
            () = notified => {}
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use config::{CapacityConfig, SchedulerPolicy, TimeRulesConfig};

    use super::*;

    fn test_config(policy: SchedulerPolicy, max_concurrent: u32) -> SchedulerConfig {
        SchedulerConfig {
            enabled: true,
            policy,
            default_priority: 5,
            max_queue_depth: 4,
            queue_timeout: Duration::from_millis(200),
            stats_interval: Duration::from_millis(50),
            capacity: CapacityConfig {
                max_concurrent,
                max_rps: None,
                max_tokens_per_sec: None,
                max_context_length: Some(1000),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn admits_a_submitted_request_when_capacity_allows() {
        let scheduler = Scheduler::spawn(test_config(SchedulerPolicy::Hybrid, 1), TimeRulesConfig::default());
        let rx = scheduler.submit(5, 10).expect("should enqueue");

        tokio::time::advance(Duration::from_millis(10)).await;
        let result = rx.await.expect("dispatcher should reply");

        assert!(result.accepted);
        assert!(result.permit.is_some());
    }

    #[tokio::test]
    async fn rejects_requests_over_the_context_limit_synchronously() {
        let scheduler = Scheduler::spawn(test_config(SchedulerPolicy::Strict, 4), TimeRulesConfig::default());
        assert_eq!(scheduler.submit(0, 5000).unwrap_err(), SubmitError::TooLarge);
    }

    #[tokio::test]
    async fn rejects_when_a_tiers_queue_is_already_full() {
        let scheduler = Scheduler::spawn(test_config(SchedulerPolicy::Strict, 0), TimeRulesConfig::default());

        for _ in 0..4 {
            scheduler.submit(3, 10).expect("room in queue");
        }

        assert_eq!(scheduler.submit(3, 10).unwrap_err(), SubmitError::QueueFull);
    }

    #[tokio::test(start_paused = true)]
    async fn expires_requests_that_wait_past_the_queue_timeout() {
        let scheduler = Scheduler::spawn(test_config(SchedulerPolicy::Strict, 0), TimeRulesConfig::default());
        let rx = scheduler.submit(2, 10).expect("should enqueue");

        tokio::time::advance(Duration::from_millis(500)).await;
        let result = rx.await.expect("dispatcher should reply");

        assert!(!result.accepted);
        assert_eq!(result.reason, Some("expired"));
    }

    #[tokio::test(start_paused = true)]
    async fn strict_policy_starves_low_priority_while_high_priority_keeps_arriving() {
        let scheduler = Scheduler::spawn(test_config(SchedulerPolicy::Strict, 1), TimeRulesConfig::default());

        let low_rx = scheduler.submit(9, 10).expect("should enqueue");
        let high_rx = scheduler.submit(0, 10).expect("should enqueue");

        tokio::time::advance(Duration::from_millis(10)).await;
        let high = high_rx.await.expect("dispatcher should reply");
        assert!(high.accepted);

        drop(high.permit);
        tokio::time::advance(Duration::from_millis(10)).await;
        let low = low_rx.await.expect("dispatcher should reply");
        assert!(low.accepted);
    }
}
