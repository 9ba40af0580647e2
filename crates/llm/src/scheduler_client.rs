//! Bridges the unified request path to the priority scheduler crate.
//!
//! When `config.scheduler.enabled` is false this is a no-op: every request admits
//! immediately and [`SchedulerClient::admit`] returns `Ok(None)`.

use std::sync::Arc;

use config::Config;
use scheduler::{Scheduler, SubmitError};

use crate::{LlmError, messages::unified::UnifiedRequest, token_counter};

pub(crate) struct SchedulerClient {
    scheduler: Option<Arc<Scheduler>>,
    default_priority: u8,
}

impl SchedulerClient {
    /// A client with no backing scheduler: every request admits immediately.
    pub(crate) fn disabled() -> Self {
        Self {
            scheduler: None,
            default_priority: 0,
        }
    }

    pub(crate) fn new(config: &Config) -> Self {
        let scheduler = config
            .scheduler
            .enabled
            .then(|| Scheduler::spawn(config.scheduler.clone(), config.time_rules.clone()));

        Self {
            scheduler,
            default_priority: config.scheduler.default_priority,
        }
    }

    /// Admit `request` into the scheduler, blocking until it is dispatched or rejected.
    ///
    /// Returns `None` when the scheduler is disabled (request runs immediately) or
    /// `Some(permit)` once admitted; the permit must be held for the duration of the
    /// provider call and dropped afterwards to release its concurrency slot.
    pub(crate) async fn admit(&self, request: &UnifiedRequest, priority: Option<u8>) -> crate::Result<Option<scheduler::Permit>> {
        let Some(scheduler) = &self.scheduler else {
            return Ok(None);
        };

        let estimated_tokens = token_counter::count_input_tokens(request).min(u32::MAX as u64) as u32;
        let priority = priority.unwrap_or(self.default_priority);

        let result_rx = scheduler.submit(priority, estimated_tokens).map_err(|err| match err {
            SubmitError::QueueFull => LlmError::SchedulerQueueFull { retry_after_secs: 1 },
            SubmitError::TooLarge => LlmError::InvalidRequest(err.to_string()),
            SubmitError::InvalidPriority(_) => LlmError::InternalError(Some(err.to_string())),
        })?;

        let outcome = result_rx
            .await
            .map_err(|_| LlmError::InternalError(Some("scheduler dispatcher dropped the request".to_string())))?;

        if outcome.accepted {
            Ok(outcome.permit)
        } else {
            Err(LlmError::SchedulerExpired)
        }
    }

    /// Queue depths and dispatch counters, or `None` when the scheduler is disabled.
    pub(crate) fn stats(&self) -> Option<scheduler::Stats> {
        self.scheduler.as_ref().map(|scheduler| scheduler.stats())
    }

    /// Time rules currently active, or an empty list when the scheduler is disabled.
    pub(crate) fn active_time_rules(&self) -> Vec<config::TimeRule> {
        self.scheduler
            .as_ref()
            .map(|scheduler| scheduler.time_rules().active_rules())
            .unwrap_or_default()
    }

    /// Force an immediate re-evaluation of time rules against current capacity.
    pub(crate) fn apply_time_rules_now(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.time_rules().apply_now();
        }
    }

    /// Force an immediate reload of the time rules' `source_path` file, if configured.
    pub(crate) async fn reload_time_rules_now(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.time_rules().reload_now().await;
        }
    }
}
