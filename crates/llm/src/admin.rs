//! `/admin/*` status and control endpoints, gated on `Principal.is_admin`.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{Query, State},
    response::{IntoResponse, Json},
};
use serde::Serialize;

use crate::{error::LlmError, server::LlmHandler};

fn require_admin(authentication: &Option<Extension<context::Authentication>>) -> crate::Result<()> {
    let is_admin = authentication
        .as_ref()
        .and_then(|ext| ext.0.principal.as_ref())
        .is_some_and(|principal| principal.is_admin);

    if is_admin { Ok(()) } else { Err(LlmError::AdminRequired) }
}

#[derive(Serialize)]
pub(crate) struct SchedulerStatsResponse {
    enabled: bool,
    queue_depth: Vec<usize>,
    in_flight: u32,
    dispatched_total: u64,
    rejected_total: u64,
    expired_total: u64,
}

impl From<scheduler::Stats> for SchedulerStatsResponse {
    fn from(stats: scheduler::Stats) -> Self {
        Self {
            enabled: true,
            queue_depth: stats.queue_depth.to_vec(),
            in_flight: stats.in_flight,
            dispatched_total: stats.dispatched_total,
            rejected_total: stats.rejected_total,
            expired_total: stats.expired_total,
        }
    }
}

impl SchedulerStatsResponse {
    fn disabled() -> Self {
        Self {
            enabled: false,
            queue_depth: Vec::new(),
            in_flight: 0,
            dispatched_total: 0,
            rejected_total: 0,
            expired_total: 0,
        }
    }
}

pub(crate) async fn scheduler_stats(
    State(server): State<Arc<LlmHandler>>,
    authentication: Option<Extension<context::Authentication>>,
) -> crate::Result<impl IntoResponse> {
    require_admin(&authentication)?;

    let response = server
        .scheduler_stats()
        .map(SchedulerStatsResponse::from)
        .unwrap_or_else(SchedulerStatsResponse::disabled);

    Ok(Json(response))
}

#[derive(serde::Deserialize)]
pub(crate) struct QueuesQuery {
    #[serde(default)]
    top: Option<usize>,
}

#[derive(Serialize)]
pub(crate) struct QueueDepth {
    priority: u8,
    depth: usize,
}

#[derive(Serialize)]
pub(crate) struct QueuesResponse {
    queues: Vec<QueueDepth>,
}

/// Queue depths for the busiest priority tiers, highest depth first.
///
/// The scheduler only tracks aggregate depth per tier, not individual queued requests,
/// so `top` bounds how many tiers are returned rather than how many requests.
pub(crate) async fn scheduler_queues(
    State(server): State<Arc<LlmHandler>>,
    authentication: Option<Extension<context::Authentication>>,
    Query(query): Query<QueuesQuery>,
) -> crate::Result<impl IntoResponse> {
    require_admin(&authentication)?;

    let mut queues: Vec<QueueDepth> = server
        .scheduler_stats()
        .map(|stats| {
            stats
                .queue_depth
                .into_iter()
                .enumerate()
                .map(|(priority, depth)| QueueDepth {
                    priority: priority as u8,
                    depth,
                })
                .collect()
        })
        .unwrap_or_default();

    queues.sort_by(|a, b| b.depth.cmp(&a.depth));

    if let Some(top) = query.top {
        queues.truncate(top);
    }

    Ok(Json(QueuesResponse { queues }))
}

#[derive(Serialize)]
pub(crate) struct TimeRuleStatus {
    name: String,
    timezone: String,
    start_hour: u8,
    end_hour: u8,
    account_id: Option<String>,
}

impl From<config::TimeRule> for TimeRuleStatus {
    fn from(rule: config::TimeRule) -> Self {
        Self {
            name: rule.name,
            timezone: rule.timezone,
            start_hour: rule.start_hour,
            end_hour: rule.end_hour,
            account_id: rule.account_id,
        }
    }
}

pub(crate) async fn time_rules_status(
    State(server): State<Arc<LlmHandler>>,
    authentication: Option<Extension<context::Authentication>>,
) -> crate::Result<impl IntoResponse> {
    require_admin(&authentication)?;

    let active: Vec<TimeRuleStatus> = server.active_time_rules().into_iter().map(TimeRuleStatus::from).collect();

    Ok(Json(serde_json::json!({ "active": active })))
}

pub(crate) async fn time_rules_apply(
    State(server): State<Arc<LlmHandler>>,
    authentication: Option<Extension<context::Authentication>>,
) -> crate::Result<impl IntoResponse> {
    require_admin(&authentication)?;

    server.apply_time_rules_now();

    Ok(Json(serde_json::json!({ "status": "applied" })))
}

pub(crate) async fn time_rules_reload(
    State(server): State<Arc<LlmHandler>>,
    authentication: Option<Extension<context::Authentication>>,
) -> crate::Result<impl IntoResponse> {
    require_admin(&authentication)?;

    server.reload_time_rules_now().await;

    Ok(Json(serde_json::json!({ "status": "reloaded" })))
}
