//! Background evaluation of time-based scheduler overrides.
//!
//! Rules are re-evaluated on `check_interval`; an optional `source_path` file is
//! polled every `file_check_interval` and merged in on change, so operators can adjust
//! rules without a process restart.

use std::sync::{Arc, OnceLock};

use config::{DayOfWeek, TimeRule, TimeRulesConfig};
use jiff::{Zoned, tz::TimeZone};

use crate::capacity::Capacity;

struct CapacityHandle {
    capacity: Arc<Capacity>,
    default_max_concurrent: u32,
}

/// Runs the time-rule re-evaluation loop for the lifetime of the scheduler.
pub struct TimeRuleEngine {
    config: TimeRulesConfig,
    file_rules: std::sync::RwLock<Vec<TimeRule>>,
    last_file_mtime: std::sync::RwLock<Option<std::time::SystemTime>>,
    capacity_handle: OnceLock<CapacityHandle>,
}

impl TimeRuleEngine {
    pub(crate) fn new(config: TimeRulesConfig) -> Self {
        Self {
            config,
            file_rules: std::sync::RwLock::new(Vec::new()),
            last_file_mtime: std::sync::RwLock::new(None),
            capacity_handle: OnceLock::new(),
        }
    }

    /// Force an immediate re-evaluation of active rules against current capacity,
    /// without waiting for the next `check_interval` tick. No-op if never spawned.
    pub fn apply_now(&self) {
        if let Some(handle) = self.capacity_handle.get() {
            self.reevaluate(&handle.capacity, handle.default_max_concurrent);
        }
    }

    /// Force an immediate reload of `source_path`, without waiting for the next
    /// `file_check_interval` tick.
    pub async fn reload_now(&self) {
        self.reload_file().await;
    }

    /// All rules active right now: configured rules plus any loaded from `source_path`.
    pub fn active_rules(&self) -> Vec<TimeRule> {
        let now = Zoned::now();

        self.config
            .rules
            .iter()
            .chain(self.file_rules.read().expect("lock poisoned").iter())
            .filter(|rule| rule_matches(rule, &now))
            .cloned()
            .collect()
    }

    /// Spawn the re-evaluation loop. Returns its join handle; dropping it does not stop
    /// the task, it keeps running for the scheduler's lifetime.
    pub(crate) fn spawn(self: Arc<Self>, capacity: Arc<Capacity>, default_max_concurrent: u32) -> tokio::task::JoinHandle<()> {
        let _ = self.capacity_handle.set(CapacityHandle {
            capacity: capacity.clone(),
            default_max_concurrent,
        });

        tokio::spawn(async move {
            let mut check_ticker = tokio::time::interval(self.config.check_interval);
            let mut file_ticker = tokio::time::interval(self.config.file_check_interval);

            loop {
                tokio::select! {
                    _ = check_ticker.tick() => {
                        self.reevaluate(&capacity, default_max_concurrent);
                    }
                    _ = file_ticker.tick() => {
                        self.reload_file().await;
                    }
                }
            }
        })
    }

    fn reevaluate(&self, capacity: &Capacity, default_max_concurrent: u32) {
        if !self.config.enabled {
            return;
        }

        let active = self.active_rules();
        let global_override = active
            .iter()
            .filter(|rule| rule.account_id.is_none())
            .find_map(|rule| rule.max_concurrent);

        capacity.set_max_concurrent(global_override, default_max_concurrent);

        if !active.is_empty() {
            log::debug!("{} time rule(s) currently active", active.len());
        }
    }

    async fn reload_file(&self) {
        let Some(path) = self.config.source_path.as_deref() else {
            return;
        };

        let mtime = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(err) => {
                log::warn!("time_rules: could not stat source_path '{path}': {err}");
                return;
            }
        };

        let unchanged = self.last_file_mtime.read().expect("lock poisoned").is_some_and(|last| last == mtime);
        if unchanged {
            return;
        }

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) => {
                log::warn!("time_rules: could not read source_path '{path}': {err}");
                return;
            }
        };

        match toml::from_str::<Vec<TimeRule>>(&contents) {
            Ok(rules) => {
                log::info!("time_rules: reloaded {} rule(s) from '{path}'", rules.len());
                *self.file_rules.write().expect("lock poisoned") = rules;
                *self.last_file_mtime.write().expect("lock poisoned") = Some(mtime);
            }
            Err(err) => log::warn!("time_rules: failed to parse source_path '{path}': {err}"),
        }
    }
}

fn rule_matches(rule: &TimeRule, now: &Zoned) -> bool {
    let tz = match TimeZone::get(&rule.timezone) {
        Ok(tz) => tz,
        Err(err) => {
            log::warn!("time_rules: invalid timezone '{}' in rule '{}': {err}", rule.timezone, rule.name);
            return false;
        }
    };

    let local = now.with_time_zone(tz);
    let hour = local.hour();

    let in_window = if rule.start_hour <= rule.end_hour {
        hour >= rule.start_hour as i8 && hour < rule.end_hour as i8
    } else {
        // Wraps past midnight, e.g. 22..6.
        hour >= rule.start_hour as i8 || hour < rule.end_hour as i8
    };

    if !in_window {
        return false;
    }

    if rule.days.is_empty() {
        return true;
    }

    let today = weekday_of(&local);
    rule.days.contains(&today)
}

fn weekday_of(zoned: &Zoned) -> DayOfWeek {
    match zoned.weekday() {
        jiff::civil::Weekday::Monday => DayOfWeek::Monday,
        jiff::civil::Weekday::Tuesday => DayOfWeek::Tuesday,
        jiff::civil::Weekday::Wednesday => DayOfWeek::Wednesday,
        jiff::civil::Weekday::Thursday => DayOfWeek::Thursday,
        jiff::civil::Weekday::Friday => DayOfWeek::Friday,
        jiff::civil::Weekday::Saturday => DayOfWeek::Saturday,
        jiff::civil::Weekday::Sunday => DayOfWeek::Sunday,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_days_matches_every_day() {
        let rule = TimeRule {
            name: "always".to_string(),
            timezone: "UTC".to_string(),
            start_hour: 0,
            end_hour: 24,
            days: Vec::new(),
            account_id: None,
            weight: None,
            quota: None,
            max_concurrent: Some(10),
        };

        assert!(rule_matches(&rule, &Zoned::now()));
    }

    #[test]
    fn out_of_window_hour_does_not_match() {
        let rule = TimeRule {
            name: "never".to_string(),
            timezone: "UTC".to_string(),
            start_hour: 0,
            end_hour: 0,
            days: Vec::new(),
            account_id: None,
            weight: None,
            quota: None,
            max_concurrent: Some(10),
        };

        assert!(!rule_matches(&rule, &Zoned::now()));
    }
}
