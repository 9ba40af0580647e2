//! Time-based overrides for scheduler weights, quotas, and capacity.

use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Day of week, matching jiff's `Weekday` ordering (Monday = 0).
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    /// Monday.
    Monday,
    /// Tuesday.
    Tuesday,
    /// Wednesday.
    Wednesday,
    /// Thursday.
    Thursday,
    /// Friday.
    Friday,
    /// Saturday.
    Saturday,
    /// Sunday.
    Sunday,
}

/// A single time window during which an override is active.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeRule {
    /// Human-readable name, surfaced on the admin endpoint listing active rules.
    pub name: String,
    /// IANA timezone name the window is evaluated in, e.g. `"America/Los_Angeles"`.
    pub timezone: String,
    /// Start hour (0-23, inclusive) in the configured timezone.
    pub start_hour: u8,
    /// End hour (0-23, exclusive) in the configured timezone.
    pub end_hour: u8,
    /// Days of the week the rule applies on. Empty means every day.
    #[serde(default)]
    pub days: Vec<DayOfWeek>,
    /// Account id this override applies to, if it is account-scoped.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Overridden tier weight, if any (used by the `wfq`/`hybrid` policy).
    #[serde(default)]
    pub weight: Option<u32>,
    /// Overridden per-account request quota, if any.
    #[serde(default)]
    pub quota: Option<u32>,
    /// Overridden global max-concurrent capacity, if any.
    #[serde(default)]
    pub max_concurrent: Option<u32>,
}

/// Configuration for the time-based rule engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeRulesConfig {
    /// Whether the engine is active.
    pub enabled: bool,
    /// The configured rules, evaluated in order; all matching rules apply.
    pub rules: Vec<TimeRule>,
    /// How often the background task re-evaluates which rules are active.
    #[serde(deserialize_with = "deserialize_duration")]
    pub check_interval: Duration,
    /// How often the background task checks `source_path`'s mtime for hot reload.
    #[serde(deserialize_with = "deserialize_duration")]
    pub file_check_interval: Duration,
    /// Optional path to an external file defining additional rules, reloaded on change.
    pub source_path: Option<String>,
}

impl Default for TimeRulesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rules: Vec::new(),
            check_interval: Duration::from_secs(30),
            file_check_interval: Duration::from_secs(30),
            source_path: None,
        }
    }
}
