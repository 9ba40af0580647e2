//! Routing table: which provider serves a given model, and whether the gateway may
//! translate between wire formats or must delegate the request byte-for-byte.

use serde::Deserialize;

/// How the router resolves the mode of an inbound request.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkMode {
    /// Use the endpoint/provider arbitration table as-is.
    #[default]
    Auto,
    /// Reject any row that would require translation.
    Passthrough,
    /// Reject any row that would delegate untranslated.
    Translation,
}

/// A single entry in the ordered route table. The first pattern that matches the
/// requested model name wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteRule {
    /// A glob pattern matched case-insensitively against the model name, e.g. `"gpt-*"`.
    pub pattern: String,
    /// The provider (by name, as configured under `[llm.providers]`) this pattern routes to.
    pub target_provider: String,
}

/// Router configuration: the work-mode override and the ordered route table.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// The work-mode override.
    pub work_mode: WorkMode,
    /// Ordered list of route rules; first match wins.
    pub routes: Vec<RouteRule>,
}
