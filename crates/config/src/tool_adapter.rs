//! Tool adapter configuration: which tools get filtered out per provider, and the
//! guidance injected into the system message in their place.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

/// Configuration for the tool adapter.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ToolAdapterConfig {
    /// Per-provider set of tool names to strip from outbound requests.
    pub filtered_tools: HashMap<String, HashSet<String>>,
    /// Template for the guidance snippet appended to the system message when tools
    /// are filtered. `{tools}` is replaced with a comma-separated list of the
    /// filtered tool names.
    pub guidance_template: Option<String>,
}

impl ToolAdapterConfig {
    /// The tools filtered for the given provider name, if any are configured.
    pub fn filtered_tools_for(&self, provider: &str) -> Option<&HashSet<String>> {
        self.filtered_tools.get(provider).filter(|set| !set.is_empty())
    }

    /// The guidance snippet text, falling back to a sensible default.
    pub fn guidance_for(&self, filtered: &[&str]) -> String {
        let joined = filtered.join(", ");

        match &self.guidance_template {
            Some(template) => template.replace("{tools}", &joined),
            None => format!(
                "The following tools are unavailable in this session: {joined}. \
                 Prefer shell commands or plain text instructions to accomplish the same goal."
            ),
        }
    }
}
