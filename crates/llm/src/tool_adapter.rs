//! Strips tools a target provider can't handle out of an outbound request, replacing
//! them with a guidance snippet in the system message.
//!
//! Operates on the unified request after routing, before provider-specific translation,
//! so it is a single pure function regardless of wire format.

use std::collections::HashSet;

use config::ToolAdapterConfig;

use crate::messages::unified::{UnifiedContentContainer, UnifiedMessage, UnifiedRequest, UnifiedRole, UnifiedToolCall};

/// Remove `filtered` tools from `request.tools`, append guidance to the system
/// message, and scrub any tool_calls/tool-result messages that reference them.
///
/// Idempotent: running this twice on an already-adapted request is a no-op, since
/// the filtered tools are no longer present to remove and the guidance snippet is
/// only appended when at least one tool was actually filtered this call.
pub(crate) fn adapt(mut request: UnifiedRequest, config: &ToolAdapterConfig, provider: &str) -> UnifiedRequest {
    let Some(filtered) = config.filtered_tools_for(provider) else {
        return request;
    };

    let Some(tools) = request.tools.as_mut() else {
        return request;
    };

    let mut removed = Vec::new();
    tools.retain(|tool| {
        if filtered.contains(&tool.function.name) {
            removed.push(tool.function.name.clone());
            false
        } else {
            true
        }
    });

    if removed.is_empty() {
        return request;
    }

    if tools.is_empty() {
        request.tools = None;
    }

    let removed_refs: Vec<&str> = removed.iter().map(String::as_str).collect();
    let guidance = config.guidance_for(&removed_refs);
    request.system = Some(match request.system {
        Some(system) => format!("{system}\n\n{guidance}"),
        None => guidance,
    });

    let removed_set: HashSet<&str> = removed_refs.into_iter().collect();
    for message in &mut request.messages {
        scrub_message(message, &removed_set);
    }

    request
}

fn scrub_message(message: &mut UnifiedMessage, removed: &HashSet<&str>) {
    if let Some(tool_calls) = message.tool_calls.as_mut() {
        tool_calls.retain(|call| !removed.contains(call.function.name.as_str()));
        if tool_calls.is_empty() {
            message.tool_calls = None;
        }
    }

    if message.role == UnifiedRole::Tool {
        // Tool-result messages carry no function name of their own; they're only
        // identifiable by the call they respond to, which the adapter doesn't track
        // across messages. Leave them as-is; the corresponding tool_use was already
        // stripped from the assistant message that preceded it.
        return;
    }

    if let UnifiedContentContainer::Blocks(blocks) = &mut message.content {
        blocks.retain(|block| match block {
            crate::messages::unified::UnifiedContent::ToolUse { name, .. } => !removed.contains(name.as_str()),
            _ => true,
        });
    }
}

/// Whether any of `calls` reference a filtered tool name, used by callers that need
/// to decide whether to re-run the adapter after appending new tool results.
#[allow(dead_code)]
pub(crate) fn references_filtered_tool(calls: &[UnifiedToolCall], removed: &HashSet<&str>) -> bool {
    calls.iter().any(|call| removed.contains(call.function.name.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::unified::{UnifiedFunction, UnifiedTool};
    use std::collections::{HashMap, HashSet as StdHashSet};

    fn config_with_filter(provider: &str, tools: &[&str]) -> ToolAdapterConfig {
        let mut filtered_tools = HashMap::new();
        filtered_tools.insert(provider.to_string(), tools.iter().map(|t| t.to_string()).collect::<StdHashSet<_>>());

        ToolAdapterConfig {
            filtered_tools,
            guidance_template: None,
        }
    }

    fn request_with_tools(names: &[&str]) -> UnifiedRequest {
        UnifiedRequest {
            model: "claude-3-opus".to_string(),
            messages: Vec::new(),
            system: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            top_k: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop_sequences: None,
            stream: None,
            tools: Some(
                names
                    .iter()
                    .map(|name| UnifiedTool {
                        function: UnifiedFunction {
                            name: name.to_string(),
                            description: "test tool".to_string(),
                            parameters: serde_json::json!({}),
                        },
                    })
                    .collect(),
            ),
            tool_choice: None,
            parallel_tool_calls: None,
            metadata: None,
        }
    }

    #[test]
    fn removes_filtered_tool_and_adds_guidance() {
        let config = config_with_filter("anthropic", &["apply_patch"]);
        let request = request_with_tools(&["apply_patch", "read_file"]);

        let adapted = adapt(request, &config, "anthropic");

        let remaining: Vec<_> = adapted.tools.unwrap().into_iter().map(|t| t.function.name).collect();
        assert_eq!(remaining, vec!["read_file"]);
        assert!(adapted.system.unwrap().contains("apply_patch"));
    }

    #[test]
    fn no_op_when_provider_has_no_filter_configured() {
        let config = config_with_filter("anthropic", &["apply_patch"]);
        let request = request_with_tools(&["apply_patch"]);

        let adapted = adapt(request, &config, "openai");

        assert_eq!(adapted.tools.unwrap().len(), 1);
        assert!(adapted.system.is_none());
    }

    #[test]
    fn drops_tools_field_entirely_when_all_filtered() {
        let config = config_with_filter("anthropic", &["apply_patch"]);
        let request = request_with_tools(&["apply_patch"]);

        let adapted = adapt(request, &config, "anthropic");

        assert!(adapted.tools.is_none());
    }
}
