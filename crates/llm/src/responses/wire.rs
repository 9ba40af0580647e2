//! Wire types for the OpenAI Responses API: request body, the `response` object, and
//! the streaming event envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::messages::unified;

/// Request body for `POST /v1/responses`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResponsesRequest {
    pub model: String,
    pub input: ResponsesInput,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub tools: Option<Vec<ResponsesTool>>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ResponsesInput {
    Text(String),
    Items(Vec<ResponsesInputItem>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ResponsesInputItem {
    Message { role: String, content: ResponsesMessageContent },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ResponsesMessageContent {
    Text(String),
    Parts(Vec<ResponsesContentInputPart>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ResponsesContentInputPart {
    InputText { text: String },
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResponsesTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub strict: Option<bool>,
}

/// Body for `POST /v1/responses/{id}/submit_tool_outputs`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SubmitToolOutputsRequest {
    pub tool_outputs: Vec<ToolOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// The `response` object embedded in `created`/`requires_action`/`completed` events.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ResponsesObject {
    pub id: String,
    pub object: &'static str,
    pub created_at: u64,
    pub model: String,
    pub status: &'static str,
    pub output: Vec<ResponsesOutputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponsesUsage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ResponsesOutputItem {
    Message {
        id: String,
        role: &'static str,
        content: Vec<ResponsesContentPart>,
    },
    FunctionCall {
        id: String,
        call_id: String,
        name: String,
        arguments: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ResponsesContentPart {
    OutputText { text: String },
}

#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct ResponsesUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl From<unified::UnifiedUsage> for ResponsesUsage {
    fn from(usage: unified::UnifiedUsage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// One SSE event in a Responses stream. Serializes with a `type` tag that is also used
/// (via [`ResponsesStreamEvent::type_str`]) as the SSE `event:` field.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub(crate) enum ResponsesStreamEvent {
    #[serde(rename = "response.created")]
    Created { response: ResponsesObject, sequence_number: u64 },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        item: ResponsesOutputItem,
        output_index: u32,
        sequence_number: u64,
    },

    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        item_id: String,
        output_index: u32,
        delta: String,
        sequence_number: u64,
    },

    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        item_id: String,
        output_index: u32,
        delta: String,
        sequence_number: u64,
    },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        item_id: String,
        output_index: u32,
        arguments: String,
        sequence_number: u64,
    },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        item: ResponsesOutputItem,
        output_index: u32,
        sequence_number: u64,
    },

    #[serde(rename = "response.requires_action")]
    RequiresAction { response: ResponsesObject, sequence_number: u64 },

    #[serde(rename = "response.completed")]
    Completed { response: ResponsesObject, sequence_number: u64 },

    #[serde(rename = "error")]
    Error { message: String, sequence_number: u64 },
}

impl ResponsesStreamEvent {
    /// The SSE `event:` field. Mirrors the `type` value embedded in the JSON body, per
    /// the Responses API's convention of naming events twice (framing and payload).
    pub(crate) fn type_str(&self) -> &'static str {
        match self {
            Self::Created { .. } => "response.created",
            Self::OutputItemAdded { .. } => "response.output_item.added",
            Self::OutputTextDelta { .. } => "response.output_text.delta",
            Self::FunctionCallArgumentsDelta { .. } => "response.function_call_arguments.delta",
            Self::FunctionCallArgumentsDone { .. } => "response.function_call_arguments.done",
            Self::OutputItemDone { .. } => "response.output_item.done",
            Self::RequiresAction { .. } => "response.requires_action",
            Self::Completed { .. } => "response.completed",
            Self::Error { .. } => "error",
        }
    }
}

impl From<ResponsesRequest> for unified::UnifiedRequest {
    fn from(req: ResponsesRequest) -> Self {
        let mut messages = Vec::new();

        match req.input {
            ResponsesInput::Text(text) => messages.push(unified::UnifiedMessage {
                role: unified::UnifiedRole::User,
                content: unified::UnifiedContentContainer::Text(text),
                tool_calls: None,
                tool_call_id: None,
            }),
            ResponsesInput::Items(items) => {
                for item in items {
                    let ResponsesInputItem::Message { role, content } = item;

                    let role = match role.as_str() {
                        "system" | "developer" => unified::UnifiedRole::System,
                        "assistant" => unified::UnifiedRole::Assistant,
                        _ => unified::UnifiedRole::User,
                    };

                    let text = match content {
                        ResponsesMessageContent::Text(text) => text,
                        ResponsesMessageContent::Parts(parts) => parts
                            .into_iter()
                            .map(|ResponsesContentInputPart::InputText { text }| text)
                            .collect::<Vec<_>>()
                            .join("\n"),
                    };

                    messages.push(unified::UnifiedMessage {
                        role,
                        content: unified::UnifiedContentContainer::Text(text),
                        tool_calls: None,
                        tool_call_id: None,
                    });
                }
            }
        }

        let tools = req.tools.map(|tools| {
            tools
                .into_iter()
                .map(|tool| unified::UnifiedTool {
                    function: unified::UnifiedFunction {
                        name: tool.name,
                        description: tool.description.unwrap_or_default(),
                        parameters: tool.parameters.unwrap_or_else(|| serde_json::json!({})),
                        strict: tool.strict,
                    },
                })
                .collect()
        });

        Self {
            model: req.model,
            messages,
            system: req.instructions,
            max_tokens: req.max_output_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop_sequences: None,
            stream: Some(true),
            tools,
            tool_choice: None,
            parallel_tool_calls: None,
            metadata: None,
        }
    }
}
