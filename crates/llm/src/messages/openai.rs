use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON Schema describing a tool's parameters.
///
/// OpenAI accepts arbitrary JSON Schema here, so this is kept as an untyped
/// value rather than a structured schema type.
pub type JsonSchema = Value;

/// Request body for the OpenAI Chat Completions API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    /// The model to use for the completion.
    pub model: String,

    /// The conversation so far, oldest message first.
    pub messages: Vec<ChatMessage>,

    /// Controls randomness. Range 0.0 to 2.0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Nucleus sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Penalizes tokens based on their frequency so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    /// Penalizes tokens that have already appeared at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    /// Up to 4 sequences where the API will stop generating tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    /// Whether to stream the response as Server-Sent Events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Tools the model may call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,

    /// Controls whether/which tool the model must call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Whether to allow the model to call multiple tools in one turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

/// Role of a message sender in the OpenAI chat format.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatRole {
    /// System instructions.
    System,
    /// End-user message.
    User,
    /// Model-generated message.
    Assistant,
    /// Result of a tool call, addressed by `tool_call_id`.
    Tool,
    /// Forward-compatibility catch-all for roles this gateway doesn't recognize yet.
    Other(String),
}

impl Serialize for ChatRole {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
            ChatRole::Other(s) => s,
        })
    }
}

impl<'de> Deserialize<'de> for ChatRole {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match String::deserialize(deserializer)?.as_str() {
            "system" => ChatRole::System,
            "user" => ChatRole::User,
            "assistant" => ChatRole::Assistant,
            "tool" => ChatRole::Tool,
            other => ChatRole::Other(other.to_string()),
        })
    }
}

/// A single message in a chat completion request or response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    /// Who sent the message.
    pub role: ChatRole,

    /// Text content. Absent on assistant messages that only carry tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tool calls requested by the assistant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// The tool call this message answers, when `role` is `tool`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolCall {
    /// Unique identifier for this call, echoed back in the tool result message.
    pub id: String,

    /// Always `function` today; kept as an enum for forward compatibility.
    #[serde(rename = "type")]
    pub tool_type: ToolCallType,

    /// The function to call and its arguments.
    pub function: FunctionCall,
}

/// Discriminant for `ToolCall`/`Tool`. OpenAI only defines `function`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallType {
    /// Function-style tool call.
    Function,
}

/// Name and arguments of a requested function call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionCall {
    /// The function's name as declared in the request's `tools`.
    pub name: String,

    /// Arguments as a JSON-encoded string, not a parsed value.
    pub arguments: String,
}

/// A tool definition offered to the model.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tool {
    /// Always `function`.
    #[serde(rename = "type")]
    pub tool_type: ToolCallType,

    /// The function signature.
    pub function: FunctionDefinition,
}

/// Declares a callable function's name, description, and parameter schema.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionDefinition {
    /// Function name, referenced by tool calls.
    pub name: String,

    /// Description shown to the model to help it decide when to call this.
    pub description: String,

    /// JSON Schema for the function's arguments object.
    pub parameters: JsonSchema,
}

/// Controls how, or whether, the model calls tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// One of the named modes (`none`, `auto`, `required`).
    Mode(ToolChoiceMode),

    /// Force a specific named function.
    Specific {
        /// Always `function`.
        #[serde(rename = "type")]
        tool_type: ToolCallType,
        /// The function that must be called.
        function: ToolChoiceFunction,
    },
}

/// Named tool-choice modes.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolChoiceMode {
    /// The model must not call any tool.
    None,
    /// The model decides whether to call a tool.
    Auto,
    /// The model must call at least one tool.
    Required,
    /// Synonym for `Required` accepted by some providers.
    Any,
    /// Forward-compatibility catch-all.
    Other(String),
}

impl Serialize for ToolChoiceMode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            ToolChoiceMode::None => "none",
            ToolChoiceMode::Auto => "auto",
            ToolChoiceMode::Required => "required",
            ToolChoiceMode::Any => "any",
            ToolChoiceMode::Other(s) => s,
        })
    }
}

impl<'de> Deserialize<'de> for ToolChoiceMode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match String::deserialize(deserializer)?.as_str() {
            "none" => ToolChoiceMode::None,
            "auto" => ToolChoiceMode::Auto,
            "required" => ToolChoiceMode::Required,
            "any" => ToolChoiceMode::Any,
            other => ToolChoiceMode::Other(other.to_string()),
        })
    }
}

/// Names the function a `ToolChoice::Specific` forces the model to call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolChoiceFunction {
    /// The function's name.
    pub name: String,
}

/// Response body for a (non-streaming) chat completion.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionResponse {
    /// Unique identifier for this completion.
    pub id: String,

    /// Always `chat.completion`.
    pub object: ObjectType,

    /// Unix timestamp of completion creation.
    pub created: u64,

    /// The model that generated the response.
    pub model: String,

    /// Completion choices. Usually has exactly one entry.
    pub choices: Vec<ChatChoice>,

    /// Token usage for the request/response pair.
    pub usage: Usage,
}

/// One completion choice in a non-streaming response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatChoice {
    /// Index of this choice among the response's choices.
    pub index: u32,

    /// The generated message.
    pub message: ChatMessage,

    /// Why generation stopped for this choice.
    pub finish_reason: FinishReason,
}

/// Why the model stopped generating tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishReason {
    /// Natural stop, or a stop sequence was hit.
    Stop,
    /// Hit `max_tokens` before finishing.
    Length,
    /// Omitted by the safety filter.
    ContentFilter,
    /// The model produced tool calls instead of (or alongside) text.
    ToolCalls,
    /// Forward-compatibility catch-all.
    Other(String),
}

impl Serialize for FinishReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::Other(s) => s,
        })
    }
}

impl<'de> Deserialize<'de> for FinishReason {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match String::deserialize(deserializer)?.as_str() {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            "tool_calls" => FinishReason::ToolCalls,
            other => FinishReason::Other(other.to_string()),
        })
    }
}

/// Token usage for a request/response pair.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens consumed by the completion.
    pub completion_tokens: u32,
    /// Sum of prompt and completion tokens.
    pub total_tokens: u32,
}

/// Incremental tool call update in a streaming response.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StreamingToolCall {
    /// First chunk for a new tool call: carries its id and function name.
    Start {
        /// Index of this tool call among the choice's tool calls.
        index: u32,
        /// Unique identifier for this call.
        id: String,
        /// Always `function`.
        #[serde(rename = "type")]
        r#type: ToolCallType,
        /// Name and initial argument fragment.
        function: FunctionStart,
    },
    /// Subsequent chunk: an additional fragment of the arguments string.
    Delta {
        /// Index of the tool call this delta continues.
        index: u32,
        /// Argument fragment to append.
        function: FunctionDelta,
    },
}

/// Function name and first argument fragment for a new streaming tool call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionStart {
    /// The function's name.
    pub name: String,
    /// Initial fragment of the JSON-encoded arguments string.
    pub arguments: String,
}

/// An additional fragment of a streaming tool call's arguments string.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionDelta {
    /// Fragment to append to the arguments string accumulated so far.
    pub arguments: String,
}

/// A single chunk of a streamed chat completion.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionChunk {
    /// Identifier shared by every chunk in this stream.
    pub id: String,

    /// Always `chat.completion.chunk`.
    pub object: ObjectType,

    /// Unix timestamp, constant across the stream.
    pub created: u64,

    /// The model generating the stream.
    pub model: String,

    /// Backend fingerprint, when the provider sends one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,

    /// Incremental choice updates.
    pub choices: Vec<ChatChoiceDelta>,

    /// Present only on the final chunk, when `stream_options.include_usage` was set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Incremental update for one choice in a streamed response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatChoiceDelta {
    /// Index of the choice being updated.
    pub index: u32,

    /// Token log-probabilities, when requested. Passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Value>,

    /// The incremental content to append.
    pub delta: ChatMessageDelta,

    /// Present only on the chunk that ends this choice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Incremental message fragment carried by a streaming chunk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessageDelta {
    /// Sent once, on the first chunk of a choice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<ChatRole>,

    /// Text fragment to append.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Deprecated single-function-call delta, passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<Value>,

    /// Tool call fragments to append.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<StreamingToolCall>>,
}

/// Discriminates the `object` field across OpenAI response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectType {
    /// A non-streaming chat completion.
    #[serde(rename = "chat.completion")]
    ChatCompletion,
    /// One chunk of a streaming chat completion.
    #[serde(rename = "chat.completion.chunk")]
    ChatCompletionChunk,
    /// A single model entry.
    Model,
    /// A paginated list of some other object type.
    List,
}

/// A single model entry as returned by `GET /v1/models`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Model {
    /// Model identifier, used as the `model` field in requests.
    pub id: String,
    /// Always `model`.
    pub object: ObjectType,
    /// Unix timestamp. `0` for providers that don't track this.
    pub created: u64,
    /// Organization that owns the model.
    pub owned_by: String,
}

/// Response body for `GET /v1/models`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsResponse {
    /// Always `list`.
    pub object: ObjectType,
    /// The available models.
    pub data: Vec<Model>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_basic_request() {
        let request = ChatCompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage {
                role: ChatRole::User,
                content: Some("hello".to_string()),
                tool_calls: None,
                tool_call_id: None,
            }],
            temperature: Some(0.7),
            max_tokens: Some(256),
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop: None,
            stream: Some(false),
            tools: None,
            tool_choice: None,
            parallel_tool_calls: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("top_p").is_none());
    }

    #[test]
    fn deserializes_tool_call_response() {
        let json = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "get_weather", "arguments": "{\"city\":\"nyc\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        });

        let response: ChatCompletionResponse = serde_json::from_value(json).unwrap();
        assert_eq!(response.choices[0].finish_reason, FinishReason::ToolCalls);

        let tool_calls = response.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(tool_calls[0].function.name, "get_weather");
    }

    #[test]
    fn unrecognized_role_falls_back_to_other() {
        let message: ChatMessage = serde_json::from_value(json!({ "role": "developer", "content": "x" })).unwrap();
        assert_eq!(message.role, ChatRole::Other("developer".to_string()));
    }

    #[test]
    fn streaming_tool_call_delta_round_trips() {
        let delta = StreamingToolCall::Delta {
            index: 0,
            function: FunctionDelta {
                arguments: "\"nyc\"}".to_string(),
            },
        };

        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(json["index"], 0);
        assert_eq!(json["function"]["arguments"], "\"nyc\"}");
    }
}
