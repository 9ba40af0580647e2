//! Response types returned by the OpenAI provider.

use serde::Deserialize;

use crate::messages::{openai, unified};

/// Non-streaming chat completion response. OpenAI is the gateway's native wire
/// format, so this is a direct alias rather than a separate type.
pub(super) type OpenAIResponse = openai::ChatCompletionResponse;

/// One chunk of a streamed OpenAI chat completion.
///
/// Owned rather than borrowed: unlike Anthropic's stream events, nothing here
/// benefits from zero-copy parsing, since every field ends up owned in the
/// `UnifiedChunk` anyway.
#[derive(Debug, Deserialize)]
pub(super) struct OpenAIStreamChunk {
    id: String,
    created: u64,
    model: String,
    #[serde(default)]
    choices: Vec<openai::ChatChoiceDelta>,
    #[serde(default)]
    usage: Option<openai::Usage>,
}

impl OpenAIStreamChunk {
    /// Converts this chunk into the unified representation, tagging its model
    /// with the provider it came from the same way the non-streaming path does.
    pub(super) fn into_chunk(self, provider: &str) -> unified::UnifiedChunk {
        unified::UnifiedChunk::from(openai::ChatCompletionChunk {
            id: self.id,
            object: openai::ObjectType::ChatCompletionChunk,
            created: self.created,
            model: format!("{provider}/{}", self.model),
            system_fingerprint: None,
            choices: self.choices,
            usage: self.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_content_delta_chunk() {
        let json = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "delta": { "role": "assistant", "content": "hi" },
                "finish_reason": null
            }]
        });

        let chunk: OpenAIStreamChunk = serde_json::from_value(json).unwrap();
        let unified = chunk.into_chunk("openai");

        assert_eq!(unified.model, "openai/gpt-4o");
        assert_eq!(unified.choices[0].delta.content.as_deref(), Some("hi"));
    }

    #[test]
    fn parses_a_chunk_with_no_choices() {
        let json = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": "gpt-4o",
            "choices": [],
            "usage": { "prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13 }
        });

        let chunk: OpenAIStreamChunk = serde_json::from_value(json).unwrap();
        let unified = chunk.into_chunk("openai");

        assert!(unified.choices.is_empty());
        assert_eq!(unified.usage.unwrap().total_tokens, 13);
    }
}
