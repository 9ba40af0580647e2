//! In-process echo provider used for testing without network access.
//!
//! `loopback` deterministically echoes the concatenation of the request's user-role
//! text, prefixed with `"echo: "`. It never makes an outbound HTTP call, which makes
//! it useful for exercising routing, the scheduler, and the SSE orchestrator in tests.

use async_trait::async_trait;
use config::LoopbackProviderConfig;
use futures::stream;

use crate::{
    messages::{
        openai::Model,
        unified::{
            UnifiedChoice, UnifiedChoiceDelta, UnifiedChunk, UnifiedContentContainer, UnifiedFinishReason,
            UnifiedMessage, UnifiedMessageDelta, UnifiedRequest, UnifiedResponse, UnifiedRole, UnifiedUsage,
        },
    },
    provider::{ChatCompletionStream, ModelManager, Provider},
    request::RequestContext,
    token_counter,
};

pub(crate) struct LoopbackProvider {
    name: String,
    model_manager: ModelManager,
}

impl LoopbackProvider {
    pub fn new(name: String, config: LoopbackProviderConfig) -> crate::Result<Self> {
        let models = config.models.into_iter().map(|(k, v)| (k, config::ModelConfig(v))).collect();
        let model_manager = ModelManager::new(models, &name);

        Ok(Self { name, model_manager })
    }

    fn echo_text(request: &UnifiedRequest) -> String {
        let user_text = request
            .messages
            .iter()
            .filter(|message| message.role == UnifiedRole::User)
            .map(message_text)
            .collect::<Vec<_>>()
            .join("\n");

        format!("echo: {user_text}")
    }
}

fn message_text(message: &UnifiedMessage) -> String {
    match &message.content {
        UnifiedContentContainer::Text(text) => text.clone(),
        UnifiedContentContainer::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| block.as_text())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[async_trait]
impl Provider for LoopbackProvider {
    async fn chat_completion(&self, request: UnifiedRequest, _context: &RequestContext) -> crate::Result<UnifiedResponse> {
        let echoed = Self::echo_text(&request);

        let prompt_tokens = token_counter::count_input_tokens(&request);
        let completion_tokens = token_counter::count_text_tokens(&echoed);

        Ok(UnifiedResponse {
            id: format!("loopback-{}", uuid_like()),
            model: request.model,
            choices: vec![UnifiedChoice {
                index: 0,
                message: UnifiedMessage {
                    role: UnifiedRole::Assistant,
                    content: UnifiedContentContainer::Text(echoed),
                    tool_calls: None,
                    tool_call_id: None,
                },
                finish_reason: Some(UnifiedFinishReason::Stop),
            }],
            usage: UnifiedUsage {
                prompt_tokens: prompt_tokens as u32,
                completion_tokens: completion_tokens as u32,
                total_tokens: (prompt_tokens + completion_tokens) as u32,
            },
            created: 0,
            stop_reason: None,
            stop_sequence: None,
        })
    }

    async fn chat_completion_stream(
        &self,
        request: UnifiedRequest,
        _context: &RequestContext,
    ) -> crate::Result<ChatCompletionStream> {
        let echoed = Self::echo_text(&request);
        let id = format!("loopback-{}", uuid_like());
        let model = request.model;

        let mut chunks = Vec::new();

        chunks.push(UnifiedChunk {
            id: id.clone().into(),
            model: model.clone().into(),
            created: 0,
            choices: vec![UnifiedChoiceDelta {
                index: 0,
                delta: UnifiedMessageDelta {
                    role: Some(UnifiedRole::Assistant),
                    content: None,
                    tool_calls: None,
                },
                finish_reason: None,
            }],
            usage: None,
        });

        for word in echoed.split_inclusive(' ') {
            chunks.push(UnifiedChunk {
                id: id.clone().into(),
                model: model.clone().into(),
                created: 0,
                choices: vec![UnifiedChoiceDelta {
                    index: 0,
                    delta: UnifiedMessageDelta {
                        role: None,
                        content: Some(word.to_string()),
                        tool_calls: None,
                    },
                    finish_reason: None,
                }],
                usage: None,
            });
        }

        let prompt_tokens = token_counter::count_text_tokens(&echoed);
        chunks.push(UnifiedChunk {
            id: id.into(),
            model: model.into(),
            created: 0,
            choices: vec![UnifiedChoiceDelta {
                index: 0,
                delta: UnifiedMessageDelta {
                    role: None,
                    content: None,
                    tool_calls: None,
                },
                finish_reason: Some(UnifiedFinishReason::Stop),
            }],
            usage: Some(UnifiedUsage {
                prompt_tokens: prompt_tokens as u32,
                completion_tokens: prompt_tokens as u32,
                total_tokens: (prompt_tokens * 2) as u32,
            }),
        });

        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }

    async fn list_models(&self) -> anyhow::Result<Vec<Model>> {
        Ok(self.model_manager.get_configured_models())
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A short, non-cryptographic unique-enough id for echoed completions. Loopback never
/// talks to an upstream, so there's no provider-assigned id to preserve.
fn uuid_like() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);

    format!("{nanos:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> UnifiedRequest {
        UnifiedRequest {
            model: "echo".to_string(),
            messages: vec![UnifiedMessage {
                role: UnifiedRole::User,
                content: UnifiedContentContainer::Text(text.to_string()),
                tool_calls: None,
                tool_call_id: None,
            }],
            system: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            top_k: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop_sequences: None,
            stream: None,
            tools: None,
            tool_choice: None,
            parallel_tool_calls: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn echoes_user_text_with_prefix() {
        let provider = LoopbackProvider::new("loopback".to_string(), LoopbackProviderConfig::default()).unwrap();
        let context = RequestContext::default();

        let response = provider.chat_completion(request("hello there"), &context).await.unwrap();

        match &response.choices[0].message.content {
            UnifiedContentContainer::Text(text) => assert_eq!(text, "echo: hello there"),
            _ => panic!("expected text content"),
        }
        assert_eq!(response.choices[0].finish_reason, Some(UnifiedFinishReason::Stop));
    }

    #[tokio::test]
    async fn streaming_reassembles_to_the_same_text() {
        let provider = LoopbackProvider::new("loopback".to_string(), LoopbackProviderConfig::default()).unwrap();
        let context = RequestContext::default();

        let mut stream = provider.chat_completion_stream(request("a b c"), &context).await.unwrap();

        let mut text = String::new();
        while let Some(chunk) = futures::StreamExt::next(&mut stream).await {
            let chunk = chunk.unwrap();
            if let Some(content) = &chunk.choices[0].delta.content {
                text.push_str(content);
            }
        }

        assert_eq!(text, "echo: a b c");
    }
}
