//! Approximate input-token counting, used for token-bucket rate limiting only.
//!
//! This is not meant to match a provider's billed token count exactly; it uses the
//! `cl100k_base` encoding as a stable, provider-agnostic estimate.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use crate::messages::unified::{UnifiedContentContainer, UnifiedMessage, UnifiedRequest};

fn encoder() -> &'static CoreBPE {
    static ENCODER: OnceLock<CoreBPE> = OnceLock::new();
    ENCODER.get_or_init(|| tiktoken_rs::cl100k_base().expect("cl100k_base encoding is always available"))
}

/// Count the approximate input tokens of a unified request (system + messages), not
/// including any completion that would be generated.
pub(crate) fn count_input_tokens(request: &UnifiedRequest) -> u64 {
    let mut text = request.system.clone().unwrap_or_default();

    for message in &request.messages {
        text.push('\n');
        text.push_str(&message_text(message));
    }

    count_text_tokens(&text)
}

/// Count the approximate tokens of an arbitrary piece of text, using the same
/// `cl100k_base` estimate as [`count_input_tokens`].
pub(crate) fn count_text_tokens(text: &str) -> u64 {
    encoder().encode_with_special_tokens(text).len() as u64
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::unified::UnifiedRole;

    fn request_with_text(text: &str) -> UnifiedRequest {
        UnifiedRequest {
            model: "gpt-4".to_string(),
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

    #[test]
    fn counts_nonzero_tokens_for_nonempty_messages() {
        assert!(count_input_tokens(&request_with_text("hello world")) > 0);
    }
}
