//! Request type accepted by the Anthropic provider.
//!
//! The unified-to-Anthropic conversion already lives on
//! [`crate::messages::anthropic::AnthropicChatRequest`]; this module just names it the
//! way the provider expects.

pub(super) use crate::messages::anthropic::AnthropicChatRequest as AnthropicRequest;
