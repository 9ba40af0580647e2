//! Request type accepted by the OpenAI provider.
//!
//! OpenAI is the gateway's native wire format, so this is a direct alias onto
//! [`crate::messages::openai::ChatCompletionRequest`] rather than a separate conversion.

pub(super) use crate::messages::openai::ChatCompletionRequest as OpenAIRequest;
