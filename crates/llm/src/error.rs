use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::messages::anthropic;

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// LLM service errors with appropriate HTTP status codes.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Invalid model format or missing provider/model in request.
    #[error("Invalid model format: expected 'provider/model', got '{0}'")]
    InvalidModelFormat(String),

    /// Provider not found in configuration.
    #[error("Provider '{0}' not found")]
    ProviderNotFound(String),

    /// Model not found at the provider.
    #[error("{0}")]
    ModelNotFound(String),

    /// Authentication failed (missing or invalid API key).
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded { message: String },

    /// Insufficient quota or credits.
    #[error("Insufficient quota: {0}")]
    InsufficientQuota(String),

    /// Streaming not supported.
    #[error("Streaming is not yet supported. Please set stream=false or omit the parameter.")]
    StreamingNotSupported,

    /// Provider API returned an error.
    #[error("Provider API error ({status}): {message}")]
    ProviderApiError { status: u16, message: String },

    /// Network or connection error.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Internal server error.
    /// If Some(message), it came from a provider and can be shown.
    /// If None, it's an internal Nexus error and should not leak details.
    #[error("Internal server error")]
    InternalError(Option<String>),

    /// No route table entry or provider model_filter matched the requested model.
    #[error("{0}")]
    RouteNotFound(String),

    /// The resolved work mode does not support the requested operation.
    #[error("{0}")]
    UnsupportedInWorkMode(String),

    /// The scheduler's queue for this priority tier was already full.
    #[error("Scheduler queue is full, retry after {retry_after_secs}s")]
    SchedulerQueueFull {
        /// Suggested wait before retrying, surfaced as a `Retry-After` header.
        retry_after_secs: u64,
    },

    /// The request was admitted into the scheduler's queue but expired before being
    /// dispatched.
    #[error("Request expired in the scheduler queue before it could be dispatched")]
    SchedulerExpired,

    /// `submit_tool_outputs` referenced a session id that doesn't exist (never created,
    /// already terminal, or lost on restart).
    #[error("No active response session '{0}'")]
    SessionNotFound(String),

    /// A non-admin principal called an `/admin/*` endpoint.
    #[error("This endpoint requires an admin principal")]
    AdminRequired,
}

impl LlmError {
    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidModelFormat(_) | Self::InvalidRequest(_) | Self::StreamingNotSupported => {
                StatusCode::BAD_REQUEST
            }
            Self::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientQuota(_) => StatusCode::FORBIDDEN,
            Self::ProviderNotFound(_) | Self::ModelNotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ConnectionError(_) => StatusCode::BAD_GATEWAY,
            Self::ProviderApiError { status, .. } => {
                // Map provider status codes to our status codes
                match *status {
                    400 => StatusCode::BAD_REQUEST,
                    401 => StatusCode::UNAUTHORIZED,
                    403 => StatusCode::FORBIDDEN,
                    404 => StatusCode::NOT_FOUND,
                    429 => StatusCode::TOO_MANY_REQUESTS,
                    500..=599 => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::BAD_GATEWAY,
                }
            }
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Self::UnsupportedInWorkMode(_) => StatusCode::BAD_REQUEST,
            Self::SchedulerQueueFull { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::SchedulerExpired => StatusCode::GATEWAY_TIMEOUT,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::AdminRequired => StatusCode::FORBIDDEN,
        }
    }

    /// Get the error type string for the response.
    pub fn error_type(&self) -> &str {
        match self {
            Self::InvalidModelFormat(_) | Self::InvalidRequest(_) | Self::StreamingNotSupported => {
                "invalid_request_error"
            }
            Self::AuthenticationFailed(_) => "authentication_error",
            Self::InsufficientQuota(_) => "insufficient_quota",
            Self::ProviderNotFound(_) | Self::ModelNotFound(_) => "not_found_error",
            Self::RateLimitExceeded { .. } => "rate_limit_error",
            Self::ConnectionError(_) | Self::ProviderApiError { .. } => "api_error",
            Self::InternalError(_) => "internal_error",
            Self::RouteNotFound(_) => "not_found_error",
            Self::UnsupportedInWorkMode(_) => "invalid_request_error",
            Self::SchedulerQueueFull { .. } => "rate_limit_error",
            Self::SchedulerExpired => "timeout_error",
            Self::SessionNotFound(_) => "not_found_error",
            Self::AdminRequired => "permission_error",
        }
    }

    /// Message that is safe to expose to API consumers.
    pub fn client_message(&self) -> String {
        match self {
            Self::InternalError(Some(provider_msg)) => provider_msg.clone(),
            Self::InternalError(None) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Error response format compatible with OpenAI API.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    message: String,
    r#type: String,
    code: u16,
}

impl IntoResponse for LlmError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Scheduler backpressure is the one case with a retry-after we control ourselves
        // (everything else comes from a downstream provider and we don't forward theirs).
        let retry_after_secs = match &self {
            Self::SchedulerQueueFull { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        // For internal errors, only show provider messages, not Nexus internals
        let message = self.client_message();

        let error_response = ErrorResponse {
            error: ErrorDetails {
                message,
                r#type: self.error_type().to_string(),
                code: status.as_u16(),
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if let Some(secs) = retry_after_secs
            && let Ok(value) = http::HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert(http::header::RETRY_AFTER, value);
        }

        response
    }
}

pub struct AnthropicErrorResponse {
    status: StatusCode,
    body: anthropic::AnthropicError,
}

impl From<LlmError> for AnthropicErrorResponse {
    fn from(error: LlmError) -> Self {
        let status = error.status_code();
        let body = anthropic::AnthropicError::from(error);

        Self { status, body }
    }
}

impl IntoResponse for AnthropicErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type AnthropicResult<T> = std::result::Result<T, AnthropicErrorResponse>;
