use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use axum::Json;
use thiserror::Error;

use crate::llm::LlmError;
use crate::models::api::ErrorResponse;

/// Substring Gemini puts in its error text for a rejected key.
const AUTH_ERROR_MARKER: &str = "API key not valid";
/// Matched case-insensitively.
const QUOTA_ERROR_MARKER: &str = "quota";

/// Outcome of a failed chat turn, as seen by the HTTP caller.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("This chat session has ended.")]
    SessionEnded,

    #[error("Gemini API key is not valid. Please check your configuration.")]
    Authentication,

    #[error("Gemini API quota exceeded. Please check your quota or billing.")]
    QuotaExceeded,

    #[error("Error with Gemini API: {message}")]
    Provider {
        message: String,
        partial: Option<String>,
    },

    #[error("Gemini API did not respond within {0} seconds.")]
    Timeout(u64),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl ChatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::SessionEnded => StatusCode::BAD_REQUEST,
            ChatError::Authentication => StatusCode::UNAUTHORIZED,
            ChatError::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            ChatError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ChatError::Provider { .. } | ChatError::Unexpected(_) =>
                StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classifies a provider failure by the wording of its message.
    pub fn from_provider(err: LlmError) -> Self {
        let message = err.provider_message();
        if message.contains(AUTH_ERROR_MARKER) {
            return ChatError::Authentication;
        }
        if message.to_lowercase().contains(QUOTA_ERROR_MARKER) {
            return ChatError::QuotaExceeded;
        }
        match err {
            LlmError::StreamAborted { partial, message } =>
                ChatError::Provider { message, partial: Some(partial) },
            LlmError::Config(msg) => ChatError::Unexpected(msg),
            other => ChatError::Provider { message: other.provider_message(), partial: None },
        }
    }
}

impl From<LlmError> for ChatError {
    fn from(err: LlmError) -> Self {
        ChatError::from_provider(err)
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let partial_response = match &self {
            ChatError::Provider { partial, .. } => partial.clone(),
            _ => None,
        };
        let body = ErrorResponse {
            detail: self.to_string(),
            partial_response,
        };
        (status, Json(body)).into_response()
    }
}
