pub mod chat;

use thiserror::Error;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
}

/// Failures talking to the chat provider, before any classification.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("invalid provider configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("{message} (status {status})")]
    Api {
        status: u16,
        message: String,
    },

    /// The fragment stream broke after some text had already arrived.
    #[error("stream aborted: {message}")]
    StreamAborted {
        partial: String,
        message: String,
    },
}

impl LlmError {
    /// The provider's own wording, used to classify the failure.
    pub fn provider_message(&self) -> String {
        match self {
            LlmError::Api { message, .. } => message.clone(),
            LlmError::StreamAborted { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn partial(&self) -> Option<&str> {
        match self {
            LlmError::StreamAborted { partial, .. } => Some(partial.as_str()),
            _ => None,
        }
    }
}
