use clap::{ Parser, ValueEnum };
use std::fmt;

use crate::llm::{ DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL };
use crate::models::chat::DEFAULT_SEED_PROMPT;

/// What happens to the user's message when the provider call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FailedTurnPolicy {
    /// The user message stays in the transcript.
    Keep,
    /// The user message is removed again.
    Rollback,
}

impl fmt::Display for FailedTurnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailedTurnPolicy::Keep => write!(f, "keep"),
            FailedTurnPolicy::Rollback => write!(f, "rollback"),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// API key for Google Gemini. Required.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: String,

    /// Gemini model used for replies
    #[arg(long, env = "CHAT_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    pub chat_model: String,

    /// Base URL of the Gemini REST API
    #[arg(long, env = "CHAT_BASE_URL", default_value = DEFAULT_GEMINI_BASE_URL)]
    pub chat_base_url: String,

    /// Seconds to wait for a complete reply before giving up. 0 disables the limit.
    #[arg(long, env = "PROVIDER_TIMEOUT_SECS", default_value = "60")]
    pub provider_timeout_secs: u64,

    // --- Conversation Args ---
    /// System message every new conversation starts with
    #[arg(long, env = "SYSTEM_PROMPT", default_value = DEFAULT_SEED_PROMPT)]
    pub system_prompt: String,

    /// Whether a failed turn keeps or rolls back the user's message
    #[arg(long, env = "FAILED_TURN_POLICY", value_enum, default_value_t = FailedTurnPolicy::Keep)]
    pub failed_turn_policy: FailedTurnPolicy,

    // --- General App Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:8000")]
    pub server_addr: String,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_only_key_given() {
        let args = Args::try_parse_from(["gemini-relay", "--gemini-api-key", "k"]).unwrap();
        assert_eq!(args.gemini_api_key, "k");
        assert_eq!(args.chat_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(args.server_addr, "0.0.0.0:8000");
        assert_eq!(args.provider_timeout_secs, 60);
        assert_eq!(args.failed_turn_policy, FailedTurnPolicy::Keep);
        assert!(!args.enable_tls);
    }

    #[test]
    fn parses_rollback_policy() {
        let args = Args::try_parse_from([
            "gemini-relay",
            "--gemini-api-key",
            "k",
            "--failed-turn-policy",
            "rollback",
        ]).unwrap();
        assert_eq!(args.failed_turn_policy, FailedTurnPolicy::Rollback);
    }
}
