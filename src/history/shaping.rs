//! Turns a stored transcript into the shape the chat provider accepts.
//!
//! The leading system message is lifted out as a separate instruction. The
//! remaining messages keep their order; only dialogue roles survive. `user`
//! stays `user`, `assistant` becomes `model`, and every other role (including
//! a second `system` message) is dropped with a warning.

use log::warn;

use crate::llm::chat::{ ProviderRole, ProviderTurn };
use crate::models::chat::{ ChatMessage, Role };

/// Used when a transcript does not start with a system message.
pub const FALLBACK_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

#[derive(Debug, Clone, PartialEq)]
pub struct ShapedHistory {
    pub system_prompt: String,
    pub turns: Vec<ProviderTurn>,
}

impl ShapedHistory {
    pub fn ends_with_user(&self) -> bool {
        matches!(self.turns.last(), Some(turn) if turn.role == ProviderRole::User)
    }
}

/// Dialogue-roles-only policy. `None` means the message is not sent.
pub fn translate_role(role: &Role) -> Option<ProviderRole> {
    match role {
        Role::User => Some(ProviderRole::User),
        Role::Assistant => Some(ProviderRole::Model),
        Role::System | Role::Other(_) => None,
    }
}

pub fn shape_history(messages: &[ChatMessage]) -> ShapedHistory {
    let (system_prompt, rest) = match messages.split_first() {
        Some((first, rest)) if first.role == Role::System => (first.content.clone(), rest),
        _ => (FALLBACK_SYSTEM_PROMPT.to_string(), messages),
    };

    let turns = rest
        .iter()
        .filter_map(|msg| match translate_role(&msg.role) {
            Some(role) => Some(ProviderTurn::text(role, msg.content.clone())),
            None => {
                warn!("Skipping message with unsupported role: {}", msg.role);
                None
            }
        })
        .collect();

    let shaped = ShapedHistory { system_prompt, turns };
    if !shaped.ends_with_user() {
        warn!("Last message in provider history is not from 'user'");
    }
    shaped
}
