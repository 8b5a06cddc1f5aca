use log::{ debug, error, info, warn };
use std::sync::Arc;
use std::time::Duration;

use crate::cli::{ Args, FailedTurnPolicy };
use crate::error::ChatError;
use crate::history::shaping::shape_history;
use crate::history::ConversationStore;
use crate::llm::chat::{ new_client as new_chat_client, ChatClient };
use crate::llm::{ LlmConfig, LlmError };
use crate::models::chat::{ Conversation, Role };

/// Runs chat turns: keeps the transcripts and asks the provider for replies.
#[derive(Clone)]
pub struct ChatAgent {
    chat_client: Arc<dyn ChatClient>,
    store: Arc<ConversationStore>,
    provider_timeout: Option<Duration>,
    failed_turn_policy: FailedTurnPolicy,
}

impl ChatAgent {
    pub fn new(args: &Args) -> Result<Self, LlmError> {
        let chat_config = LlmConfig {
            api_key: args.gemini_api_key.clone(),
            completion_model: Some(args.chat_model.clone()),
            base_url: Some(args.chat_base_url.clone()),
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Model={}, BaseURL={}",
            chat_client.get_model(),
            args.chat_base_url
        );

        let timeout = match args.provider_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(
            Self::with_client(
                chat_client,
                Arc::new(ConversationStore::new(args.system_prompt.clone())),
                timeout,
                args.failed_turn_policy
            )
        )
    }

    pub fn with_client(
        chat_client: Arc<dyn ChatClient>,
        store: Arc<ConversationStore>,
        provider_timeout: Option<Duration>,
        failed_turn_policy: FailedTurnPolicy
    ) -> Self {
        Self {
            chat_client,
            store,
            provider_timeout,
            failed_turn_policy,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Appends `message` to the conversation, asks the provider for the next
    /// reply, appends that too and returns it.
    ///
    /// The conversation stays locked for the whole turn, so turns on one id
    /// never interleave.
    pub async fn process_message(
        &self,
        conversation_id: &str,
        role: &str,
        message: &str
    ) -> Result<String, ChatError> {
        let shared = self.store.get_or_create(conversation_id);
        let mut conversation = shared.lock().await;

        if !conversation.active {
            warn!("Rejected turn on ended conversation '{}'", conversation_id);
            return Err(ChatError::SessionEnded);
        }

        let turn = PendingTurn::begin(&mut conversation, role, message, self.failed_turn_policy);
        let shaped = shape_history(&turn.conversation.messages);

        let generation = self.chat_client.generate(&shaped.turns, &shaped.system_prompt);
        let result = match self.provider_timeout {
            Some(limit) =>
                match tokio::time::timeout(limit, generation).await {
                    Ok(res) => res.map_err(ChatError::from),
                    Err(_) => Err(ChatError::Timeout(limit.as_secs())),
                }
            None => generation.await.map_err(ChatError::from),
        };

        match result {
            Ok(reply) => {
                let len = turn.commit(reply.clone());
                info!("Conversation '{}' now has {} messages", conversation_id, len);
                Ok(reply)
            }
            Err(e) => {
                error!("Error with Gemini API for conversation '{}': {}", conversation_id, e);
                Err(e)
            }
        }
    }
}

/// A turn whose user message is already in the transcript but whose reply is
/// not. Under [`FailedTurnPolicy::Rollback`] the user message is removed when
/// the turn is dropped uncommitted, whether it failed or was cancelled.
struct PendingTurn<'a> {
    conversation: &'a mut Conversation,
    rollback: bool,
    committed: bool,
}

impl<'a> PendingTurn<'a> {
    fn begin(
        conversation: &'a mut Conversation,
        role: &str,
        message: &str,
        policy: FailedTurnPolicy
    ) -> Self {
        conversation.push(Role::from(role), message);
        Self {
            conversation,
            rollback: policy == FailedTurnPolicy::Rollback,
            committed: false,
        }
    }

    /// Appends the reply and returns the new transcript length.
    fn commit(mut self, reply: String) -> usize {
        self.conversation.push(Role::Assistant, reply);
        self.committed = true;
        self.conversation.messages.len()
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if !self.committed && self.rollback {
            self.conversation.messages.pop();
            debug!("Rolled back unanswered user message in '{}'", self.conversation.id);
        }
    }
}
