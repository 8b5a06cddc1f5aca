pub mod shaping;

use log::{ debug, info };
use std::collections::HashMap;
use std::sync::{ Arc, Mutex };
use tokio::sync::Mutex as AsyncMutex;

use crate::models::chat::{ Conversation, DEFAULT_SEED_PROMPT };

/// A conversation handle shared between the store and whichever turn is
/// running on it. The lock is held for an entire turn.
pub type SharedConversation = Arc<AsyncMutex<Conversation>>;

/// In-memory registry of conversations keyed by caller-supplied id.
///
/// The map lock is only taken for lookup and insert; the per-conversation lock
/// serializes turns on the same id while distinct ids proceed concurrently.
pub struct ConversationStore {
    conversations: Mutex<HashMap<String, SharedConversation>>,
    seed_prompt: String,
}

impl ConversationStore {
    pub fn new(seed_prompt: impl Into<String>) -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            seed_prompt: seed_prompt.into(),
        }
    }

    pub fn get_or_create(&self, conversation_id: &str) -> SharedConversation {
        let mut map = self.lock_map();
        if let Some(existing) = map.get(conversation_id) {
            debug!("Reusing conversation '{}'", conversation_id);
            return Arc::clone(existing);
        }

        info!("Creating conversation '{}'", conversation_id);
        let conversation = Arc::new(
            AsyncMutex::new(Conversation::seeded(conversation_id, &self.seed_prompt))
        );
        map.insert(conversation_id.to_string(), Arc::clone(&conversation));
        conversation
    }

    pub fn get(&self, conversation_id: &str) -> Option<SharedConversation> {
        self.lock_map().get(conversation_id).cloned()
    }

    /// Marks a conversation as ended. Later turns on it are rejected.
    /// Returns false when no such conversation exists.
    pub async fn end(&self, conversation_id: &str) -> bool {
        let Some(conversation) = self.get(conversation_id) else {
            return false;
        };
        conversation.lock().await.active = false;
        info!("Conversation '{}' ended", conversation_id);
        true
    }

    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, SharedConversation>> {
        // Only single inserts happen under this lock; a poisoned map is still consistent.
        self.conversations.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_SEED_PROMPT)
    }
}
