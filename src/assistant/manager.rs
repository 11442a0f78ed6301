//! Conversations keyed by `(channel, user)`.
//!
//! Turns for one key are serialised with [`KeyedLocks`]; different keys
//! run concurrently. A state is replaced only after a turn succeeds, so a
//! failed turn leaves the previous state committed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::engine::Engine;
use super::state::{Attachment, ConversationState, Message};
use crate::locks::KeyedLocks;

/// Sent back when a turn fails for any reason.
pub const APOLOGY: &str =
    "Sorry, I ran into a problem while answering. Please try again in a moment.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel_id: String,
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub state: ConversationState,
    /// True when the turn failed and `response` is the apology.
    pub failed: bool,
}

#[derive(Clone)]
pub struct ConversationManager {
    engine: Engine,
    conversations: Arc<RwLock<HashMap<String, ConversationState>>>,
    locks: KeyedLocks,
}

fn conversation_key(channel_id: &str, user_id: &str) -> String {
    format!("{}/{}", channel_id, user_id)
}

impl ConversationManager {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            conversations: Arc::new(RwLock::new(HashMap::new())),
            locks: KeyedLocks::new(),
        }
    }

    /// Run one turn for the sender of `inbound`.
    ///
    /// A missing or terminal conversation is replaced by a fresh one first.
    /// Failures are logged and answered with [`APOLOGY`].
    pub async fn handle_message(&self, inbound: InboundMessage) -> ChatReply {
        let key = conversation_key(&inbound.channel_id, &inbound.user_id);
        let guard = self.locks.acquire(&key).await;
        let reply = self.run_locked(&key, inbound).await;
        drop(guard);
        self.locks.cleanup_unused().await;
        reply
    }

    async fn run_locked(&self, key: &str, inbound: InboundMessage) -> ChatReply {
        let current = self.conversations.read().await.get(key).cloned();
        let state = match current {
            Some(s) if !s.status.is_terminal() => s,
            Some(s) => {
                tracing::info!(key = %key, status = %s.status, "starting a new conversation");
                ConversationState::new()
            }
            None => ConversationState::new(),
        };

        let message = Message::user(inbound.message).with_attachments(inbound.attachments);
        match self.engine.run_turn(&state, message).await {
            Ok(outcome) => {
                self.conversations
                    .write()
                    .await
                    .insert(key.to_string(), outcome.state.clone());
                ChatReply {
                    response: outcome.response,
                    state: outcome.state,
                    failed: false,
                }
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "turn failed; keeping previous state");
                ChatReply {
                    response: APOLOGY.to_string(),
                    state,
                    failed: true,
                }
            }
        }
    }

    pub async fn get(&self, channel_id: &str, user_id: &str) -> Option<ConversationState> {
        self.conversations
            .read()
            .await
            .get(&conversation_key(channel_id, user_id))
            .cloned()
    }

    /// Forget a conversation. Returns whether one existed.
    pub async fn reset(&self, channel_id: &str, user_id: &str) -> bool {
        let key = conversation_key(channel_id, user_id);
        let guard = self.locks.acquire(&key).await;
        let removed = self.conversations.write().await.remove(&key).is_some();
        drop(guard);
        self.locks.cleanup_unused().await;
        removed
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::state::Status;
    use crate::assistant::AssistantSettings;
    use crate::embedding::EmbedderAdapter;
    use crate::retrieve::Retriever;
    use crate::store::memory::InMemoryStore;
    use crate::testing::{HashEmbedder, ScriptedLlm};
    use serde_json::json;

    fn manager(llm: ScriptedLlm) -> ConversationManager {
        let embedder = EmbedderAdapter::new(Arc::new(HashEmbedder::new(32)), 256, 8);
        let retriever = Retriever::new(Arc::new(InMemoryStore::new()), embedder, 3);
        ConversationManager::new(Engine::new(
            retriever,
            Arc::new(llm),
            AssistantSettings::default(),
        ))
    }

    fn inbound(channel: &str, user: &str, text: &str) -> InboundMessage {
        InboundMessage {
            channel_id: channel.into(),
            user_id: user.into(),
            message: text.into(),
            attachments: Vec::new(),
        }
    }

    fn analysis(solved: bool) -> serde_json::Value {
        json!({
            "updated_summary": "s",
            "is_solved": solved,
            "detected_installation_method": "source",
            "detected_os": "windows",
            "needs_support_escalation": false,
        })
    }

    #[tokio::test]
    async fn test_conversations_are_keyed_per_user() {
        let m = manager(ScriptedLlm::assistant(analysis(false), "ok"));
        m.handle_message(inbound("c1", "u1", "hello")).await;
        m.handle_message(inbound("c1", "u1", "still there?")).await;
        m.handle_message(inbound("c1", "u2", "hi")).await;

        assert_eq!(m.get("c1", "u1").await.unwrap().iteration_count, 2);
        assert_eq!(m.get("c1", "u2").await.unwrap().iteration_count, 1);
        assert!(m.get("c2", "u1").await.is_none());
        assert_eq!(m.len().await, 2);
        // per-key locks do not outlive their turns
        assert_eq!(m.locks.len().await, 0);
    }

    #[tokio::test]
    async fn test_failure_returns_apology_and_keeps_state() {
        let m = manager(ScriptedLlm::from_fn(|_| Err(anyhow::anyhow!("model offline"))));
        let reply = m.handle_message(inbound("c", "u", "help")).await;
        assert!(reply.failed);
        assert_eq!(reply.response, APOLOGY);
        assert!(m.get("c", "u").await.is_none());
    }

    #[tokio::test]
    async fn test_terminal_conversation_restarts_fresh() {
        let m = manager(ScriptedLlm::assistant(analysis(true), "great"));
        let first = m.handle_message(inbound("c", "u", "fixed it")).await;
        assert_eq!(first.state.status, Status::Solved);

        let second = m.handle_message(inbound("c", "u", "new problem")).await;
        assert!(!second.failed);
        assert_eq!(second.state.iteration_count, 1);
        assert_eq!(second.state.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_reset_forgets_conversation() {
        let m = manager(ScriptedLlm::assistant(analysis(false), "ok"));
        m.handle_message(inbound("c", "u", "hello")).await;
        assert!(m.reset("c", "u").await);
        assert!(!m.reset("c", "u").await);
        assert!(m.get("c", "u").await.is_none());
    }
}
