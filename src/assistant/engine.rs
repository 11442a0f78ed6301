//! One conversation turn.
//!
//! [`Engine::run_turn`] takes the committed state and a user message and
//! returns the next state. Every step works on a scratch copy; the input
//! is never touched, so a failure at any step leaves the caller's state
//! exactly as it was.

use anyhow::Result;
use std::sync::Arc;

use super::analyzer;
use super::generator;
use super::state::{ConversationState, Message, RetrievedChunk, StateDelta};
use super::AssistantSettings;
use crate::error::HarnessError;
use crate::llm::{BudgetedLlm, LlmProvider, TurnBudget};
use crate::models::SearchHit;
use crate::retrieve::Retriever;

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    pub state: ConversationState,
    /// Chunks surfaced for the first time on this turn.
    pub retrieved: Vec<SearchHit>,
}

#[derive(Clone)]
pub struct Engine {
    retriever: Retriever,
    llm: Arc<dyn LlmProvider>,
    settings: AssistantSettings,
}

impl Engine {
    pub fn new(retriever: Retriever, llm: Arc<dyn LlmProvider>, settings: AssistantSettings) -> Self {
        Self {
            retriever,
            llm,
            settings,
        }
    }

    pub fn settings(&self) -> &AssistantSettings {
        &self.settings
    }

    /// Run retrieve, analyze and generate for `message` on top of `state`.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::ConversationClosed`] if `state` is terminal.
    /// - Model failures, including [`HarnessError::BudgetExceeded`].
    ///
    /// Retrieval failures are not errors; the turn continues with no new
    /// documents.
    pub async fn run_turn(
        &self,
        state: &ConversationState,
        message: Message,
    ) -> Result<TurnOutcome> {
        if state.status.is_terminal() {
            return Err(HarnessError::ConversationClosed {
                status: state.status.to_string(),
            }
            .into());
        }

        let turn = state.iteration_count + 1;
        let query = message.content.clone();
        let mut scratch = state.apply(StateDelta {
            new_messages: vec![message],
            ..Default::default()
        });

        let hits = self
            .retriever
            .retrieve(&query, &scratch.retrieved_doc_ids)
            .await;
        scratch = scratch.apply(StateDelta {
            new_retrieved: hits.iter().cloned().map(RetrievedChunk::from).collect(),
            ..Default::default()
        });

        let budget = TurnBudget::new(self.settings.request_limit, self.settings.total_tokens_limit);
        let llm = BudgetedLlm::new(self.llm.as_ref(), &budget);

        let (_, delta) = analyzer::analyze(&llm, &self.settings, &scratch, turn).await?;
        scratch = scratch.apply(delta);

        let response = generator::generate(&llm, &self.settings, &scratch).await?;
        let next = scratch.apply(StateDelta {
            new_messages: vec![Message::assistant(response.clone())],
            iteration_increment: 1,
            ..Default::default()
        });

        tracing::info!(
            turn,
            status = %next.status,
            new_chunks = hits.len(),
            tokens = budget.tokens_used(),
            "turn complete"
        );

        Ok(TurnOutcome {
            response,
            state: next,
            retrieved: hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::state::Status;
    use crate::embedding::EmbedderAdapter;
    use crate::error::is_budget_exceeded;
    use crate::models::ChunkRecord;
    use crate::store::memory::InMemoryStore;
    use crate::store::VectorStore;
    use crate::testing::{HashEmbedder, ScriptedLlm};
    use serde_json::json;

    async fn retriever() -> Retriever {
        let embedder = EmbedderAdapter::new(Arc::new(HashEmbedder::new(256)), 256, 8);
        let store = Arc::new(InMemoryStore::new());
        let texts = [
            "install hummingbot with docker compose",
            "docker compose pull the latest image",
            "anaconda source install needs wsl on windows",
            "create the conda environment",
            "exchange api keys are set with connect",
        ];
        let mut records = Vec::new();
        for (i, t) in texts.iter().enumerate() {
            records.push(ChunkRecord {
                id: format!("c{}", i),
                content: t.to_string(),
                source_document_id: "kb".into(),
                platform: "kb".into(),
                author_id: "a".into(),
                author_full_name: "A".into(),
                embedding: embedder.embed_query(t).await.unwrap(),
                metadata: json!({}),
            });
        }
        store.bulk_upsert(records).await.unwrap();
        Retriever::new(store, embedder, 3)
    }

    fn analysis(solved: bool, escalate: bool) -> serde_json::Value {
        json!({
            "updated_summary": "user installs with docker",
            "is_solved": solved,
            "detected_installation_method": "docker",
            "detected_os": "linux",
            "needs_support_escalation": escalate,
        })
    }

    #[tokio::test]
    async fn test_turn_appends_messages_and_counts() {
        let llm = Arc::new(ScriptedLlm::assistant(analysis(false, false), "Try `docker compose up -d`"));
        let engine = Engine::new(retriever().await, llm.clone(), AssistantSettings::default());

        let s0 = ConversationState::new();
        let out = engine
            .run_turn(&s0, Message::user("how do I install with docker compose"))
            .await
            .unwrap();

        assert_eq!(out.response, "Try `docker compose up -d`");
        assert_eq!(out.state.iteration_count, 1);
        assert_eq!(out.state.messages.len(), 2);
        assert_eq!(out.state.status, Status::Active);
        assert_eq!(out.state.summary, "user installs with docker");
        assert_eq!(out.retrieved.len(), 3);
        assert_eq!(out.state.retrieved_doc_ids.len(), 3);
        // input untouched
        assert_eq!(s0, ConversationState::new());
        // analysis then generation
        let reqs = llm.requests();
        assert_eq!(reqs.len(), 2);
        assert!(reqs[0].json_response);
        assert!(!reqs[1].json_response);
    }

    #[tokio::test]
    async fn test_terminal_state_refuses_turn() {
        let llm = Arc::new(ScriptedLlm::assistant(analysis(false, false), "x"));
        let engine = Engine::new(retriever().await, llm.clone(), AssistantSettings::default());
        let closed = ConversationState::new().apply(StateDelta {
            status: Some(Status::Solved),
            ..Default::default()
        });

        let err = engine.run_turn(&closed, Message::user("again")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HarnessError>(),
            Some(HarnessError::ConversationClosed { .. })
        ));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_leaves_state_unchanged() {
        let script = analysis(false, false).to_string();
        let llm = Arc::new(ScriptedLlm::new(vec![script.as_str()]));
        let engine = Engine::new(retriever().await, llm, AssistantSettings::default());
        let s0 = ConversationState::new();

        assert!(engine.run_turn(&s0, Message::user("docker")).await.is_err());
        assert_eq!(s0.iteration_count, 0);
        assert!(s0.messages.is_empty());
    }

    #[tokio::test]
    async fn test_budget_exceeded_fails_turn() {
        let llm = Arc::new(ScriptedLlm::assistant(analysis(false, false), "x").with_usage(1500, 600));
        let engine = Engine::new(retriever().await, llm, AssistantSettings::default());

        let err = engine
            .run_turn(&ConversationState::new(), Message::user("docker"))
            .await
            .unwrap_err();
        assert!(is_budget_exceeded(&err));
    }

    #[tokio::test]
    async fn test_escalates_at_iteration_cap() {
        let llm = Arc::new(ScriptedLlm::assistant(analysis(false, false), "keep trying"));
        let engine = Engine::new(retriever().await, llm, AssistantSettings::default());

        let mut state = ConversationState::new();
        let mut turns = 0;
        while !state.status.is_terminal() {
            state = engine
                .run_turn(&state, Message::user(format!("still broken {}", turns)))
                .await
                .unwrap()
                .state;
            turns += 1;
            assert!(turns <= 10);
        }
        assert_eq!(state.status, Status::Escalated);
        assert_eq!(turns, 9);
        assert_eq!(state.iteration_count, 9);
    }

    #[tokio::test]
    async fn test_solved_ends_conversation() {
        let llm = Arc::new(ScriptedLlm::assistant(analysis(true, false), "Glad it works"));
        let engine = Engine::new(retriever().await, llm, AssistantSettings::default());
        let out = engine
            .run_turn(&ConversationState::new(), Message::user("it works now, thanks"))
            .await
            .unwrap();
        assert_eq!(out.state.status, Status::Solved);
    }
}
