//! Retrieval-augmented conversation engine.
//!
//! Each inbound message drives exactly one strictly sequential pass:
//!
//! ```text
//!            ┌──────────┐   ┌──────────┐   ┌──────────┐
//! message ──▶│ retrieve │──▶│ analyze  │──▶│ generate │──▶ (reply, new state)
//!            └──────────┘   └──────────┘   └──────────┘
//!                                │
//!                  ACTIVE ◀──────┼──────▶ SOLVED | ESCALATED (terminal)
//! ```
//!
//! | Module | Role |
//! |--------|------|
//! | [`state`] | [`state::ConversationState`] and its delta-merge transition |
//! | [`analyzer`] | status classification and the escalation rule |
//! | [`generator`] | status-specific response prompts |
//! | [`engine`] | one turn, all-or-nothing |
//! | [`manager`] | conversations keyed by (channel, user), serialised per key |

pub mod analyzer;
pub mod engine;
pub mod generator;
pub mod manager;
pub mod state;

use crate::config::Config;

/// Knobs the analyzer and generator share.
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub model: String,
    pub temperature: f32,
    pub iteration_cap: u32,
    pub history_window: usize,
    pub product: String,
    pub support_mention: String,
    pub request_limit: u32,
    pub total_tokens_limit: u64,
}

impl AssistantSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            iteration_cap: config.conversation.iteration_cap,
            history_window: config.conversation.history_window,
            product: config.conversation.product.clone(),
            support_mention: config.conversation.support_mention.clone(),
            request_limit: config.llm.request_limit,
            total_tokens_limit: config.llm.total_tokens_limit,
        }
    }
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self::from_config(&Config::with_db_path("wiz.sqlite"))
    }
}
