//! Error taxonomy for the pipeline and the conversation engine.
//!
//! Most functions return [`anyhow::Result`]; the variants here are raised
//! where a caller needs to react to the *kind* of failure rather than just
//! report it. Recover them with [`anyhow::Error::downcast_ref`]:
//!
//! ```rust
//! use wiz_harness::error::HarnessError;
//!
//! let err: anyhow::Error = HarnessError::BudgetExceeded { limit: "requests".into() }.into();
//! assert!(matches!(
//!     err.downcast_ref::<HarnessError>(),
//!     Some(HarnessError::BudgetExceeded { .. })
//! ));
//! ```
//!
//! | Variant | Raised by | Handling |
//! |---------|-----------|----------|
//! | `TransientIo` | stores, model clients | read paths log and degrade, write paths propagate |
//! | `BudgetExceeded` | [`crate::llm::TurnBudget`] | turn abandoned, never retried |
//! | `Validation` | knowledge-base loader, connectors | item rejected, batch continues |
//! | `ConversationClosed` | [`crate::assistant::engine`] | caller must reset |
//! | `DimensionMismatch` | [`crate::embedding::EmbedderAdapter`] | reindex aborted before any write |

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    /// Store or model connection failure.
    #[error("transient I/O failure in {context}: {message}")]
    TransientIo { context: String, message: String },

    /// Model usage limit hit during a turn.
    #[error("model usage budget exceeded: {limit}")]
    BudgetExceeded { limit: String },

    /// Malformed source content or a missing required field.
    #[error("invalid item '{item}': {reason}")]
    Validation { item: String, reason: String },

    /// A turn was attempted on a SOLVED or ESCALATED conversation.
    #[error("conversation is closed ({status})")]
    ConversationClosed { status: String },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl HarnessError {
    pub fn validation(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            item: item.into(),
            reason: reason.into(),
        }
    }

    pub fn transient(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::TransientIo {
            context: context.into(),
            message: err.to_string(),
        }
    }
}

/// Returns true when `err` wraps [`HarnessError::BudgetExceeded`].
pub fn is_budget_exceeded(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<HarnessError>(),
        Some(HarnessError::BudgetExceeded { .. })
    )
}
