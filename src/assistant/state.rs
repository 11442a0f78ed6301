//! Conversation state and its transition function.
//!
//! Steps never mutate a [`ConversationState`] in place. Each returns a
//! [`StateDelta`] and [`ConversationState::apply`] produces the next value.
//!
//! # Merge semantics
//!
//! | Field | Delta | Merge |
//! |-------|-------|-------|
//! | `summary` | `Option<String>` | replace |
//! | `status` | `Option<Status>` | replace |
//! | `detected_installation_method` | `Option<InstallationMethod>` | replace |
//! | `detected_os` | `Option<UserOs>` | replace |
//! | `messages` | `Vec<Message>` | append |
//! | `retrieved` / `retrieved_doc_ids` | `Vec<RetrievedChunk>` | append, skipping known ids |
//! | `iteration_count` | `u32` | add |

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::models::SearchHit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Active,
    Solved,
    Escalated,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Solved | Status::Escalated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Solved => "solved",
            Status::Escalated => "escalated",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstallationMethod {
    Docker,
    Source,
    #[default]
    Unknown,
}

impl InstallationMethod {
    /// Lenient parse of a model-produced label; anything unrecognised is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "docker" => Self::Docker,
            "source" => Self::Source,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Source => "source",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserOs {
    Windows,
    Macos,
    Linux,
    #[default]
    Unknown,
}

impl UserOs {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "windows" => Self::Windows,
            "macos" | "mac" | "osx" => Self::Macos,
            "linux" => Self::Linux,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Macos => "macos",
            Self::Linux => "linux",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// `User: …` / `Assistant: …` line used in prompts.
    pub fn transcript_line(&self) -> String {
        let role = match self.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        if self.attachments.is_empty() {
            format!("{}: {}", role, self.content)
        } else {
            let names: Vec<&str> = self.attachments.iter().map(|a| a.filename.as_str()).collect();
            format!("{}: {} [attachments: {}]", role, self.content, names.join(", "))
        }
    }
}

/// A chunk surfaced to this conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub content: String,
    pub source_document_id: String,
}

impl From<SearchHit> for RetrievedChunk {
    fn from(hit: SearchHit) -> Self {
        Self {
            id: hit.id,
            content: hit.content,
            source_document_id: hit.source_document_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConversationState {
    pub summary: String,
    pub retrieved_doc_ids: BTreeSet<String>,
    pub retrieved: Vec<RetrievedChunk>,
    pub iteration_count: u32,
    pub status: Status,
    pub detected_installation_method: InstallationMethod,
    pub detected_os: UserOs,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub summary: Option<String>,
    pub status: Option<Status>,
    pub detected_installation_method: Option<InstallationMethod>,
    pub detected_os: Option<UserOs>,
    pub new_messages: Vec<Message>,
    pub new_retrieved: Vec<RetrievedChunk>,
    pub iteration_increment: u32,
}

impl ConversationState {
    /// ACTIVE, no turns, empty summary and retrieval set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The state after merging `delta` into `self`.
    pub fn apply(&self, delta: StateDelta) -> ConversationState {
        let mut next = self.clone();

        if let Some(summary) = delta.summary {
            next.summary = summary;
        }
        if let Some(status) = delta.status {
            next.status = status;
        }
        if let Some(method) = delta.detected_installation_method {
            next.detected_installation_method = method;
        }
        if let Some(os) = delta.detected_os {
            next.detected_os = os;
        }
        next.messages.extend(delta.new_messages);
        for chunk in delta.new_retrieved {
            if next.retrieved_doc_ids.insert(chunk.id.clone()) {
                next.retrieved.push(chunk);
            }
        }
        next.iteration_count += delta.iteration_increment;

        next
    }

    pub fn latest_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// The trailing `n` messages.
    pub fn recent_messages(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str) -> RetrievedChunk {
        RetrievedChunk {
            id: id.into(),
            content: format!("content {}", id),
            source_document_id: "doc".into(),
        }
    }

    #[test]
    fn test_initial_state() {
        let s = ConversationState::new();
        assert_eq!(s.status, Status::Active);
        assert_eq!(s.iteration_count, 0);
        assert!(s.summary.is_empty());
        assert!(s.retrieved_doc_ids.is_empty());
    }

    #[test]
    fn test_apply_is_pure_and_merges_per_field() {
        let s0 = ConversationState::new().apply(StateDelta {
            new_messages: vec![Message::user("hi")],
            summary: Some("first".into()),
            ..Default::default()
        });
        let s1 = s0.apply(StateDelta {
            new_messages: vec![Message::assistant("hello")],
            summary: Some("second".into()),
            detected_os: Some(UserOs::Linux),
            iteration_increment: 1,
            ..Default::default()
        });

        assert_eq!(s0.messages.len(), 1);
        assert_eq!(s0.summary, "first");
        assert_eq!(s1.messages.len(), 2);
        assert_eq!(s1.summary, "second");
        assert_eq!(s1.detected_os, UserOs::Linux);
        assert_eq!(s1.detected_installation_method, InstallationMethod::Unknown);
        assert_eq!(s1.iteration_count, 1);
    }

    #[test]
    fn test_retrieved_append_skips_known_ids() {
        let s = ConversationState::new()
            .apply(StateDelta {
                new_retrieved: vec![chunk("a"), chunk("b")],
                ..Default::default()
            })
            .apply(StateDelta {
                new_retrieved: vec![chunk("b"), chunk("c")],
                ..Default::default()
            });
        assert_eq!(s.retrieved.len(), 3);
        assert_eq!(s.retrieved_doc_ids.len(), 3);
    }

    #[test]
    fn test_lenient_labels() {
        assert_eq!(InstallationMethod::from_label(" Docker "), InstallationMethod::Docker);
        assert_eq!(InstallationMethod::from_label("pip"), InstallationMethod::Unknown);
        assert_eq!(UserOs::from_label("macOS"), UserOs::Macos);
        assert_eq!(UserOs::from_label("freebsd"), UserOs::Unknown);
    }

    #[test]
    fn test_recent_messages_window() {
        let mut s = ConversationState::new();
        for i in 0..7 {
            s = s.apply(StateDelta {
                new_messages: vec![Message::user(format!("m{}", i))],
                ..Default::default()
            });
        }
        let recent = s.recent_messages(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].content, "m2");
        assert_eq!(s.latest_user_message().unwrap().content, "m6");
    }

    #[test]
    fn test_transcript_line_lists_attachments() {
        let m = Message::user("see log").with_attachments(vec![Attachment {
            filename: "error.log".into(),
            url: "https://cdn.example/error.log".into(),
            content_type: Some("text/plain".into()),
            size: 120,
        }]);
        assert_eq!(m.transcript_line(), "User: see log [attachments: error.log]");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Escalated).unwrap(), "\"escalated\"");
        assert!(Status::Solved.is_terminal());
        assert!(!Status::Active.is_terminal());
    }
}
