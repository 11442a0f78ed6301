//! Conversation analyzer.
//!
//! One JSON-mode model call per turn yields an updated summary, a solved
//! flag, the detected installation method and OS, and the model's own
//! escalation opinion. [`final_status`] then applies the hard rule:
//!
//! ```text
//! ESCALATED  if needs_escalation OR (turn >= CAP AND NOT is_solved)
//! SOLVED     elif is_solved
//! ACTIVE     otherwise
//! ```
//!
//! `turn` is the 1-based number of the turn being analyzed, so the turn
//! that brings `iteration_count` to CAP is the last ACTIVE-able one.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::state::{ConversationState, InstallationMethod, StateDelta, Status, UserOs};
use super::AssistantSettings;
use crate::llm::{BudgetedLlm, ChatMessage, LlmRequest};

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub updated_summary: String,
    pub is_solved: bool,
    pub detected_installation_method: InstallationMethod,
    pub detected_os: UserOs,
    pub needs_support_escalation: bool,
}

/// Summary and both flags are required; a reply missing one fails the turn
/// so the committed state stays authoritative. Unrecognised or absent
/// labels fall back to `Unknown`.
#[derive(Deserialize)]
struct RawAnalysis {
    updated_summary: String,
    is_solved: bool,
    #[serde(default)]
    detected_installation_method: String,
    #[serde(default)]
    detected_os: String,
    needs_support_escalation: bool,
}

/// Parse the model's JSON answer, tolerating a fenced code block around it.
pub fn parse_analysis(text: &str) -> Result<Analysis> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let raw: RawAnalysis =
        serde_json::from_str(body).with_context(|| "analysis response is not valid analysis JSON")?;

    Ok(Analysis {
        updated_summary: raw.updated_summary,
        is_solved: raw.is_solved,
        detected_installation_method: InstallationMethod::from_label(
            &raw.detected_installation_method,
        ),
        detected_os: UserOs::from_label(&raw.detected_os),
        needs_support_escalation: raw.needs_support_escalation,
    })
}

pub fn final_status(analysis: &Analysis, turn: u32, cap: u32) -> Status {
    if analysis.needs_support_escalation || (turn >= cap && !analysis.is_solved) {
        Status::Escalated
    } else if analysis.is_solved {
        Status::Solved
    } else {
        Status::Active
    }
}

pub fn build_prompt(state: &ConversationState, settings: &AssistantSettings) -> String {
    let history = state
        .messages
        .iter()
        .map(|m| m.transcript_line())
        .collect::<Vec<_>>()
        .join("\n\n");
    let summary = if state.summary.is_empty() {
        "No summary available."
    } else {
        state.summary.as_str()
    };

    format!(
        r#"Analyze the following support conversation about {product} installation.

CONVERSATION HISTORY:
{history}

CURRENT SUMMARY:
{summary}

Based on the conversation, provide:
1. An updated summary of the problem and progress
2. Whether the problem has been solved (user explicitly stated or clearly implied)
3. The detected installation method (docker, source, or unknown)
4. The detected operating system (windows, macos, linux, or unknown)
5. Whether the issue needs to be escalated to the support team

Installation methods:
- docker: the user installs with Docker containers
- source: the user builds from source with Anaconda

Operating system notes:
- Windows source builds require WSL (Windows Subsystem for Linux)
- macOS and Linux source builds require Anaconda
- Docker builds require Docker on every OS

Respond with a single JSON object with exactly these keys:
{{"updated_summary": string, "is_solved": bool, "detected_installation_method": "docker"|"source"|"unknown", "detected_os": "windows"|"macos"|"linux"|"unknown", "needs_support_escalation": bool}}"#,
        product = settings.product,
    )
}

/// Run the analysis step for the turn numbered `turn`.
///
/// # Errors
///
/// Model failures, budget exhaustion and unparseable output propagate; the
/// caller abandons the turn.
pub async fn analyze(
    llm: &BudgetedLlm<'_>,
    settings: &AssistantSettings,
    state: &ConversationState,
    turn: u32,
) -> Result<(Analysis, StateDelta)> {
    let request = LlmRequest {
        model: settings.model.clone(),
        messages: vec![ChatMessage::user(build_prompt(state, settings))],
        temperature: settings.temperature,
        json_response: true,
        max_tokens: None,
    };

    let response = llm.chat(request).await.context("analysis step")?;
    let analysis = parse_analysis(&response.text)?;
    let status = final_status(&analysis, turn, settings.iteration_cap);

    tracing::debug!(
        turn,
        status = %status,
        is_solved = analysis.is_solved,
        needs_escalation = analysis.needs_support_escalation,
        "conversation analyzed"
    );

    let delta = StateDelta {
        summary: Some(analysis.updated_summary.clone()),
        status: Some(status),
        detected_installation_method: Some(analysis.detected_installation_method),
        detected_os: Some(analysis.detected_os),
        ..Default::default()
    };
    Ok((analysis, delta))
}
