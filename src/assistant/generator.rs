//! Response generator: one free-text model call per turn, with the prompt
//! template chosen by the (already analyzed) conversation status.

use anyhow::{Context, Result};

use super::state::{ConversationState, Status};
use super::AssistantSettings;
use crate::llm::{BudgetedLlm, ChatMessage, LlmRequest};

fn recent_transcript(state: &ConversationState, window: usize) -> String {
    state
        .recent_messages(window)
        .iter()
        .map(|m| m.transcript_line())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn documents_block(state: &ConversationState) -> String {
    if state.retrieved.is_empty() {
        return "No documents retrieved.".to_string();
    }
    state
        .retrieved
        .iter()
        .enumerate()
        .map(|(i, c)| format!("DOCUMENT {}:\n{}", i + 1, c.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(state: &ConversationState, settings: &AssistantSettings) -> String {
    let intro = format!(
        "You are a helpful assistant that helps {} users install and run the software.",
        settings.product
    );
    let recent = recent_transcript(state, settings.history_window);
    let method = state.detected_installation_method.as_str();
    let os = state.detected_os.as_str();

    match state.status {
        Status::Escalated => format!(
            r#"{intro}
This conversation has gone on without resolution and is being handed to a human.

CONVERSATION SUMMARY:
{summary}

RECENT CONVERSATION:
{recent}

RETRIEVED DOCUMENTS:
{docs}

INSTALLATION METHOD: {method}
OPERATING SYSTEM: {os}

Tell the user you are bringing in a support team member, then tag {mention}. Be empathetic and summarize the current status and what has been tried so far."#,
            summary = state.summary,
            docs = documents_block(state),
            mention = settings.support_mention,
        ),
        Status::Solved => format!(
            r#"{intro}
This conversation has been marked as SOLVED.

CONVERSATION SUMMARY:
{summary}

RECENT CONVERSATION:
{recent}

Be positive about the resolution, briefly summarize what was done, and offer any final tips or resources that may help the user going forward."#,
            summary = state.summary,
        ),
        Status::Active => format!(
            r#"{intro}
Always put specific commands (like `docker compose up -d`) in fenced code blocks when the retrieved documents mention them.

CONVERSATION SUMMARY:
{summary}

RECENT CONVERSATION:
{recent}

RETRIEVED DOCUMENTS:
{docs}

INSTALLATION METHOD: {method}
OPERATING SYSTEM: {os}

Answer the user's question from the retrieved documents. If they are not enough, guide the user based on:
1. Source installs: Anaconda is required, plus WSL on Windows
2. Docker installs: Docker is required; give the commands when available
3. Be clear and step-by-step, and suggest the next thing the user should try"#,
            summary = state.summary,
            docs = documents_block(state),
        ),
    }
}

pub async fn generate(
    llm: &BudgetedLlm<'_>,
    settings: &AssistantSettings,
    state: &ConversationState,
) -> Result<String> {
    let request = LlmRequest {
        model: settings.model.clone(),
        messages: vec![ChatMessage::system(build_prompt(state, settings))],
        temperature: settings.temperature,
        json_response: false,
        max_tokens: None,
    };
    let response = llm.chat(request).await.context("generation step")?;
    Ok(response.text.trim().to_string())
}
