//! Chat-completion client and per-turn usage budget.
//!
//! [`LlmProvider`] is the seam the conversation engine calls through.
//! [`OpenAiChat`] talks to any OpenAI-compatible `/chat/completions`
//! endpoint; [`DisabledLlm`] fails every call. Calls are never retried:
//! a failed or over-budget call fails the whole turn.
//!
//! [`TurnBudget`] bounds one turn by request count and total tokens
//! (reference limits: 2 requests, 2000 tokens). [`BudgetedLlm`] enforces
//! it around a provider and raises [`HarnessError::BudgetExceeded`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::HarnessError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Ask for a JSON object response.
    pub json_response: bool,
    pub max_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.unwrap_or(0) + self.output_tokens.unwrap_or(0)
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse>;
}

// ============ Disabled ============

pub struct DisabledLlm;

#[async_trait]
impl LlmProvider for DisabledLlm {
    async fn chat(&self, _request: LlmRequest) -> Result<LlmResponse> {
        bail!("LLM provider is disabled. Set [llm] provider in config.")
    }
}

// ============ OpenAI-compatible ============

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderErrorKind {
    RateLimit,
    ServerError,
    AuthError,
    InvalidRequest,
    Unknown,
}

impl ProviderErrorKind {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            429 => Self::RateLimit,
            401 | 403 => Self::AuthError,
            400 | 422 => Self::InvalidRequest,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

impl OpenAiChat {
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow!("{} environment variable not set", config.api_key_env))?;
        Self::new(
            api_key,
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl LlmProvider for OpenAiChat {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        let payload = ApiRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request
                .json_response
                .then(|| serde_json::json!({"type": "json_object"})),
        };

        let resp = self
            .client
            .post(url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| HarnessError::transient("chat completion", e))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await.unwrap_or_default();
            let kind = ProviderErrorKind::from_status(status);
            bail!("chat completion failed ({:?}, {}): {}", kind, status, text);
        }

        let body: ApiResponse = resp.json().await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("chat completion returned no content"))?;

        Ok(LlmResponse {
            text,
            input_tokens: body.usage.as_ref().and_then(|u| u.prompt_tokens),
            output_tokens: body.usage.as_ref().and_then(|u| u.completion_tokens),
        })
    }
}

pub fn create_llm(config: &LlmConfig) -> Result<std::sync::Arc<dyn LlmProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(std::sync::Arc::new(DisabledLlm)),
        "openai" => Ok(std::sync::Arc::new(OpenAiChat::from_config(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

// ============ Budget ============

/// Usage allowance for one conversation turn.
#[derive(Debug)]
pub struct TurnBudget {
    request_limit: u32,
    total_tokens_limit: u64,
    requests: AtomicU32,
    tokens: AtomicU64,
}

impl TurnBudget {
    pub fn new(request_limit: u32, total_tokens_limit: u64) -> Self {
        Self {
            request_limit,
            total_tokens_limit,
            requests: AtomicU32::new(0),
            tokens: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.request_limit, config.total_tokens_limit)
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens.load(Ordering::SeqCst)
    }

    pub fn requests_made(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Reserve one request; returns the tokens still available.
    fn begin_request(&self) -> Result<u64> {
        let made = self.requests.fetch_add(1, Ordering::SeqCst);
        if made >= self.request_limit {
            return Err(HarnessError::BudgetExceeded {
                limit: format!("request_limit={}", self.request_limit),
            }
            .into());
        }
        let used = self.tokens_used();
        if used >= self.total_tokens_limit {
            return Err(HarnessError::BudgetExceeded {
                limit: format!("total_tokens_limit={}", self.total_tokens_limit),
            }
            .into());
        }
        Ok(self.total_tokens_limit - used)
    }

    fn record(&self, tokens: u64) -> Result<()> {
        let total = self.tokens.fetch_add(tokens, Ordering::SeqCst) + tokens;
        if total > self.total_tokens_limit {
            return Err(HarnessError::BudgetExceeded {
                limit: format!(
                    "total_tokens_limit={} (used {})",
                    self.total_tokens_limit, total
                ),
            }
            .into());
        }
        Ok(())
    }
}

/// A provider call metered against a [`TurnBudget`].
pub struct BudgetedLlm<'a> {
    provider: &'a dyn LlmProvider,
    budget: &'a TurnBudget,
}

impl<'a> BudgetedLlm<'a> {
    pub fn new(provider: &'a dyn LlmProvider, budget: &'a TurnBudget) -> Self {
        Self { provider, budget }
    }

    pub async fn chat(&self, mut request: LlmRequest) -> Result<LlmResponse> {
        let remaining = self.budget.begin_request()?;
        request.max_tokens = Some(request.max_tokens.map_or(remaining, |m| m.min(remaining)));

        let response = self.provider.chat(request).await?;
        self.budget.record(response.total_tokens())?;
        Ok(response)
    }
}
