//! Deterministic stand-ins for the embedding model and the LLM.
//!
//! Used by unit and integration tests; nothing here makes network calls.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::embedding::EmbeddingProvider;
use crate::llm::{LlmProvider, LlmRequest, LlmResponse};

/// Bag-of-words hashing embedder: texts sharing words get similar vectors.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize;
            v[bucket % self.dims] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-embedder"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Always fails, as an unreachable model server would.
pub struct FailingEmbedder {
    dims: usize,
}

impl FailingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing-embedder"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(crate::error::HarnessError::transient("embedding", "connection refused").into())
    }
}

type Responder = Box<dyn Fn(&LlmRequest) -> Result<String> + Send + Sync>;

/// An [`LlmProvider`] that answers from a script and records every request.
pub struct ScriptedLlm {
    queue: Mutex<VecDeque<String>>,
    responder: Option<Responder>,
    usage: (u64, u64),
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    /// Reply with `responses` in order, then fail.
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            queue: Mutex::new(responses.into_iter().map(String::from).collect()),
            responder: None,
            usage: (10, 5),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reply by calling `f` for every request.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&LlmRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(f)),
            usage: (10, 5),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer analysis requests (JSON mode) with `analysis` and everything
    /// else with `reply`.
    pub fn assistant(analysis: serde_json::Value, reply: &str) -> Self {
        let reply = reply.to_string();
        Self::from_fn(move |req| {
            if req.json_response {
                Ok(analysis.to_string())
            } else {
                Ok(reply.clone())
            }
        })
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = (input_tokens, output_tokens);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let text = match &self.responder {
            Some(f) => f(&request)?,
            None => {
                let mut queue = self.queue.lock().map_err(|_| anyhow!("script lock poisoned"))?;
                match queue.pop_front() {
                    Some(t) => t,
                    None => bail!("scripted LLM has no responses left"),
                }
            }
        };
        self.requests
            .lock()
            .map_err(|_| anyhow!("script lock poisoned"))?
            .push(request);

        Ok(LlmResponse {
            text,
            input_tokens: Some(self.usage.0),
            output_tokens: Some(self.usage.1),
        })
    }
}
