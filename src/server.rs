//! HTTP chat bridge.
//!
//! A chat front end (a Discord bot, a web widget) forwards each user
//! message here and relays the response.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/chat` | Run one turn: `{channel_id, user_id, message, attachments?}` |
//! | `GET`  | `/conversations/{channel}/{user}` | Current conversation state |
//! | `POST` | `/conversations/reset` | Forget a conversation: `{channel_id, user_id}` |
//!
//! # Request signing
//!
//! When `[server] signing_secret_env` names a set environment variable,
//! every `POST` body must carry `x-wiz-signature: sha256=<hex>`, the
//! HMAC-SHA256 of the raw body under that secret. Missing or wrong
//! signatures get `401`.
//!
//! # Error contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `internal` (500).

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::assistant::engine::Engine;
use crate::assistant::manager::{ChatReply, ConversationManager, InboundMessage};
use crate::assistant::state::ConversationState;
use crate::assistant::AssistantSettings;
use crate::config::Config;
use crate::ingest::Pipeline;
use crate::llm::create_llm;
use crate::retrieve::Retriever;

pub const SIGNATURE_HEADER: &str = "x-wiz-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct AppState {
    manager: ConversationManager,
    signing_secret: Option<Arc<Vec<u8>>>,
}

impl AppState {
    pub fn new(manager: ConversationManager, signing_secret: Option<Vec<u8>>) -> Self {
        Self {
            manager,
            signing_secret: signing_secret.map(Arc::new),
        }
    }
}

/// Wire the conversation manager from config: SQLite store, embedder,
/// retriever and chat model.
pub async fn open_manager(config: &Config) -> anyhow::Result<ConversationManager> {
    let pipeline = Pipeline::open(config).await?;
    let retriever = Retriever::new(
        pipeline.store.clone(),
        pipeline.embedder.clone(),
        config.retrieval.top_k,
    );
    let llm = create_llm(&config.llm)?;
    let engine = Engine::new(retriever, llm, AssistantSettings::from_config(config));
    Ok(ConversationManager::new(engine))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/conversations/{channel}/{user}", get(handle_get_conversation))
        .route("/conversations/reset", post(handle_reset))
        .layer(cors)
        .with_state(state)
}

/// Serve the bridge on `[server] bind` until the process is stopped.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let signing_secret = match &config.server.signing_secret_env {
        Some(var) => match std::env::var(var) {
            Ok(secret) if !secret.is_empty() => Some(secret.into_bytes()),
            _ => {
                tracing::warn!(var = %var, "signing secret variable not set; requests are unsigned");
                None
            }
        },
        None => None,
    };

    let manager = open_manager(config).await?;
    let app = router(AppState::new(manager, signing_secret));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "chat bridge listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// `sha256=<hex>` signature of `body` under `secret`.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(m) => m,
        // HMAC accepts keys of any length
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn verify_signature(secret: &[u8], headers: &HeaderMap, body: &[u8]) -> Result<(), AppError> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("missing signature"))?;
    let digest = header
        .strip_prefix("sha256=")
        .and_then(|h| hex::decode(h).ok())
        .ok_or_else(|| unauthorized("malformed signature"))?;

    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| internal("invalid signing key"))?;
    mac.update(body);
    mac.verify_slice(&digest)
        .map_err(|_| unauthorized("signature mismatch"))
}

fn parse_signed<T: for<'de> Deserialize<'de>>(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<T, AppError> {
    if let Some(secret) = &state.signing_secret {
        verify_signature(secret, headers, body)?;
    }
    serde_json::from_slice(body).map_err(|e| bad_request(format!("invalid JSON body: {}", e)))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ChatReply>, AppError> {
    let inbound: InboundMessage = parse_signed(&state, &headers, &body)?;
    if inbound.channel_id.is_empty() || inbound.user_id.is_empty() {
        return Err(bad_request("channel_id and user_id are required"));
    }
    if inbound.message.trim().is_empty() && inbound.attachments.is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    Ok(Json(state.manager.handle_message(inbound).await))
}

// ============ GET /conversations/{channel}/{user} ============

async fn handle_get_conversation(
    State(state): State<AppState>,
    Path((channel, user)): Path<(String, String)>,
) -> Result<Json<ConversationState>, AppError> {
    state
        .manager
        .get(&channel, &user)
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("no conversation for {}/{}", channel, user)))
}

// ============ POST /conversations/reset ============

#[derive(Deserialize)]
struct ResetRequest {
    channel_id: String,
    user_id: String,
}

#[derive(Serialize)]
struct ResetResponse {
    reset: bool,
}

async fn handle_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ResetResponse>, AppError> {
    let req: ResetRequest = parse_signed(&state, &headers, &body)?;
    let reset = state.manager.reset(&req.channel_id, &req.user_id).await;
    Ok(Json(ResetResponse { reset }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_signature_roundtrip_and_mismatch() {
        let secret = b"shh";
        let body = br#"{"channel_id":"c"}"#;
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&sign(secret, body)).unwrap(),
        );
        assert!(verify_signature(secret, &headers, body).is_ok());
        assert!(verify_signature(b"other", &headers, body).is_err());
        assert!(verify_signature(secret, &headers, b"tampered").is_err());
    }

    #[test]
    fn test_missing_or_malformed_signature() {
        let err = verify_signature(b"k", &HeaderMap::new(), b"{}").unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("md5=zz"));
        let err = verify_signature(b"k", &headers, b"{}").unwrap_err();
        assert_eq!(err.code, "unauthorized");
    }
}
