//! HTTP chat bridge served on an ephemeral port.

use serde_json::{json, Value};
use std::sync::Arc;

use wiz_harness::assistant::engine::Engine;
use wiz_harness::assistant::manager::{ConversationManager, APOLOGY};
use wiz_harness::assistant::AssistantSettings;
use wiz_harness::embedding::EmbedderAdapter;
use wiz_harness::retrieve::Retriever;
use wiz_harness::server::{router, sign, AppState, SIGNATURE_HEADER};
use wiz_harness::store::memory::InMemoryStore;
use wiz_harness::testing::{HashEmbedder, ScriptedLlm};

fn manager(llm: ScriptedLlm) -> ConversationManager {
    let embedder = EmbedderAdapter::new(Arc::new(HashEmbedder::new(32)), 256, 8);
    let retriever = Retriever::new(Arc::new(InMemoryStore::new()), embedder, 3);
    ConversationManager::new(Engine::new(
        retriever,
        Arc::new(llm),
        AssistantSettings::default(),
    ))
}

fn active_llm() -> ScriptedLlm {
    ScriptedLlm::assistant(
        json!({
            "updated_summary": "docker install on linux",
            "is_solved": false,
            "detected_installation_method": "docker",
            "detected_os": "linux",
            "needs_support_escalation": false,
        }),
        "Run docker compose up -d",
    )
}

/// Serve the router on 127.0.0.1 with an OS-assigned port; returns the base URL.
async fn spawn_server(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn chat_body(message: &str) -> String {
    json!({
        "channel_id": "support",
        "user_id": "u1",
        "message": message,
    })
    .to_string()
}

#[tokio::test]
async fn test_health() {
    let base = spawn_server(AppState::new(manager(active_llm()), None)).await;
    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_chat_then_fetch_and_reset_conversation() {
    let base = spawn_server(AppState::new(manager(active_llm()), None)).await;
    let client = reqwest::Client::new();

    let missing = client
        .get(format!("{}/conversations/support/u1", base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    let err: Value = missing.json().await.unwrap();
    assert_eq!(err["error"]["code"], "not_found");

    let resp = client
        .post(format!("{}/chat", base))
        .header("content-type", "application/json")
        .body(chat_body("how do I install with docker?"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let reply: Value = resp.json().await.unwrap();
    assert_eq!(reply["response"], "Run docker compose up -d");
    assert_eq!(reply["failed"], false);
    assert_eq!(reply["state"]["status"], "active");
    assert_eq!(reply["state"]["iteration_count"], 1);

    let state: Value = client
        .get(format!("{}/conversations/support/u1", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["detected_installation_method"], "docker");
    assert_eq!(state["messages"].as_array().unwrap().len(), 2);

    let reset: Value = client
        .post(format!("{}/conversations/reset", base))
        .body(json!({"channel_id": "support", "user_id": "u1"}).to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reset["reset"], true);
}

#[tokio::test]
async fn test_chat_rejects_bad_requests() {
    let base = spawn_server(AppState::new(manager(active_llm()), None)).await;
    let client = reqwest::Client::new();

    let empty = client
        .post(format!("{}/chat", base))
        .body(chat_body("   "))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);
    let err: Value = empty.json().await.unwrap();
    assert_eq!(err["error"]["code"], "bad_request");

    let garbage = client
        .post(format!("{}/chat", base))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(garbage.status(), 400);
}

#[tokio::test]
async fn test_signed_requests() {
    let secret = b"bridge-secret".to_vec();
    let base = spawn_server(AppState::new(manager(active_llm()), Some(secret.clone()))).await;
    let client = reqwest::Client::new();
    let body = chat_body("hello");

    let unsigned = client
        .post(format!("{}/chat", base))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(unsigned.status(), 401);

    let wrong = client
        .post(format!("{}/chat", base))
        .header(SIGNATURE_HEADER, sign(b"other-secret", body.as_bytes()))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);
    let err: Value = wrong.json().await.unwrap();
    assert_eq!(err["error"]["code"], "unauthorized");

    let signed = client
        .post(format!("{}/chat", base))
        .header(SIGNATURE_HEADER, sign(&secret, body.as_bytes()))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(signed.status(), 200);

    // reads are not signed
    let state = client
        .get(format!("{}/conversations/support/u1", base))
        .send()
        .await
        .unwrap();
    assert_eq!(state.status(), 200);
}

#[tokio::test]
async fn test_failed_turn_answers_with_apology() {
    let llm = ScriptedLlm::from_fn(|_| Err(anyhow::anyhow!("upstream timeout")));
    let base = spawn_server(AppState::new(manager(llm), None)).await;

    let reply: Value = reqwest::Client::new()
        .post(format!("{}/chat", base))
        .body(chat_body("help"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["failed"], true);
    assert_eq!(reply["response"], APOLOGY);
    assert_eq!(reply["state"]["iteration_count"], 0);
}
