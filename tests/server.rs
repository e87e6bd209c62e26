use std::net::SocketAddr;
use std::sync::Arc;

use agentic_rag::config::{RetrievalConfig, WorkflowConfig};
use agentic_rag::context::WorkflowContext;
use agentic_rag::embedding::DisabledEmbedder;
use agentic_rag::llm::DisabledModel;
use agentic_rag::server::{router, AppState};
use agentic_rag::workflow::WorkflowEngine;
use agentic_rag_core::index::{InMemoryCorpus, Passage, DEFAULT_EMBED_BATCH_SIZE};
use serde_json::{json, Value};

async fn spawn_server() -> SocketAddr {
    let corpus = Arc::new(InMemoryCorpus::new(vec![Passage::new(
        "loans.md",
        "loans.md",
        "Bridging loan rates start at 0.75% per month.",
    )
    .with_title("Loans")]));
    let ctx = WorkflowContext::new(
        Arc::new(DisabledModel),
        corpus,
        Arc::new(DisabledEmbedder),
        DEFAULT_EMBED_BATCH_SIZE,
        &RetrievalConfig::default(),
        WorkflowConfig::default(),
    )
    .unwrap();
    let app = router(AppState::new(
        Arc::new(ctx),
        Arc::new(WorkflowEngine::default()),
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_health() {
    let addr = spawn_server().await;
    let body: Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_ask_returns_workflow_result() {
    let addr = spawn_server().await;
    let resp = reqwest::Client::new()
        .post(format!("http://{}/ask", addr))
        .json(&json!({"query": "bridging loan rates", "user_context": "landlord"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["query"], "bridging loan rates");
    assert_eq!(body["workflow_version"], "2.0");
    assert_eq!(body["confidence"], json!(0.0));
    assert!(!body["answer"].as_str().unwrap().is_empty());
    assert_eq!(body["processing_info"]["tasks_completed"], 1);
    assert!(body["errors"].as_array().unwrap().len() >= 2);
}

#[tokio::test]
async fn test_ask_rejects_bad_requests() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let empty = client
        .post(format!("http://{}/ask", addr))
        .json(&json!({"query": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);
    let body: Value = empty.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "query must not be empty");

    let missing = client
        .post(format!("http://{}/ask", addr))
        .json(&json!({"question": "rates?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 400);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let zero = client
        .post(format!("http://{}/ask", addr))
        .json(&json!({"query": "rates", "max_iterations": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(zero.status(), 400);
}

#[tokio::test]
async fn test_plan_and_sources() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let plan: Value = client
        .post(format!("http://{}/plan", addr))
        .json(&json!({"query": "bridging loan rates"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tasks = plan["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["task_type"], "retrieval");
    assert_eq!(tasks[0]["priority"], 1);
    assert!(plan["error"].as_str().unwrap().starts_with("planning failed"));

    let sources: Value = client
        .get(format!("http://{}/sources", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sources["sources"][0]["source"], "loans.md");
    assert_eq!(sources["sources"][0]["title"], "Loans");
}
