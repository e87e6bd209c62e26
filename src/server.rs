//! HTTP API over the workflow engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Run the full workflow, returns a `WorkflowResult` |
//! | `POST` | `/plan` | Plan a query without executing it |
//! | `GET`  | `/sources` | List loaded corpus passages |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every error response has the same shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Workflow failures are not HTTP errors: `/ask` always answers 200 with a
//! `WorkflowResult` whose `errors` list says what went wrong.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use agentic_rag_core::state::WorkflowResult;

use crate::config::Config;
use crate::context::WorkflowContext;
use crate::planner::Plan;
use crate::workflow::{RunOptions, WorkflowEngine};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    ctx: Arc<WorkflowContext>,
    engine: Arc<WorkflowEngine>,
}

impl AppState {
    pub fn new(ctx: Arc<WorkflowContext>, engine: Arc<WorkflowEngine>) -> Self {
        Self { ctx, engine }
    }
}

/// Build the router. Split from [`run_server`] so tests can bind an
/// ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/plan", post(handle_plan))
        .route("/sources", get(handle_sources))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Start the server on `[server].bind` and run until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let ctx = Arc::new(WorkflowContext::from_config(config)?);
    let state = AppState::new(ctx, Arc::new(WorkflowEngine::default()));

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    axum::serve(listener, router(state)).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
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

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
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

// ============ POST /ask ============

/// Request body for `POST /ask`.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub user_context: Option<String>,
    #[serde(default)]
    pub enable_reflection: Option<bool>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

async fn handle_ask(
    State(state): State<AppState>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<WorkflowResult>, AppError> {
    let Json(req) = body?;
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if req.max_iterations == Some(0) {
        return Err(bad_request("max_iterations must be at least 1"));
    }

    let options = RunOptions {
        enable_reflection: req.enable_reflection,
        max_iterations: req.max_iterations,
    };
    let result = state
        .engine
        .run(&state.ctx, &req.query, req.user_context, options)
        .await;
    Ok(Json(result))
}

// ============ POST /plan ============

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub query: String,
    #[serde(default)]
    pub user_context: Option<String>,
}

async fn handle_plan(
    State(state): State<AppState>,
    body: Result<Json<PlanRequest>, JsonRejection>,
) -> Result<Json<Plan>, AppError> {
    let Json(req) = body?;
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let plan = state
        .engine
        .plan(&state.ctx, req.query.trim(), req.user_context.as_deref())
        .await;
    Ok(Json(plan))
}

// ============ GET /sources ============

#[derive(Serialize)]
struct SourceItem {
    id: String,
    source: String,
    title: String,
    chars: usize,
}

#[derive(Serialize)]
struct SourcesResponse {
    sources: Vec<SourceItem>,
}

async fn handle_sources(State(state): State<AppState>) -> Json<SourcesResponse> {
    let sources = state
        .ctx
        .corpus
        .passages()
        .iter()
        .map(|p| SourceItem {
            id: p.id.clone(),
            source: p.source.clone(),
            title: p.display_title().to_string(),
            chars: p.content.chars().count(),
        })
        .collect();
    Json(SourcesResponse { sources })
}
