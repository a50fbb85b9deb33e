//! HTTP API for the agent.
//!
//! ## Endpoints
//!
//! - `POST /chat` - Send a prompt, get the agent's final answer
//! - `GET /threads/:thread_id/messages` - Inspect a conversation thread
//! - `GET /health` - Liveness probe

pub mod types;

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::{AgentError, AgentLimits, Orchestrator};
use crate::config::{Config, SandboxConfig};
use crate::llm::OpenRouterOracle;
use crate::sandbox::{CodeExecutor, RemoteSandbox, Sandbox};
use crate::store::{InMemoryConversationStore, Message, StoreError};
use crate::tools::{RunCode, ToolRegistry, Weather};

use types::{error_response, ChatRequest, ChatResponse, ErrorResponse, HealthResponse};

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Shared application state.
pub struct AppState {
    pub orchestrator: Orchestrator,
}

/// Build the chat router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/threads/:thread_id/messages", get(thread_messages))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Register the built-in tools. Code runs in-process unless a sandbox URL is configured.
pub async fn build_tools(config: &Config) -> anyhow::Result<ToolRegistry> {
    let executor: Arc<dyn CodeExecutor> = match &config.sandbox_url {
        Some(url) => {
            tracing::info!(sandbox_url = %url, "Using remote sandbox");
            Arc::new(RemoteSandbox::new(url)?)
        }
        None => {
            let sandbox = Sandbox::from_config(&SandboxConfig::from_env()?);
            sandbox.verify_isolation().await?;
            tracing::info!(interpreter = ?sandbox.runtime().argv(), "Using in-process sandbox");
            Arc::new(sandbox)
        }
    };

    let tools = ToolRegistry::new();
    tools.register_tool(RunCode::new(executor, config.execution_timeout))?;
    tools.register_tool(Weather)?;
    Ok(tools)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let oracle = OpenRouterOracle::new(&config.oracle)?;
    let tools = build_tools(&config).await?;
    let limits = AgentLimits {
        max_iterations: config.max_iterations,
        deadline: config.request_timeout,
    };

    let state = Arc::new(AppState {
        orchestrator: Orchestrator::new(
            Arc::new(oracle),
            Arc::new(tools),
            Arc::new(InMemoryConversationStore::new()),
            limits,
        ),
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, model = %config.oracle.model, "Chat server listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| error_response(StatusCode::BAD_REQUEST, e.body_text()))?;

    let prompt = req
        .prompt
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "prompt is required"))?;

    let reply = state
        .orchestrator
        .run(req.thread_id.as_deref(), &prompt)
        .await
        .map_err(|e| {
            let status = match &e {
                AgentError::EmptyPrompt | AgentError::Store(StoreError::InvalidThreadId(_)) => {
                    StatusCode::BAD_REQUEST
                }
            };
            tracing::warn!(error = %e, "Chat request rejected");
            error_response(status, e.to_string())
        })?;

    tracing::debug!(thread_id = %reply.thread_id, log_entries = reply.log.len(), "Chat reply ready");

    Ok(Json(ChatResponse {
        content: reply.content,
        thread_id: reply.thread_id,
        iterations: reply.iterations,
        stop_reason: reply.stop_reason,
        timed_out: reply.timed_out,
        log: reply.log,
    }))
}

async fn thread_messages(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let store = state.orchestrator.store();
    let known = store
        .thread_ids()
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if !known.contains(&thread_id) {
        return Err(error_response(StatusCode::NOT_FOUND, format!("thread {} not found", thread_id)));
    }

    let messages = store
        .history(&thread_id)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(messages))
}
