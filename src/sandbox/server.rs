//! Sandbox RPC service.
//!
//! - `POST /execute` `{code, timeout_ms?}` → `{stdout, stderr, status}`
//! - `GET /health` → `{status, version}`
//!
//! Every well-formed request gets exactly one [`ExecutionResult`]; execution
//! outcomes are never mapped to HTTP errors.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::api::types::{error_response, ErrorResponse, HealthResponse};
use crate::config::SandboxConfig;

use super::{ExecutionResult, Sandbox};

/// Body of `POST /execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,

    /// Requested budget; capped by the server's configured limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Build the RPC router around a sandbox.
pub fn router(sandbox: Arc<Sandbox>) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(sandbox)
}

/// Bind and serve the sandbox RPC service until the process exits.
pub async fn serve(config: SandboxConfig) -> anyhow::Result<()> {
    let sandbox = Sandbox::from_config(&config);
    sandbox.verify_isolation().await?;

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        interpreter = ?sandbox.runtime().argv(),
        budget_ms = sandbox.limits().time_budget.as_millis() as u64,
        "Sandbox server listening"
    );

    axum::serve(listener, router(Arc::new(sandbox))).await?;
    Ok(())
}

async fn execute(
    State(sandbox): State<Arc<Sandbox>>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecutionResult>, (StatusCode, Json<ErrorResponse>)> {
    let Json(req) = payload.map_err(|e| error_response(StatusCode::BAD_REQUEST, e.body_text()))?;

    let ceiling = sandbox.limits().time_budget;
    let budget = req
        .timeout_ms
        .map(Duration::from_millis)
        .map_or(ceiling, |requested| requested.min(ceiling));

    tracing::debug!(code_len = req.code.len(), budget_ms = budget.as_millis() as u64, "Execute request");
    Ok(Json(sandbox.execute(&req.code, budget).await))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::SafetyFilter;
    use crate::sandbox::{ExecutionStatus, Runtime, SandboxLimits};

    async fn spawn_server() -> String {
        let sandbox = Sandbox::new(Runtime::shell(), SafetyFilter::javascript(), SandboxLimits::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(Arc::new(sandbox))).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn execute_returns_structured_result() {
        let base = spawn_server().await;
        let result: ExecutionResult = reqwest::Client::new()
            .post(format!("{}/execute", base))
            .json(&serde_json::json!({ "code": "echo $((15 * 37))" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Ok);
        assert_eq!(result.stdout, "555\n");
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_with_error_json() {
        let base = spawn_server().await;
        let response = reqwest::Client::new()
            .post(format!("{}/execute", base))
            .json(&serde_json::json!({ "source": "echo hi" }))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        let body: serde_json::Value = response.json().await.unwrap();
        assert!(body["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let base = spawn_server().await;
        let body: serde_json::Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }
}
