//! HTTP client for a remote sandbox service.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::server::ExecuteRequest;
use super::{CodeExecutor, ExecutionResult, ExecutionStatus, ExecutorError};

/// Extra time allowed on top of the execution budget for transport.
const TRANSPORT_SLACK: Duration = Duration::from_secs(5);

/// Wire form of the response. `status` is optional so that sandboxes which
/// only report `{stdout, stderr}` are still understood.
#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(default)]
    status: Option<ExecutionStatus>,
}

impl From<ExecuteResponse> for ExecutionResult {
    fn from(response: ExecuteResponse) -> Self {
        let status = response.status.unwrap_or_else(|| {
            if response.stdout.is_empty() && !response.stderr.is_empty() {
                ExecutionStatus::RuntimeError
            } else {
                ExecutionStatus::Ok
            }
        });
        Self {
            stdout: response.stdout,
            stderr: response.stderr,
            status,
        }
    }
}

/// [`CodeExecutor`] that forwards code to a sandbox server over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteSandbox {
    client: reqwest::Client,
    execute_url: Url,
    health_url: Url,
}

impl RemoteSandbox {
    /// Create a client for the sandbox at `base_url` (e.g. `http://127.0.0.1:3001`).
    /// A path prefix such as `http://host/sandbox` is kept with or without a
    /// trailing slash.
    pub fn new(base_url: &Url) -> Result<Self, ExecutorError> {
        let base = base_url.as_str().trim_end_matches('/');
        let join = |path: &str| {
            Url::parse(&format!("{}/{}", base, path))
                .map_err(|e| ExecutorError::Protocol(format!("invalid sandbox url: {}", e)))
        };
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ExecutorError::Protocol(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            execute_url: join("execute")?,
            health_url: join("health")?,
        })
    }

    /// Check that the sandbox answers its liveness probe.
    pub async fn health(&self) -> Result<(), ExecutorError> {
        let response = self
            .client
            .get(self.health_url.clone())
            .timeout(TRANSPORT_SLACK)
            .send()
            .await
            .map_err(|e| ExecutorError::Unreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecutorError::Status {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CodeExecutor for RemoteSandbox {
    async fn execute(&self, code: &str, time_budget: Duration) -> Result<ExecutionResult, ExecutorError> {
        let request = ExecuteRequest {
            code: code.to_string(),
            timeout_ms: Some(time_budget.as_millis() as u64),
        };

        let response = self
            .client
            .post(self.execute_url.clone())
            .json(&request)
            .timeout(time_budget + TRANSPORT_SLACK)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %self.execute_url, error = %e, "Sandbox request failed");
                ExecutorError::Unreachable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExecutorError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: ExecuteResponse = response
            .json()
            .await
            .map_err(|e| ExecutorError::Protocol(e.to_string()))?;
        Ok(body.into())
    }
}
