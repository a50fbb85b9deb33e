//! API request and response types.

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::agent::{StopReason, TurnLogEntry};

/// Request to send a chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// The user prompt
    #[serde(default)]
    pub prompt: Option<String>,

    /// Conversation thread; a new one is created when omitted
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Final answer for a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Final answer text (or best-effort partial answer on timeout)
    pub content: String,

    /// Thread the exchange was recorded in
    pub thread_id: String,

    /// Number of tool dispatch steps taken
    pub iterations: usize,

    /// Why the loop stopped
    pub stop_reason: StopReason,

    /// True when the request deadline cut the loop short
    pub timed_out: bool,

    /// Tool calls, results and the answer of this request, in order
    pub log: Vec<TurnLogEntry>,
}

/// Error body returned with every non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
