//! Reasoning service ("oracle") abstraction.
//!
//! The orchestrator only needs one decision per step: answer, or call tools.

mod openrouter;

use async_trait::async_trait;
use thiserror::Error;

use crate::store::Message;
use crate::tools::{ToolInvocation, ToolSpec};

pub use openrouter::OpenRouterOracle;

/// What the oracle wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    FinalAnswer(String),
    /// One or more tool calls, in the order they should be recorded
    ToolRequests(Vec<ToolInvocation>),
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("reasoning service unreachable: {0}")]
    Transport(String),

    #[error("reasoning service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed reasoning service response: {0}")]
    Malformed(String),
}

/// A reasoning service that decides the next step from the conversation.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn reason(&self, history: &[Message], tools: &[ToolSpec]) -> Result<Decision, OracleError>;
}
