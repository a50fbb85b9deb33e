//! Bounded reason/dispatch loop over a conversation thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{Decision, Oracle};
use crate::store::{ConversationStore, Message, StoreError};
use crate::tools::{ToolInvocation, ToolRegistry};

/// Answer used when the deadline passes before any tool produced output.
const NO_PARTIAL_ANSWER: &str = "The request timed out before an answer was produced.";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    FinalAnswer,
    OracleError,
    IterationLimit,
    Deadline,
}

/// Loop bounds for one request.
#[derive(Debug, Clone)]
pub struct AgentLimits {
    /// Maximum number of dispatch steps
    pub max_iterations: usize,

    /// Overall wall-clock deadline for the request
    pub deadline: Duration,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            deadline: Duration::from_secs(120),
        }
    }
}

/// A single entry in the turn log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnLogEntry {
    /// Timestamp (RFC 3339)
    pub timestamp: String,

    /// Entry type
    pub entry_type: LogEntryType,

    /// Content of the entry
    pub content: String,
}

/// Types of log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    /// Tool is being called
    ToolCall,
    /// Tool returned a result
    ToolResult,
    /// Agent produced final response
    Response,
    /// An error occurred
    Error,
}

/// Outcome of one request.
#[derive(Debug, Clone)]
pub struct Reply {
    pub content: String,
    pub thread_id: String,
    /// Dispatch steps taken
    pub iterations: usize,
    pub timed_out: bool,
    pub stop_reason: StopReason,
    pub log: Vec<TurnLogEntry>,
}

/// Progress that must survive the loop being cancelled at the deadline.
#[derive(Default)]
struct Turn {
    iterations: usize,
    last_observation: Option<String>,
    log: Vec<TurnLogEntry>,
}

impl Turn {
    fn record(&mut self, entry_type: LogEntryType, content: &str) {
        self.log.push(TurnLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            entry_type,
            content: truncate_for_log(content, 1000),
        });
    }
}

/// Drives the oracle and tools for a conversation thread.
pub struct Orchestrator {
    oracle: Arc<dyn Oracle>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn ConversationStore>,
    limits: AgentLimits,
}

impl Orchestrator {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn ConversationStore>,
        limits: AgentLimits,
    ) -> Self {
        Self {
            oracle,
            tools,
            store,
            limits,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Handle one user prompt on `thread_id` (a new thread when `None`).
    pub async fn run(&self, thread_id: Option<&str>, prompt: &str) -> Result<Reply, AgentError> {
        if prompt.trim().is_empty() {
            return Err(AgentError::EmptyPrompt);
        }
        let thread_id = match thread_id {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.limits.deadline;

        self.store.append(&thread_id, Message::user(prompt)).await?;

        let mut turn = Turn::default();
        let outcome = tokio::time::timeout_at(deadline, self.drive(&thread_id, &mut turn)).await;

        let (content, stop_reason, timed_out) = match outcome {
            Ok(result) => {
                let (content, stop_reason) = result?;
                (content, stop_reason, false)
            }
            Err(_) => {
                tracing::warn!(
                    thread_id = %thread_id,
                    iterations = turn.iterations,
                    deadline_ms = self.limits.deadline.as_millis() as u64,
                    "Request deadline exceeded"
                );
                let partial = turn
                    .last_observation
                    .take()
                    .unwrap_or_else(|| NO_PARTIAL_ANSWER.to_string());
                turn.record(LogEntryType::Error, "Request deadline exceeded");
                (partial, StopReason::Deadline, true)
            }
        };

        self.store
            .append(&thread_id, Message::assistant(content.clone()))
            .await?;
        turn.record(LogEntryType::Response, &content);

        tracing::info!(
            thread_id = %thread_id,
            iterations = turn.iterations,
            stop_reason = ?stop_reason,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request finished"
        );

        Ok(Reply {
            content,
            thread_id,
            iterations: turn.iterations,
            timed_out,
            stop_reason,
            log: turn.log,
        })
    }

    async fn drive(&self, thread_id: &str, turn: &mut Turn) -> Result<(String, StopReason), AgentError> {
        let catalog = self.tools.list();

        loop {
            let history = self.store.history(thread_id).await?;

            let calls = match self.oracle.reason(&history, &catalog).await {
                Ok(Decision::FinalAnswer(answer)) => return Ok((answer, StopReason::FinalAnswer)),
                Ok(Decision::ToolRequests(calls)) if calls.is_empty() => {
                    turn.record(LogEntryType::Error, "Oracle requested an empty set of tools");
                    return Ok((
                        "The reasoning service returned an empty tool request.".to_string(),
                        StopReason::OracleError,
                    ));
                }
                Ok(Decision::ToolRequests(calls)) => calls,
                Err(e) => {
                    tracing::error!(thread_id = %thread_id, error = %e, "Oracle call failed");
                    turn.record(LogEntryType::Error, &e.to_string());
                    return Ok((
                        format!("The reasoning service failed: {}", e),
                        StopReason::OracleError,
                    ));
                }
            };

            if turn.iterations >= self.limits.max_iterations {
                tracing::warn!(
                    thread_id = %thread_id,
                    max_iterations = self.limits.max_iterations,
                    "Tool iteration limit reached"
                );
                return Ok((
                    format!(
                        "Stopped after reaching the tool iteration limit ({}).",
                        self.limits.max_iterations
                    ),
                    StopReason::IterationLimit,
                ));
            }

            turn.iterations += 1;
            tracing::debug!(thread_id = %thread_id, iteration = turn.iterations, calls = calls.len(), "Dispatching tools");
            self.dispatch(thread_id, &calls, turn).await?;
        }
    }

    /// Run one step's invocations concurrently and record them in oracle order.
    async fn dispatch(
        &self,
        thread_id: &str,
        calls: &[ToolInvocation],
        turn: &mut Turn,
    ) -> Result<(), AgentError> {
        for call in calls {
            turn.record(
                LogEntryType::ToolCall,
                &format!("Calling tool: {} with args: {}", call.name, call.arguments),
            );
        }

        let outputs = join_all(calls.iter().map(|call| self.tools.dispatch(call))).await;

        let mut messages = Vec::with_capacity(calls.len() * 2);
        for (call, output) in calls.iter().zip(outputs) {
            let observation = output.render();
            turn.record(LogEntryType::ToolResult, &observation);
            messages.push(Message::tool_invocation(&call.id, &call.name, &call.arguments));
            messages.push(Message::tool_result(&call.id, &call.name, observation.clone()));
            turn.last_observation = Some(observation);
        }

        self.store.extend(thread_id, messages).await?;
        Ok(())
    }
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}
