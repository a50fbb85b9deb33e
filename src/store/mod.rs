//! Conversation store: per-thread, append-only message history.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use memory::InMemoryConversationStore;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Whether a tool message records the request or its observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallKind {
    Invocation,
    Result,
}

/// Links a tool message to the call it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    pub kind: ToolCallKind,
}

/// One entry in a thread. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRef>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), None)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into(), None)
    }

    /// Record of a tool request; the content is the serialized arguments.
    pub fn tool_invocation(id: &str, name: &str, arguments: &Value) -> Self {
        Self::new(
            Role::Tool,
            arguments.to_string(),
            Some(ToolCallRef {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.clone(),
                kind: ToolCallKind::Invocation,
            }),
        )
    }

    /// Observation returned by a tool.
    pub fn tool_result(id: &str, name: &str, output: impl Into<String>) -> Self {
        Self::new(
            Role::Tool,
            output.into(),
            Some(ToolCallRef {
                id: id.to_string(),
                name: name.to_string(),
                arguments: Value::Null,
                kind: ToolCallKind::Result,
            }),
        )
    }

    fn new(role: Role, content: String, tool_call: Option<ToolCallRef>) -> Self {
        Self {
            role,
            content,
            tool_call,
            created_at: Utc::now(),
        }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(&self.tool_call, Some(call) if call.kind == ToolCallKind::Result)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid thread id: {0}")]
    InvalidThreadId(String),
}

/// Storage for conversation threads.
///
/// Appends to one thread are linearizable; operations on different threads
/// do not block each other.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a message to the thread, creating the thread if needed.
    async fn append(&self, thread_id: &str, message: Message) -> Result<(), StoreError>;

    /// Append several messages so that no other write lands between them.
    async fn extend(&self, thread_id: &str, messages: Vec<Message>) -> Result<(), StoreError>;

    /// Ordered snapshot of the thread; empty (and created) for an unseen id.
    async fn history(&self, thread_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Ids of all known threads, sorted.
    async fn thread_ids(&self) -> Result<Vec<String>, StoreError>;
}

pub(crate) fn check_thread_id(thread_id: &str) -> Result<(), StoreError> {
    if thread_id.trim().is_empty() || thread_id.len() > 128 {
        return Err(StoreError::InvalidThreadId(thread_id.to_string()));
    }
    Ok(())
}
