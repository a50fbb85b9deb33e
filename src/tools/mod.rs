//! Tool registry: named capabilities the oracle can invoke.
//!
//! Tools are registered with a [`ToolSpec`] and a [`ToolHandler`]. The
//! registry validates arguments against each tool's input schema before the
//! handler runs, and [`ToolRegistry::dispatch`] turns every failure into a
//! [`ToolOutput`] so the agent loop only ever sees data.

mod code;
mod schema;
mod weather;

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use code::{RunCode, RUN_CODE_TOOL};
pub use schema::{FieldKind, FieldSpec, InputSchema};
pub use weather::{Weather, WEATHER_TOOL};

/// Name, description and input schema of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input: InputSchema,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input: InputSchema) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input,
        }
    }

    fn check(&self) -> Result<(), ToolError> {
        let valid_name = !self.name.is_empty()
            && self.name.len() <= 64
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_name {
            return Err(ToolError::InvalidSpec {
                reason: format!("tool name '{}' must be 1-64 chars of [A-Za-z0-9_-]", self.name),
            });
        }
        if let Some(field) = self.input.duplicate_field() {
            return Err(ToolError::InvalidSpec {
                reason: format!("tool '{}' declares field '{}' twice", self.name, field),
            });
        }
        Ok(())
    }
}

/// A request from the oracle to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Call identifier pairing the invocation with its result
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Observable result of a tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn text(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Text recorded in the conversation as the tool's observation.
    pub fn render(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => format!("Error: {}", self.stderr),
            (false, false) => format!("{}\n[stderr]\n{}", self.stdout, self.stderr),
        }
    }
}

/// Errors produced by tool registration and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid arguments for {tool}: {reason}")]
    SchemaMismatch { tool: String, reason: String },

    #[error("Tool {tool} failed: {reason}")]
    HandlerFailure { tool: String, reason: String },

    #[error("Tool {name} is already registered")]
    DuplicateTool { name: String },

    #[error("Invalid tool spec: {reason}")]
    InvalidSpec { reason: String },
}

/// Executes a tool with already-validated arguments.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> anyhow::Result<ToolOutput>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ToolOutput>> + Send,
{
    async fn call(&self, args: Value) -> anyhow::Result<ToolOutput> {
        (self)(args).await
    }
}

/// A handler that carries its own spec.
pub trait Tool: ToolHandler {
    fn spec(&self) -> ToolSpec;
}

struct Registered {
    spec: ToolSpec,
    handler: Arc<dyn ToolHandler>,
}

/// Registry of available tools, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<Vec<Registered>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.list().into_iter().map(|s| s.name).collect();
        f.debug_struct("ToolRegistry").field("registered", &names).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `spec`.
    pub fn register(&self, spec: ToolSpec, handler: Arc<dyn ToolHandler>) -> Result<(), ToolError> {
        spec.check()?;
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if tools.iter().any(|t| t.spec.name == spec.name) {
            return Err(ToolError::DuplicateTool { name: spec.name });
        }
        tracing::debug!(tool = %spec.name, "Registered tool");
        tools.push(Registered { spec, handler });
        Ok(())
    }

    /// Register a self-describing tool.
    pub fn register_tool<T>(&self, tool: T) -> Result<(), ToolError>
    where
        T: Tool + 'static,
    {
        let spec = tool.spec();
        self.register(spec, Arc::new(tool))
    }

    /// Specs of all registered tools, in registration order.
    pub fn list(&self) -> Vec<ToolSpec> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools.iter().map(|t| t.spec.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, name: &str) -> Option<(ToolSpec, Arc<dyn ToolHandler>)> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools
            .iter()
            .find(|t| t.spec.name == name)
            .map(|t| (t.spec.clone(), Arc::clone(&t.handler)))
    }

    /// Validate `args` and run the named tool.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<ToolOutput, ToolError> {
        let (spec, handler) = self.lookup(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;

        spec.input
            .validate(&args)
            .map_err(|reason| ToolError::SchemaMismatch {
                tool: name.to_string(),
                reason,
            })?;

        handler.call(args).await.map_err(|e| ToolError::HandlerFailure {
            tool: name.to_string(),
            reason: format!("{:#}", e),
        })
    }

    /// Run an invocation, converting any [`ToolError`] into a failed output.
    pub async fn dispatch(&self, invocation: &ToolInvocation) -> ToolOutput {
        match self.invoke(&invocation.name, invocation.arguments.clone()).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = %invocation.name, call_id = %invocation.id, error = %e, "Tool call failed");
                ToolOutput::failure(e.to_string())
            }
        }
    }
}
