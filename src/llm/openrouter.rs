//! OpenAI-compatible chat completions client (OpenRouter by default).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::{Decision, Oracle, OracleError};
use crate::agent::build_system_prompt;
use crate::config::OracleConfig;
use crate::store::{Message, Role, ToolCallKind};
use crate::tools::{ToolInvocation, ToolSpec};

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded arguments, as the API transmits them
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize)]
struct ToolDefinition {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionDefinition,
}

#[derive(Debug, Serialize)]
struct FunctionDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChatMessage>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// [`Oracle`] backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenRouterOracle {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl std::fmt::Debug for OpenRouterOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterOracle")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenRouterOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let base = config.base_url.as_str().trim_end_matches('/');
        let endpoint = Url::parse(&format!("{}/chat/completions", base))
            .map_err(|e| OracleError::Transport(format!("invalid endpoint: {}", e)))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: config.timeout,
        })
    }

    fn build_request<'a>(&'a self, history: &[Message], tools: &[ToolSpec]) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::text("system", &build_system_prompt(tools)));
        messages.extend(history.iter().map(to_chat_message));

        ChatCompletionRequest {
            model: &self.model,
            messages,
            tools: tools.iter().map(to_tool_definition).collect(),
        }
    }
}

#[async_trait]
impl Oracle for OpenRouterOracle {
    async fn reason(&self, history: &[Message], tools: &[ToolSpec]) -> Result<Decision, OracleError> {
        let request = self.build_request(history, tools);

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, model = %self.model, "Reasoning service returned an error");
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;
        parse_decision(body)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversions
// ─────────────────────────────────────────────────────────────────────────────

fn to_chat_message(message: &Message) -> ChatMessage {
    match (message.role, &message.tool_call) {
        (Role::Tool, Some(call)) if call.kind == ToolCallKind::Invocation => ChatMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: call.id.clone(),
                kind: function_type(),
                function: FunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.to_string(),
                },
            }]),
            tool_call_id: None,
        },
        (Role::Tool, Some(call)) => ChatMessage {
            role: "tool".to_string(),
            content: Some(message.content.clone()),
            tool_calls: None,
            tool_call_id: Some(call.id.clone()),
        },
        // A tool message without a call reference has nothing to pair with.
        (Role::Tool, None) | (Role::User, _) => ChatMessage::text("user", &message.content),
        (Role::Assistant, _) => ChatMessage::text("assistant", &message.content),
    }
}

fn to_tool_definition(spec: &ToolSpec) -> ToolDefinition {
    ToolDefinition {
        kind: "function",
        function: FunctionDefinition {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.input.to_json_schema(),
        },
    }
}

fn parse_decision(response: ChatCompletionResponse) -> Result<Decision, OracleError> {
    let message = response
        .choices
        .into_iter()
        .find_map(|choice| choice.message)
        .ok_or_else(|| OracleError::Malformed("response has no choices".to_string()))?;

    let calls = message.tool_calls.unwrap_or_default();
    if !calls.is_empty() {
        let invocations = calls
            .into_iter()
            .map(|call| {
                let arguments = parse_arguments(&call.function.name, &call.function.arguments)?;
                let id = if call.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    call.id
                };
                Ok(ToolInvocation {
                    id,
                    name: call.function.name,
                    arguments,
                })
            })
            .collect::<Result<Vec<_>, OracleError>>()?;
        return Ok(Decision::ToolRequests(invocations));
    }

    match message.content {
        Some(content) if !content.trim().is_empty() => Ok(Decision::FinalAnswer(content)),
        _ => Err(OracleError::Malformed("response has neither content nor tool calls".to_string())),
    }
}

fn parse_arguments(tool: &str, raw: &str) -> Result<Value, OracleError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
        .map_err(|e| OracleError::Malformed(format!("arguments for {} are not valid JSON: {}", tool, e)))
}
