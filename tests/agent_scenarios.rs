use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_sandbox::agent::{AgentLimits, Orchestrator, StopReason};
use agent_sandbox::llm::{Decision, Oracle, OracleError};
use agent_sandbox::safety::SafetyFilter;
use agent_sandbox::sandbox::{server, CodeExecutor, RemoteSandbox, Runtime, Sandbox, SandboxLimits};
use agent_sandbox::store::{ConversationStore, InMemoryConversationStore, Message, Role};
use agent_sandbox::tools::{RunCode, ToolInvocation, ToolRegistry, ToolSpec, Weather};
use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

/// Issues one tool call, then answers with the trimmed observation.
struct OneShot {
    tool: &'static str,
    arguments: Value,
    seen_catalog: Mutex<Vec<String>>,
}

impl OneShot {
    fn new(tool: &'static str, arguments: Value) -> Arc<Self> {
        Arc::new(Self {
            tool,
            arguments,
            seen_catalog: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Oracle for OneShot {
    async fn reason(&self, history: &[Message], tools: &[ToolSpec]) -> Result<Decision, OracleError> {
        *self.seen_catalog.lock().unwrap() = tools.iter().map(|t| t.name.clone()).collect();

        match history.last() {
            Some(last) if last.is_tool_result() => {
                Ok(Decision::FinalAnswer(last.content.trim().to_string()))
            }
            _ => Ok(Decision::ToolRequests(vec![ToolInvocation {
                id: "call_1".to_string(),
                name: self.tool.to_string(),
                arguments: self.arguments.clone(),
            }])),
        }
    }
}

/// Never stops asking for the weather.
struct Insistent {
    steps: AtomicUsize,
}

#[async_trait]
impl Oracle for Insistent {
    async fn reason(&self, _history: &[Message], _tools: &[ToolSpec]) -> Result<Decision, OracleError> {
        let n = self.steps.fetch_add(1, Ordering::SeqCst);
        Ok(Decision::ToolRequests(vec![ToolInvocation {
            id: format!("call_{}", n),
            name: "weather".to_string(),
            arguments: json!({ "query": "sf" }),
        }]))
    }
}

fn shell_sandbox() -> Sandbox {
    Sandbox::new(Runtime::shell(), SafetyFilter::javascript(), SandboxLimits::default())
}

fn tools_with(executor: Arc<dyn CodeExecutor>) -> Arc<ToolRegistry> {
    let tools = ToolRegistry::new();
    tools
        .register_tool(RunCode::new(executor, Duration::from_secs(5)))
        .unwrap();
    tools.register_tool(Weather).unwrap();
    Arc::new(tools)
}

fn agent(oracle: Arc<dyn Oracle>, tools: Arc<ToolRegistry>, max_iterations: usize) -> Orchestrator {
    Orchestrator::new(
        oracle,
        tools,
        Arc::new(InMemoryConversationStore::new()),
        AgentLimits {
            max_iterations,
            deadline: Duration::from_secs(30),
        },
    )
}

#[tokio::test]
async fn computes_with_run_code() {
    let oracle = OneShot::new("run_code", json!({ "code": "echo $((15 * 37))" }));
    let agent = agent(oracle.clone(), tools_with(Arc::new(shell_sandbox())), 10);

    let reply = agent.run(Some("math"), "What is 15 * 37?").await.unwrap();

    assert_eq!(reply.content, "555");
    assert_eq!(reply.iterations, 1);
    assert_eq!(reply.stop_reason, StopReason::FinalAnswer);
    assert_eq!(*oracle.seen_catalog.lock().unwrap(), vec!["run_code", "weather"]);
}

#[tokio::test]
async fn computes_with_javascript() {
    let sandbox = Sandbox::new(Runtime::javascript(), SafetyFilter::javascript(), SandboxLimits::default());
    if let Err(e) = sandbox.verify_isolation().await {
        eprintln!("skipping: {}", e);
        return;
    }
    let oracle = OneShot::new("run_code", json!({ "code": "console.log(15 * 37)" }));
    let agent = agent(oracle, tools_with(Arc::new(sandbox)), 10);

    let reply = agent.run(Some("js-math"), "What is 15 * 37?").await.unwrap();

    assert_eq!(reply.content, "555");
    assert_eq!(reply.stop_reason, StopReason::FinalAnswer);
}

#[tokio::test]
async fn answers_weather_question() {
    let oracle = OneShot::new("weather", json!({ "query": "San Francisco" }));
    let agent = agent(oracle, tools_with(Arc::new(shell_sandbox())), 10);

    let reply = agent
        .run(Some("weather"), "What's the weather in San Francisco?")
        .await
        .unwrap();

    assert_eq!(reply.content, "It's 60 degrees and foggy.");

    let history = agent.store().history("weather").await.unwrap();
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Tool, Role::Tool, Role::Assistant]);
}

#[tokio::test]
async fn dangerous_code_is_refused() {
    let oracle = OneShot::new("run_code", json!({ "code": "require('fs').readFileSync('/etc/passwd')" }));
    let agent = agent(oracle, tools_with(Arc::new(shell_sandbox())), 10);

    let reply = agent.run(Some("evil"), "Read /etc/passwd").await.unwrap();

    assert_eq!(reply.content, "Error: Potentially dangerous code detected");
}

#[tokio::test]
async fn stops_at_the_iteration_cap() {
    let oracle = Arc::new(Insistent {
        steps: AtomicUsize::new(0),
    });
    let agent = agent(oracle, tools_with(Arc::new(shell_sandbox())), 5);

    let reply = agent.run(Some("loop"), "Keep checking the weather").await.unwrap();

    assert!(reply.iterations <= 5);
    assert_eq!(reply.stop_reason, StopReason::IterationLimit);
    assert_eq!(reply.content, "Stopped after reaching the tool iteration limit (5).");

    let dispatched = agent
        .store()
        .history("loop")
        .await
        .unwrap()
        .iter()
        .filter(|m| m.is_tool_result())
        .count();
    assert_eq!(dispatched, 5);
}

#[tokio::test]
async fn runs_code_through_remote_sandbox() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(Arc::new(shell_sandbox())))
            .await
            .unwrap();
    });

    let remote = RemoteSandbox::new(&Url::parse(&format!("http://{}/", addr)).unwrap()).unwrap();
    let oracle = OneShot::new("run_code", json!({ "code": "echo $((15 * 37))" }));
    let agent = agent(oracle, tools_with(Arc::new(remote)), 10);

    let reply = agent.run(None, "What is 15 * 37?").await.unwrap();

    assert_eq!(reply.content, "555");
    assert!(!reply.timed_out);
}

#[tokio::test]
async fn threads_accumulate_across_requests() {
    let store = Arc::new(InMemoryConversationStore::new());
    let agent = Orchestrator::new(
        OneShot::new("weather", json!({ "query": "Paris" })),
        tools_with(Arc::new(shell_sandbox())),
        store.clone(),
        AgentLimits::default(),
    );

    agent.run(Some("t"), "Weather in Paris?").await.unwrap();
    agent.run(Some("t"), "And again?").await.unwrap();

    let history = store.history("t").await.unwrap();
    assert_eq!(history.len(), 8);
    assert_eq!(history[4].content, "And again?");
}
