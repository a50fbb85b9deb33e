//! Execution sandbox for untrusted code.
//!
//! Every execution runs in a fresh child process with a cleared environment,
//! a private scratch directory, its own process group and Unix resource
//! limits. Output is captured into invocation-local buffers and every path
//! (rejection, fault, timeout) produces an [`ExecutionResult`].
//!
//! Host access is confined either by Node's permission model (the default
//! `node --permission -e`) or by an isolation wrapper such as `bwrap`.
//! [`Sandbox::verify_isolation`] refuses any other runtime at startup.
//!
//! The sandbox can be used in-process through [`Sandbox`] or over HTTP via
//! [`server`] and [`client::RemoteSandbox`]; both implement [`CodeExecutor`].

mod capture;
pub mod client;
mod process;
mod runtime;
pub mod server;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::SandboxConfig;
use crate::safety::{SafetyFilter, SafetyVerdict};

pub use client::RemoteSandbox;
pub use runtime::Runtime;

/// Terminal outcome of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Code ran to completion with a zero exit status
    Ok,
    /// The safety filter refused the code; nothing ran
    SafetyRejected,
    /// The code faulted (non-zero exit, signal, or failed to start)
    RuntimeError,
    /// The wall-clock budget elapsed and the process was killed
    Timeout,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::SafetyRejected => write!(f, "safety_rejected"),
            Self::RuntimeError => write!(f, "runtime_error"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Captured output and status of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub status: ExecutionStatus,
}

impl ExecutionResult {
    pub fn safety_rejected(reason: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: reason.into(),
            status: ExecutionStatus::SafetyRejected,
        }
    }

    pub fn runtime_error(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            status: ExecutionStatus::RuntimeError,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ExecutionStatus::Ok
    }
}

/// Resource bounds applied to each execution.
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    /// Default wall-clock budget (also the ceiling for remote requests)
    pub time_budget: Duration,
    /// Per-stream capture ceiling in bytes
    pub max_output_bytes: usize,
    /// `RLIMIT_NOFILE` for the child
    pub max_open_files: u64,
    /// `RLIMIT_FSIZE` for the child
    pub max_file_bytes: u64,
    /// `RLIMIT_AS` for the child; unset by default since JIT runtimes reserve
    /// large virtual ranges up front
    pub max_memory_bytes: Option<u64>,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(5),
            max_output_bytes: 64 * 1024,
            max_open_files: 128,
            max_file_bytes: 1024 * 1024,
            max_memory_bytes: None,
        }
    }
}

/// Failure to obtain an [`ExecutionResult`] at all (e.g. the remote sandbox
/// is unreachable). Execution outcomes themselves are never errors.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("sandbox unreachable: {0}")]
    Unreachable(String),

    #[error("sandbox returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid sandbox response: {0}")]
    Protocol(String),
}

/// Why a sandbox refuses to serve.
#[derive(Debug, Error)]
pub enum IsolationError {
    #[error("interpreter '{program}' has no isolation; use `node --permission` or set SANDBOX_WRAPPER")]
    Unconfined { program: String },

    #[error("interpreter '{program}' did not start with its permission model: {detail}")]
    PermissionModelUnavailable { program: String, detail: String },
}

/// Code run at startup to confirm the Node permission model is active.
const PERMISSION_CHECK: &str = "console.log(['fs.read', 'fs.write', 'child', 'worker']\
.every((scope) => !process.permission.has(scope)))";

/// Something that can run code and report an [`ExecutionResult`].
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, code: &str, time_budget: Duration) -> Result<ExecutionResult, ExecutorError>;
}

/// In-process sandbox: safety filter, then an isolated child process.
#[derive(Debug, Clone)]
pub struct Sandbox {
    runtime: Runtime,
    filter: SafetyFilter,
    limits: SandboxLimits,
    permits: Arc<Semaphore>,
}

impl Sandbox {
    pub fn new(runtime: Runtime, filter: SafetyFilter, limits: SandboxLimits) -> Self {
        Self {
            runtime,
            filter,
            limits,
            permits: Arc::new(Semaphore::new(4)),
        }
    }

    /// Sandbox described by environment configuration, with the JavaScript denylist.
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(config.runtime.clone(), SafetyFilter::javascript(), config.limits.clone())
            .with_max_concurrency(config.max_concurrency)
    }

    /// Bound the number of executions running at once.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
        self
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Check that untrusted code will run confined before accepting any.
    ///
    /// A wrapper is trusted as configured. A Node runtime must start with its
    /// permission model active and deny filesystem and process access.
    pub async fn verify_isolation(&self) -> Result<(), IsolationError> {
        if self.runtime.has_wrapper() {
            return Ok(());
        }
        if !self.runtime.uses_node_permissions() {
            return Err(IsolationError::Unconfined {
                program: self.runtime.program().to_string(),
            });
        }

        let result =
            process::run_isolated(&self.runtime, PERMISSION_CHECK, &self.limits, self.limits.time_budget).await;
        if result.is_ok() && result.stdout.trim() == "true" {
            tracing::debug!(program = %self.runtime.program(), "Node permission model active");
            return Ok(());
        }

        let detail = match result.stderr.lines().find(|line| !line.trim().is_empty()) {
            Some(line) => line.trim().to_string(),
            None => format!("unexpected output {:?}", result.stdout.trim()),
        };
        Err(IsolationError::PermissionModelUnavailable {
            program: self.runtime.program().to_string(),
            detail,
        })
    }

    /// Run `code` within `time_budget`. Never fails; every outcome is encoded
    /// in the returned status.
    pub async fn execute(&self, code: &str, time_budget: Duration) -> ExecutionResult {
        let started = Instant::now();

        if let SafetyVerdict::Rejected { reason, rule } = self.filter.check(code) {
            tracing::info!(rule = %rule, "Execution refused by safety filter");
            return ExecutionResult::safety_rejected(reason);
        }

        // Waiting for a slot counts against the budget.
        let permit = match tokio::time::timeout(time_budget, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return ExecutionResult::runtime_error("", "Sandbox is shutting down");
            }
            Err(_) => {
                return ExecutionResult {
                    stdout: String::new(),
                    stderr: format!(
                        "Execution timed out after {} ms waiting for a free sandbox slot",
                        time_budget.as_millis()
                    ),
                    status: ExecutionStatus::Timeout,
                };
            }
        };

        let remaining = time_budget.saturating_sub(started.elapsed());
        let result = process::run_isolated(&self.runtime, code, &self.limits, remaining).await;
        drop(permit);

        tracing::info!(
            status = %result.status,
            runtime = %self.runtime.program(),
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Code execution finished"
        );

        result
    }
}

#[async_trait]
impl CodeExecutor for Sandbox {
    async fn execute(&self, code: &str, time_budget: Duration) -> Result<ExecutionResult, ExecutorError> {
        Ok(Sandbox::execute(self, code, time_budget).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_sandbox() -> Sandbox {
        Sandbox::new(Runtime::shell(), SafetyFilter::javascript(), SandboxLimits::default())
    }

    /// Node sandbox, or `None` when no Node with a permission model is installed.
    async fn node_sandbox(filter: SafetyFilter) -> Option<Sandbox> {
        let sandbox = Sandbox::new(Runtime::javascript(), filter, SandboxLimits::default());
        match sandbox.verify_isolation().await {
            Ok(()) => Some(sandbox),
            Err(e) => {
                eprintln!("skipping: {}", e);
                None
            }
        }
    }

    const BUDGET: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn ok_output_is_concatenation_of_writes() {
        let sandbox = shell_sandbox();
        let result = sandbox.execute("printf 'a'; printf 'b\\n'; echo c", BUDGET).await;
        assert_eq!(result.status, ExecutionStatus::Ok);
        assert_eq!(result.stdout, "ab\nc\n");
        assert_eq!(result.stderr, "");
    }

    #[tokio::test]
    async fn stderr_is_captured_separately() {
        let sandbox = shell_sandbox();
        let result = sandbox.execute("echo out; echo err 1>&2", BUDGET).await;
        assert!(result.is_ok());
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
    }

    #[tokio::test]
    async fn rejected_code_never_runs() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let code = format!("touch {} # eval('x')", marker.display());

        let result = shell_sandbox().execute(&code, BUDGET).await;

        assert_eq!(result.status, ExecutionStatus::SafetyRejected);
        assert_eq!(result.stdout, "");
        assert_eq!(result.stderr, "Potentially dangerous code detected");
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn fault_keeps_partial_stdout() {
        let result = shell_sandbox().execute("echo before; exit 3", BUDGET).await;
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        assert_eq!(result.stdout, "before\n");
        assert!(result.stderr.contains("exited with code 3"), "stderr: {}", result.stderr);
    }

    #[tokio::test]
    async fn timeout_is_enforced_and_sandbox_is_reusable() {
        let sandbox = shell_sandbox();
        let budget = Duration::from_millis(300);

        let started = Instant::now();
        let result = sandbox.execute("echo started; sleep 10", budget).await;
        let elapsed = started.elapsed();

        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert_eq!(result.stdout, "started\n");
        assert!(result.stderr.contains("timed out"), "stderr: {}", result.stderr);
        assert!(elapsed < budget + Duration::from_secs(2), "took {:?}", elapsed);

        let next = sandbox.execute("echo again", BUDGET).await;
        assert_eq!(next.status, ExecutionStatus::Ok);
        assert_eq!(next.stdout, "again\n");
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_runtime_error() {
        let sandbox = Sandbox::new(
            Runtime::new("definitely-not-an-interpreter", vec!["-e".to_string()]),
            SafetyFilter::javascript(),
            SandboxLimits::default(),
        );
        let result = sandbox.execute("1", BUDGET).await;
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        assert!(result.stderr.contains("Failed to start"), "stderr: {}", result.stderr);
    }

    #[tokio::test]
    async fn environment_is_cleared() {
        std::env::set_var("AGENT_SANDBOX_SECRET_FOR_TEST", "leak");
        let result = shell_sandbox()
            .execute("echo \"[$AGENT_SANDBOX_SECRET_FOR_TEST]\"", BUDGET)
            .await;
        assert!(result.is_ok());
        assert_eq!(result.stdout, "[]\n");
    }

    #[tokio::test]
    async fn concurrent_executions_do_not_share_output() {
        let sandbox = Arc::new(shell_sandbox().with_max_concurrency(8));
        let runs = (0..8).map(|i| {
            let sandbox = Arc::clone(&sandbox);
            async move { (i, sandbox.execute(&format!("echo run-{}", i), BUDGET).await) }
        });

        for (i, result) in futures::future::join_all(runs).await {
            assert!(result.is_ok());
            assert_eq!(result.stdout, format!("run-{}\n", i));
        }
    }

    #[tokio::test]
    async fn runtime_without_isolation_is_refused() {
        let err = shell_sandbox().verify_isolation().await.unwrap_err();
        assert!(matches!(err, IsolationError::Unconfined { program } if program == "sh"));

        let unflagged = Sandbox::new(
            Runtime::new("node", vec!["-e".to_string()]),
            SafetyFilter::javascript(),
            SandboxLimits::default(),
        );
        assert!(matches!(
            unflagged.verify_isolation().await,
            Err(IsolationError::Unconfined { .. })
        ));
    }

    #[tokio::test]
    async fn wrapped_runtime_is_accepted() {
        let sandbox = Sandbox::new(
            Runtime::shell().with_wrapper(vec!["env".to_string()]),
            SafetyFilter::javascript(),
            SandboxLimits::default(),
        );
        sandbox.verify_isolation().await.unwrap();

        let result = sandbox.execute("echo wrapped", BUDGET).await;
        assert_eq!(result.stdout, "wrapped\n");
    }

    #[tokio::test]
    async fn javascript_cannot_reach_the_host_filesystem() {
        // No denylist, so only the runtime stands between the code and the host.
        let Some(sandbox) = node_sandbox(SafetyFilter::with_rules(Vec::new())).await else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("escaped");
        let code = format!(
            "const m = module.constructor._load('f' + 's');\n\
             try {{ console.log(m.readFileSync('/etc/passwd', 'utf8').split('\\n')[0]); }} catch (e) {{ console.log(e.code); }}\n\
             try {{ m.writeFileSync({:?}, 'x'); console.log('wrote'); }} catch (e) {{ console.log(e.code); }}",
            marker.display().to_string()
        );

        let result = sandbox.execute(&code, BUDGET).await;

        assert_eq!(result.status, ExecutionStatus::Ok, "stderr: {}", result.stderr);
        assert_eq!(result.stdout, "ERR_ACCESS_DENIED\nERR_ACCESS_DENIED\n");
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn javascript_output_and_faults() {
        let Some(sandbox) = node_sandbox(SafetyFilter::javascript()).await else {
            return;
        };

        let ok = sandbox.execute("console.log(15 * 37)", BUDGET).await;
        assert_eq!(ok.status, ExecutionStatus::Ok, "stderr: {}", ok.stderr);
        assert_eq!(ok.stdout, "555\n");

        let fault = sandbox
            .execute("console.log('before'); notDefined();", BUDGET)
            .await;
        assert_eq!(fault.status, ExecutionStatus::RuntimeError);
        assert_eq!(fault.stdout, "before\n");
        assert!(fault.stderr.contains("ReferenceError"), "stderr: {}", fault.stderr);
        assert!(fault.stderr.contains("exited with code 1"), "stderr: {}", fault.stderr);
    }

    #[tokio::test]
    async fn javascript_timeout_keeps_partial_output() {
        let Some(sandbox) = node_sandbox(SafetyFilter::javascript()).await else {
            return;
        };
        let budget = Duration::from_millis(1500);

        let started = Instant::now();
        let result = sandbox.execute("console.log('started'); while (true) {}", budget).await;

        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert_eq!(result.stdout, "started\n");
        assert!(started.elapsed() < budget + Duration::from_secs(2), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn output_is_capped() {
        let limits = SandboxLimits {
            max_output_bytes: 16,
            ..SandboxLimits::default()
        };
        let sandbox = Sandbox::new(Runtime::shell(), SafetyFilter::javascript(), limits);
        let result = sandbox
            .execute("i=0; while [ $i -lt 100 ]; do echo line-$i; i=$((i+1)); done", BUDGET)
            .await;
        assert!(result.is_ok());
        assert!(result.stdout.starts_with("line-0\nline-1\nli"));
        assert!(result.stdout.ends_with("[output truncated]"));
    }
}
