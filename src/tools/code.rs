//! `run_code`: execute a snippet in the sandbox and report its output.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{FieldKind, InputSchema, Tool, ToolHandler, ToolOutput, ToolSpec};
use crate::sandbox::{CodeExecutor, ExecutionStatus};

pub const RUN_CODE_TOOL: &str = "run_code";

const DESCRIPTION: &str = "Execute a JavaScript snippet in an isolated sandbox and return what it prints. \
Use console.log to produce output. Filesystem, module loading and process access are not available.";

/// Code execution tool backed by any [`CodeExecutor`].
pub struct RunCode {
    executor: Arc<dyn CodeExecutor>,
    time_budget: Duration,
}

impl RunCode {
    pub fn new(executor: Arc<dyn CodeExecutor>, time_budget: Duration) -> Self {
        Self {
            executor,
            time_budget,
        }
    }
}

#[async_trait]
impl ToolHandler for RunCode {
    async fn call(&self, args: Value) -> anyhow::Result<ToolOutput> {
        let code = args
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("code must be a string"))?;

        // Transport failures surface as handler failures; execution outcomes
        // (rejection, fault, timeout) are ordinary output.
        let result = self.executor.execute(code, self.time_budget).await?;

        if result.status != ExecutionStatus::Ok {
            tracing::debug!(status = %result.status, "run_code did not complete normally");
        }
        Ok(ToolOutput {
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }
}

impl Tool for RunCode {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            RUN_CODE_TOOL,
            DESCRIPTION,
            InputSchema::new().required("code", FieldKind::String, "Source code to execute"),
        )
    }
}
