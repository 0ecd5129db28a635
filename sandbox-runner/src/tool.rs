//! Tool-call boundary
//!
//! Exposes the executor to the chat orchestration layer as a callable tool.
//! The orchestrator sees the tool definition and the four result fields,
//! nothing about isolation internals.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use crate::engine::SandboxExecutor;
use crate::sandbox::{SandboxOptions, SandboxResult};

/// Name the model calls the tool by
pub const RUN_CODE_TOOL: &str = "run_typescript_javascript";

/// Deadline applied to tool calls (5 seconds)
pub const TOOL_TIMEOUT_MS: u64 = 5_000;

const RUN_CODE_DESCRIPTION: &str = "\
Execute arbitrary TypeScript or JavaScript code inside a secure, isolated sandbox.

The code is executed in:
- a container running the Bun runtime
- with NO network access
- running as a non-root user
- with a read-only filesystem
- with all Linux capabilities dropped
- and a small writable tmpfs for temporary files

This is useful for evaluating or testing code safely without granting host access.

Add comments that would be useful for the user to understand the code.

You always need to log the result so that you can read the stdout to get the result of your code.

If you use this tool, you MUST include the code you ran in the message you return to the user, \
in a ```typescript code fence.";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Definition advertised to the model
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Arguments of the code tool
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunCodeArgs {
    /// The TypeScript/JavaScript code to execute
    pub code: String,
}

/// The code execution tool
#[derive(Clone)]
pub struct CodeSandboxTool {
    executor: SandboxExecutor,
}

impl CodeSandboxTool {
    pub fn new(executor: SandboxExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &SandboxExecutor {
        &self.executor
    }

    pub fn definition() -> ToolDefinition {
        ToolDefinition {
            name: RUN_CODE_TOOL,
            description: RUN_CODE_DESCRIPTION,
            parameters: json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "The TypeScript/JavaScript code to execute."
                    }
                },
                "required": ["code"],
                "additionalProperties": false
            }),
        }
    }

    /// All tools this service provides
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![Self::definition()]
    }

    /// `execute(code, options?)`: run once with the caller's options.
    pub async fn execute(&self, code: &str, options: Option<SandboxOptions>) -> SandboxResult {
        self.executor.run(code, &options.unwrap_or_default()).await
    }

    /// Dispatch a tool call by name with raw JSON arguments.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<SandboxResult, ToolError> {
        if name != RUN_CODE_TOOL {
            return Err(ToolError::UnknownTool(name.to_string()));
        }

        let args: RunCodeArgs =
            serde_json::from_value(arguments).map_err(|source| ToolError::InvalidArguments {
                tool: name.to_string(),
                source,
            })?;

        info!("Tool call {} ({} bytes of code)", name, args.code.len());
        let options = SandboxOptions::new().with_timeout_ms(TOOL_TIMEOUT_MS);
        Ok(self.executor.run(&args.code, &options).await)
    }
}
