//! Tool trait: the abstraction over locally executed capabilities.
//!
//! Tools that run on the server implement [`Tool`] and are registered in the
//! [`ToolCatalog`]. Workspaces refer to them through [`ToolReference::Known`];
//! remote clients extend the surface with [`ToolReference::Custom`]
//! definitions the server only forwards.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use crate::value::ToolArguments;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Typed arguments
    #[serde(default)]
    pub arguments: ToolArguments,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Error description when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            call_id: call_id.into(),
            success: false,
            output: format!("Error: {error}"),
            error: Some(error),
        }
    }
}

/// A client-supplied tool the server forwards without implementing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomTool {
    pub definition: ToolDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_example: Option<String>,
}

/// How a workspace exposes a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolReference {
    /// Resolved against the server-side catalog by id.
    Known { id: String },
    /// Defined by a remote client.
    Custom(CustomTool),
}

impl ToolReference {
    pub fn known(id: impl Into<String>) -> Self {
        Self::Known { id: id.into() }
    }

    pub fn custom(definition: ToolDefinition) -> Self {
        Self::Custom(CustomTool {
            definition,
            usage_example: None,
        })
    }

    /// The name the model uses to call this tool.
    pub fn name(&self) -> &str {
        match self {
            Self::Known { id } => id,
            Self::Custom(custom) => &custom.definition.name,
        }
    }
}

/// Execution context the router hands to a local tool.
///
/// `root` and `sandboxed_path` are filled in by the router after the sandbox
/// check; filesystem tools only ever touch `sandboxed_path`.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub call_id: String,
    pub session_id: String,
    pub workspace_id: String,
    pub root: Option<PathBuf>,
    pub sandboxed_path: Option<PathBuf>,
}

impl ToolContext {
    /// The validated target path, or an argument error if the router did
    /// not supply one.
    pub fn require_path(&self, tool_name: &str) -> Result<&PathBuf, ToolError> {
        self.sandboxed_path.as_ref().ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: "no sandboxed path was resolved for this call".into(),
        })
    }
}

/// The core Tool trait for server-side implementations.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Filesystem-capable tools get their `path` argument sandboxed by the
    /// router before `execute` is called.
    fn filesystem_capable(&self) -> bool {
        false
    }

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The server-side catalog of known tool implementations, keyed by id.
#[derive(Clone, Default)]
pub struct ToolCatalog {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tools.contains_key(id)
    }

    /// References to every tool in the catalog, in id order.
    pub fn references(&self) -> Vec<ToolReference> {
        self.tools.keys().map(ToolReference::known).collect()
    }

    /// List all registered tool ids.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl std::fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("tools", &self.names())
            .finish()
    }
}
