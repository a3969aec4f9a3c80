//! File read tool: read a file inside the workspace root.

use crate::relative_display;
use async_trait::async_trait;
use cairn_core::error::ToolError;
use cairn_core::tool::{Tool, ToolContext, ToolResult};
use cairn_core::value::ToolArguments;

/// Largest file returned verbatim; longer content is cut with a marker.
const MAX_READ_BYTES: usize = 256 * 1024;

#[derive(Debug, Default)]
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the workspace. Paths are relative to the workspace root."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read, relative to the workspace root"
                }
            },
            "required": ["path"]
        })
    }

    fn filesystem_capable(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        arguments: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        arguments.require_str("path")?;
        let path = ctx.require_path(self.name())?;

        match tokio::fs::read_to_string(path).await {
            Ok(mut content) => {
                if content.len() > MAX_READ_BYTES {
                    let mut cut = MAX_READ_BYTES;
                    while !content.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    content.truncate(cut);
                    content.push_str("\n[... truncated]");
                }
                Ok(ToolResult::success(&ctx.call_id, content))
            }
            Err(e) => Ok(ToolResult::failure(
                &ctx.call_id,
                format!("Failed to read {}: {e}", relative_display(ctx, path)),
            )),
        }
    }
}
