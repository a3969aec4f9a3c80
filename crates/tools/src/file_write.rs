//! File write tool: create or overwrite a file inside the workspace root.

use crate::relative_display;
use async_trait::async_trait;
use cairn_core::error::ToolError;
use cairn_core::tool::{Tool, ToolContext, ToolResult};
use cairn_core::value::ToolArguments;

#[derive(Debug, Default)]
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace. Creates the file (and missing parent \
         directories) if it doesn't exist, overwrites it if it does."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write, relative to the workspace root"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
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
        let content = arguments.require_str("content")?;
        let path = ctx.require_path(self.name())?;
        let shown = relative_display(ctx, path);

        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::failure(
                &ctx.call_id,
                format!("Failed to create directories for {shown}: {e}"),
            ));
        }

        match tokio::fs::write(path, content).await {
            Ok(()) => Ok(ToolResult::success(
                &ctx.call_id,
                format!("Wrote {} bytes to {shown}", content.len()),
            )),
            Err(e) => Ok(ToolResult::failure(
                &ctx.call_id,
                format!("Failed to write {shown}: {e}"),
            )),
        }
    }
}
