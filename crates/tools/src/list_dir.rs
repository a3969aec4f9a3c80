//! Directory listing tool.

use crate::relative_display;
use async_trait::async_trait;
use cairn_core::error::ToolError;
use cairn_core::tool::{Tool, ToolContext, ToolResult};
use cairn_core::value::ToolArguments;

#[derive(Debug, Default)]
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory in the workspace. Directories end with '/'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list, relative to the workspace root (default '.')",
                    "default": "."
                }
            }
        })
    }

    fn filesystem_capable(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _arguments: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let path = ctx.require_path(self.name())?;
        let shown = relative_display(ctx, path);

        let mut reader = match tokio::fs::read_dir(path).await {
            Ok(reader) => reader,
            Err(e) => {
                return Ok(ToolResult::failure(
                    &ctx.call_id,
                    format!("Failed to list {shown}: {e}"),
                ));
            }
        };

        let mut entries = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let mut name = entry.file_name().to_string_lossy().into_owned();
                    if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                        name.push('/');
                    }
                    entries.push(name);
                }
                Ok(None) => break,
                Err(e) => {
                    return Ok(ToolResult::failure(
                        &ctx.call_id,
                        format!("Failed to list {shown}: {e}"),
                    ));
                }
            }
        }
        entries.sort();

        let output = if entries.is_empty() {
            format!("{shown} is empty.")
        } else {
            entries.join("\n")
        };
        Ok(ToolResult::success(&ctx.call_id, output))
    }
}
