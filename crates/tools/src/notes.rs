//! Note tools: read and edit durable instruction documents.

use async_trait::async_trait;
use cairn_core::error::ToolError;
use cairn_core::memory::{MemoryStore, Note};
use cairn_core::tool::{Tool, ToolContext, ToolResult};
use cairn_core::value::ToolArguments;
use std::sync::Arc;

pub struct ReadNoteTool {
    store: Arc<dyn MemoryStore>,
}

impl ReadNoteTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ReadNoteTool {
    fn name(&self) -> &str {
        "read_note"
    }

    fn description(&self) -> &str {
        "Read a note (a durable instruction or project document) by name."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Name of the note" }
            },
            "required": ["name"]
        })
    }

    async fn execute(
        &self,
        arguments: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let name = arguments.require_str("name")?;
        match self.store.get_note(name).await {
            Ok(Some(note)) => Ok(ToolResult::success(&ctx.call_id, note.content)),
            Ok(None) => Ok(ToolResult::failure(&ctx.call_id, format!("No note named '{name}'"))),
            Err(e) => Ok(ToolResult::failure(&ctx.call_id, e.to_string())),
        }
    }
}

/// Replaces a note's content, creating the note if it does not exist.
/// Read-only notes are refused.
pub struct EditNoteTool {
    store: Arc<dyn MemoryStore>,
}

impl EditNoteTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for EditNoteTool {
    fn name(&self) -> &str {
        "edit_note"
    }

    fn description(&self) -> &str {
        "Replace the content of a note, creating it if needed. Read-only notes cannot be edited."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Name of the note" },
                "content": { "type": "string", "description": "New content" }
            },
            "required": ["name", "content"]
        })
    }

    async fn execute(
        &self,
        arguments: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let name = arguments.require_str("name")?;
        let content = arguments.require_str("content")?;

        let note = match self.store.get_note(name).await {
            Ok(Some(existing)) if existing.is_readonly => {
                return Err(ToolError::PermissionDenied {
                    tool_name: self.name().into(),
                    reason: format!("note '{name}' is read-only"),
                });
            }
            Ok(Some(mut existing)) => {
                existing.content = content.to_string();
                existing
            }
            Ok(None) => Note::new(name, content),
            Err(e) => return Ok(ToolResult::failure(&ctx.call_id, e.to_string())),
        };

        match self.store.upsert_note(note).await {
            Ok(_) => Ok(ToolResult::success(&ctx.call_id, format!("Updated note '{name}'"))),
            Err(e) => Ok(ToolResult::failure(&ctx.call_id, e.to_string())),
        }
    }
}
