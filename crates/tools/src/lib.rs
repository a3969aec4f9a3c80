//! Built-in tool implementations for Cairn.
//!
//! The server ships a closed set of tools. Each variant of [`BuiltinTool`]
//! wraps one implementation and the enum itself implements [`Tool`], so
//! the catalog, router and tests all dispatch through a single
//! `execute(arguments, ctx)` entry point.
//!
//! Filesystem tools never interpret their `path` argument themselves: the
//! router validates it against the workspace root and hands the resolved
//! absolute path over in [`ToolContext::sandboxed_path`].

pub mod file_read;
pub mod file_write;
pub mod list_dir;
pub mod memory_tools;
pub mod notes;

use async_trait::async_trait;
use cairn_core::error::ToolError;
use cairn_core::memory::MemoryStore;
use cairn_core::provider::EmbeddingProvider;
use cairn_core::tool::{Tool, ToolCatalog, ToolContext, ToolResult};
use cairn_core::value::ToolArguments;
use std::path::Path;
use std::sync::Arc;

pub use file_read::ReadFileTool;
pub use file_write::WriteFileTool;
pub use list_dir::ListDirTool;
pub use memory_tools::{LinkMemoriesTool, SaveMemoryTool, SearchMemoryTool};
pub use notes::{EditNoteTool, ReadNoteTool};

/// Every tool the server implements.
pub enum BuiltinTool {
    ReadFile(ReadFileTool),
    WriteFile(WriteFileTool),
    ListDir(ListDirTool),
    SaveMemory(SaveMemoryTool),
    SearchMemory(SearchMemoryTool),
    LinkMemories(LinkMemoriesTool),
    ReadNote(ReadNoteTool),
    EditNote(EditNoteTool),
}

impl BuiltinTool {
    fn inner(&self) -> &dyn Tool {
        match self {
            Self::ReadFile(t) => t,
            Self::WriteFile(t) => t,
            Self::ListDir(t) => t,
            Self::SaveMemory(t) => t,
            Self::SearchMemory(t) => t,
            Self::LinkMemories(t) => t,
            Self::ReadNote(t) => t,
            Self::EditNote(t) => t,
        }
    }
}

#[async_trait]
impl Tool for BuiltinTool {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn description(&self) -> &str {
        self.inner().description()
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.inner().parameters_schema()
    }

    fn filesystem_capable(&self) -> bool {
        self.inner().filesystem_capable()
    }

    async fn execute(
        &self,
        arguments: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        self.inner().execute(arguments, ctx).await
    }
}

/// The full built-in set, backed by `store` and optionally `embedder`.
pub fn builtin_tools(
    store: Arc<dyn MemoryStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
) -> Vec<BuiltinTool> {
    vec![
        BuiltinTool::ReadFile(ReadFileTool),
        BuiltinTool::WriteFile(WriteFileTool),
        BuiltinTool::ListDir(ListDirTool),
        BuiltinTool::SaveMemory(SaveMemoryTool::new(store.clone(), embedder)),
        BuiltinTool::SearchMemory(SearchMemoryTool::new(store.clone())),
        BuiltinTool::LinkMemories(LinkMemoriesTool::new(store.clone())),
        BuiltinTool::ReadNote(ReadNoteTool::new(store.clone())),
        BuiltinTool::EditNote(EditNoteTool::new(store)),
    ]
}

/// A catalog holding every built-in tool.
pub fn builtin_catalog(
    store: Arc<dyn MemoryStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
) -> ToolCatalog {
    let mut catalog = ToolCatalog::new();
    for tool in builtin_tools(store, embedder) {
        catalog.register(Arc::new(tool));
    }
    catalog
}

/// Render `path` relative to the workspace root for messages the model sees.
pub(crate) fn relative_display(ctx: &ToolContext, path: &Path) -> String {
    match ctx.root.as_deref().and_then(|root| path.strip_prefix(root).ok()) {
        Some(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Some(rel) => rel.display().to_string(),
        None => path.display().to_string(),
    }
}

#[cfg(test)]
pub(crate) fn test_context(root: &Path, relative: &str) -> ToolContext {
    let sandboxed = if relative == "." {
        root.to_path_buf()
    } else {
        root.join(relative)
    };
    ToolContext {
        call_id: "call_1".into(),
        session_id: "s1".into(),
        workspace_id: "ws1".into(),
        root: Some(root.to_path_buf()),
        sandboxed_path: Some(sandboxed),
    }
}
