//! Per-session tool registry.
//!
//! Built from a session's workspaces at snapshot time. Known references
//! resolve against the server [`ToolCatalog`]; custom references pass their
//! client-supplied definition through untouched.

use cairn_core::provider::ToolDefinition;
use cairn_core::tool::{Tool, ToolCatalog, ToolReference};
use cairn_core::workspace::{HostType, WorkspaceReference};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// A tool as exposed by one workspace.
#[derive(Clone)]
pub struct RegisteredTool {
    /// Provenance: the workspace exposing it
    pub workspace_id: String,
    pub host_type: HostType,
    pub definition: ToolDefinition,
    /// The server implementation, for known tools in local workspaces
    pub local: Option<Arc<dyn Tool>>,
}

impl RegisteredTool {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn filesystem_capable(&self) -> bool {
        self.local.as_ref().is_some_and(|t| t.filesystem_capable())
    }
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("workspace_id", &self.workspace_id)
            .field("host_type", &self.host_type)
            .field("name", &self.definition.name)
            .field("local", &self.local.is_some())
            .finish()
    }
}

/// Every tool visible to one session, grouped by workspace in resolution
/// order (primary first, then attached in attachment order).
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    entries: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn build(catalog: &ToolCatalog, workspaces: &[WorkspaceReference]) -> Self {
        let entries = workspaces
            .iter()
            .flat_map(|ws| Self::tools_for(catalog, ws))
            .collect();
        Self { entries }
    }

    /// Resolve one workspace's references into registered tools.
    ///
    /// Known ids missing from the catalog are skipped. Client workspaces
    /// never get a local implementation even for known ids.
    pub fn tools_for(catalog: &ToolCatalog, workspace: &WorkspaceReference) -> Vec<RegisteredTool> {
        workspace
            .tools
            .iter()
            .filter_map(|reference| {
                let (definition, local) = match reference {
                    ToolReference::Known { id } => match catalog.get(id) {
                        Some(tool) => (tool.to_definition(), Some(tool)),
                        None => {
                            warn!(tool = %id, workspace_id = %workspace.id, "Unknown tool id in workspace");
                            return None;
                        }
                    },
                    ToolReference::Custom(custom) => (custom.definition.clone(), None),
                };
                Some(RegisteredTool {
                    workspace_id: workspace.id.clone(),
                    host_type: workspace.host_type,
                    definition,
                    local: local.filter(|_| workspace.host_type.is_local()),
                })
            })
            .collect()
    }

    /// Definitions to send to the model: the union across workspaces,
    /// first occurrence of each name wins.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|t| seen.insert(t.name().to_string()))
            .map(|t| t.definition.clone())
            .collect()
    }

    /// The tool `name` as exposed by `workspace_id`.
    pub fn find(&self, workspace_id: &str, name: &str) -> Option<&RegisteredTool> {
        self.entries
            .iter()
            .find(|t| t.workspace_id == workspace_id && t.name() == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cairn_core::error::ToolError;
    use cairn_core::tool::{ToolContext, ToolResult};
    use cairn_core::value::ToolArguments;
    use cairn_core::workspace::TrustLevel;
    use std::path::PathBuf;

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            _arguments: &ToolArguments,
            ctx: &ToolContext,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::success(&ctx.call_id, self.0))
        }
    }

    fn catalog() -> ToolCatalog {
        let mut catalog = ToolCatalog::new();
        catalog.register(Arc::new(NamedTool("read_file")));
        catalog.register(Arc::new(NamedTool("list_dir")));
        catalog
    }

    fn custom(name: &str) -> ToolReference {
        ToolReference::custom(ToolDefinition {
            name: name.into(),
            description: "client tool".into(),
            parameters: serde_json::json!({"type": "object"}),
        })
    }

    #[test]
    fn definitions_are_deduplicated_in_resolution_order() {
        let primary = WorkspaceReference::session_primary(
            PathBuf::from("/sessions/abc"),
            vec![ToolReference::known("read_file")],
        );
        let attached = WorkspaceReference::server_directory(
            PathBuf::from("/srv/project"),
            TrustLevel::Full,
            vec![ToolReference::known("list_dir"), ToolReference::known("read_file")],
        );
        let registry = ToolRegistry::build(&catalog(), &[primary.clone(), attached.clone()]);

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["read_file", "list_dir"]);
        assert_eq!(registry.len(), 3);
        assert!(registry.find(&attached.id, "read_file").is_some());
    }

    #[test]
    fn unknown_known_ids_are_skipped() {
        let ws = WorkspaceReference::session_primary(
            PathBuf::from("/sessions/abc"),
            vec![ToolReference::known("does_not_exist")],
        );
        assert!(ToolRegistry::tools_for(&catalog(), &ws).is_empty());
    }

    #[test]
    fn client_tools_have_no_local_implementation() {
        let ws = WorkspaceReference::client(
            "device-1",
            "client://laptop",
            vec![ToolReference::known("read_file"), custom("take_screenshot")],
        );
        let tools = ToolRegistry::tools_for(&catalog(), &ws);
        assert_eq!(tools.len(), 2);
        assert!(tools.iter().all(|t| t.local.is_none()));
        assert_eq!(tools[1].name(), "take_screenshot");
    }
}
