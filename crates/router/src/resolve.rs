//! Target resolution: which workspace of a session runs a tool call.
//!
//! Pure over a [`SessionSnapshot`]: the same snapshot and call always
//! resolve to the same workspace.

use cairn_core::error::{RouterError, ToolError};
use cairn_core::tool::ToolCall;
use cairn_core::value::{ToolArguments, ToolValue};
use cairn_core::workspace::WorkspaceReference;
use cairn_workspace::SessionSnapshot;

/// Reserved argument a model can add to any tool call to pin the
/// workspace that runs it.
pub const TARGET_ARGUMENT: &str = "workspace_id";

/// Strip the reserved [`TARGET_ARGUMENT`] from `arguments`, so the tool
/// never sees it, and return its value.
pub fn take_explicit_target(arguments: &mut ToolArguments) -> Result<Option<String>, ToolError> {
    match arguments.remove(TARGET_ARGUMENT) {
        None | Some(ToolValue::Null) => Ok(None),
        Some(ToolValue::String(id)) if !id.trim().is_empty() => Ok(Some(id)),
        Some(_) => Err(ToolError::InvalidArguments(format!(
            "'{TARGET_ARGUMENT}' must be a non-empty workspace id"
        ))),
    }
}

/// Pick the workspace that executes `call`.
///
/// With an explicit target, that workspace must belong to the session, be
/// active and expose the tool. Otherwise the primary workspace is tried
/// first, then attached workspaces in attachment order. Inactive
/// workspaces are skipped; if only inactive ones expose the tool the call
/// fails with `WorkspaceNotFound` instead of `ToolNotFound`.
pub fn resolve_target<'a>(
    call: &ToolCall,
    snapshot: &'a SessionSnapshot,
    explicit_target: Option<&str>,
) -> Result<&'a WorkspaceReference, RouterError> {
    if let Some(target) = explicit_target {
        let workspace = snapshot
            .workspace(target)
            .filter(|w| w.is_active())
            .ok_or_else(|| RouterError::WorkspaceNotFound(target.into()))?;
        if !workspace.exposes(&call.name) {
            return Err(RouterError::ToolNotFound(call.name.clone()));
        }
        return Ok(workspace);
    }

    let mut inactive_match = None;
    for workspace in &snapshot.workspaces {
        if !workspace.exposes(&call.name) {
            continue;
        }
        if workspace.is_active() {
            return Ok(workspace);
        }
        inactive_match.get_or_insert(workspace.id.clone());
    }

    Err(match inactive_match {
        Some(id) => RouterError::WorkspaceNotFound(id),
        None => RouterError::ToolNotFound(call.name.clone()),
    })
}
