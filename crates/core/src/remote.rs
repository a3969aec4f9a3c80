//! Remote execution and approval collaborators.
//!
//! Client-hosted tools run on an end-user device reached through a
//! [`RemoteClientChannel`]; restricted workspaces ask an [`ApprovalGate`]
//! before anything runs. Both are suspension points of a turn.

use crate::error::RouterError;
use crate::tool::{ToolCall, ToolResult};
use crate::workspace::WorkspaceReference;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The link to a connected client device.
#[async_trait]
pub trait RemoteClientChannel: Send + Sync {
    /// The owner id this channel serves (matches `WorkspaceReference::owner_id`).
    fn owner_id(&self) -> &str;

    /// Whether the device is currently reachable.
    fn is_connected(&self) -> bool;

    /// Execute a call on the device and wait for its result.
    ///
    /// Implementations should honor `timeout`; the router wraps the call in
    /// its own timeout as well.
    async fn dispatch(&self, call: &ToolCall, timeout: Duration)
    -> Result<ToolResult, RouterError>;
}

/// Operator decision for a restricted-trust call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Granted,
    Denied,
}

/// Human-in-the-loop approval for restricted workspaces.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn request_approval(
        &self,
        call: &ToolCall,
        workspace: &WorkspaceReference,
    ) -> ApprovalDecision;
}
