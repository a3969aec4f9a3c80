//! Workspace and session domain types.
//!
//! A workspace is a trust- and root-scoped execution environment for tools.
//! Every session owns exactly one primary workspace (a private sandbox under
//! the sessions root) and may attach any number of further workspaces.

use crate::tool::ToolReference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Where a workspace's tools execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostType {
    /// A server-side directory attached to the session
    Server,
    /// The session-private sandbox
    ServerSession,
    /// A connected end-user device; always dispatched remotely
    Client,
}

impl HostType {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Server | Self::ServerSession)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Tool calls execute immediately
    #[default]
    Full,
    /// Every call needs an operator approval first
    Restricted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    #[default]
    Active,
    /// The remote owner disconnected
    Missing,
    Unknown,
}

/// A trust- and root-scoped execution environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceReference {
    pub id: String,
    pub uri: String,
    pub host_type: HostType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Meaningless for client workspaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_path: Option<PathBuf>,
    #[serde(default)]
    pub trust_level: TrustLevel,
    #[serde(default)]
    pub status: WorkspaceStatus,
    #[serde(default)]
    pub tools: Vec<ToolReference>,
}

impl WorkspaceReference {
    /// The private sandbox of a session.
    pub fn session_primary(root_path: PathBuf, tools: Vec<ToolReference>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            uri: format!("session://{}", root_path.display()),
            host_type: HostType::ServerSession,
            owner_id: None,
            root_path: Some(root_path),
            trust_level: TrustLevel::Full,
            status: WorkspaceStatus::Active,
            tools,
        }
    }

    /// A server-side directory attached by a user or agent.
    pub fn server_directory(
        root_path: PathBuf,
        trust_level: TrustLevel,
        tools: Vec<ToolReference>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            uri: format!("file://{}", root_path.display()),
            host_type: HostType::Server,
            owner_id: None,
            root_path: Some(root_path),
            trust_level,
            status: WorkspaceStatus::Active,
            tools,
        }
    }

    /// A workspace hosted on a connected client device.
    pub fn client(
        owner_id: impl Into<String>,
        uri: impl Into<String>,
        tools: Vec<ToolReference>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            uri: uri.into(),
            host_type: HostType::Client,
            owner_id: Some(owner_id.into()),
            root_path: None,
            trust_level: TrustLevel::Full,
            status: WorkspaceStatus::Active,
            tools,
        }
    }

    pub fn with_trust(mut self, trust_level: TrustLevel) -> Self {
        self.trust_level = trust_level;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == WorkspaceStatus::Active
    }

    /// Whether this workspace exposes a tool under `name`.
    pub fn exposes(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    pub fn tool(&self, name: &str) -> Option<&ToolReference> {
        self.tools.iter().find(|t| t.name() == name)
    }
}

/// A conversation session and its workspace graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub primary_workspace_id: String,
    /// Attachment order is resolution order
    #[serde(default)]
    pub attached_workspace_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_archived: bool,
}

impl Session {
    pub fn new(id: impl Into<String>, primary_workspace_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            primary_workspace_id: primary_workspace_id.into(),
            attached_workspace_ids: Vec::new(),
            title: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            is_archived: false,
        }
    }

    /// Attach a workspace. Returns `false` if it was already attached.
    pub fn attach(&mut self, workspace_id: &str) -> bool {
        if workspace_id == self.primary_workspace_id
            || self.attached_workspace_ids.iter().any(|id| id == workspace_id)
        {
            return false;
        }
        self.attached_workspace_ids.push(workspace_id.to_string());
        self.updated_at = Utc::now();
        true
    }

    /// Detach a workspace. Returns `false` if it was not attached.
    pub fn detach(&mut self, workspace_id: &str) -> bool {
        let before = self.attached_workspace_ids.len();
        self.attached_workspace_ids.retain(|id| id != workspace_id);
        let changed = self.attached_workspace_ids.len() < before;
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }

    /// Primary first, then attached workspaces in attachment order.
    pub fn workspace_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary_workspace_id.as_str())
            .chain(self.attached_workspace_ids.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_is_idempotent() {
        let mut session = Session::new("s1", "primary");
        assert!(session.attach("ws-a"));
        assert!(!session.attach("ws-a"));
        assert!(!session.attach("primary"));
        assert_eq!(session.attached_workspace_ids, vec!["ws-a".to_string()]);
    }

    #[test]
    fn detach_is_idempotent() {
        let mut session = Session::new("s1", "primary");
        session.attach("ws-a");
        assert!(session.detach("ws-a"));
        assert!(!session.detach("ws-a"));
        assert!(session.attached_workspace_ids.is_empty());
    }

    #[test]
    fn workspace_ids_start_with_primary() {
        let mut session = Session::new("s1", "primary");
        session.attach("b");
        session.attach("a");
        let ids: Vec<&str> = session.workspace_ids().collect();
        assert_eq!(ids, vec!["primary", "b", "a"]);
    }

    #[test]
    fn client_workspace_has_no_root() {
        let ws = WorkspaceReference::client("device-1", "client://laptop", vec![]);
        assert!(ws.root_path.is_none());
        assert!(!ws.host_type.is_local());
        assert!(ws.is_active());
    }

    #[test]
    fn exposes_checks_tool_names() {
        let ws = WorkspaceReference::session_primary(
            PathBuf::from("/sessions/abc"),
            vec![ToolReference::known("read_file")],
        );
        assert!(ws.exposes("read_file"));
        assert!(!ws.exposes("list_dir"));
        assert_eq!(ws.host_type, HostType::ServerSession);
    }
}
