//! Workspace registry: the shared workspace and session graph.
//!
//! Shared across all sessions. Rows live in `DashMap`s so each write only
//! locks the session or workspace it touches. Conversation loops never hold
//! a reference into the registry: they take a [`SessionSnapshot`] at the
//! start of a turn and work from that.

use crate::tool_registry::ToolRegistry;
use cairn_core::error::WorkspaceError;
use cairn_core::tool::ToolCatalog;
use cairn_core::workspace::{HostType, Session, WorkspaceReference, WorkspaceStatus};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The workspace graph of one session, frozen at snapshot time.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: Session,
    /// Primary first, then attached in attachment order
    pub workspaces: Vec<WorkspaceReference>,
    pub tools: ToolRegistry,
}

impl SessionSnapshot {
    pub fn workspace(&self, id: &str) -> Option<&WorkspaceReference> {
        self.workspaces.iter().find(|w| w.id == id)
    }

    pub fn primary(&self) -> Option<&WorkspaceReference> {
        self.workspace(&self.session.primary_workspace_id)
    }
}

pub struct WorkspaceRegistry {
    sessions_root: PathBuf,
    catalog: ToolCatalog,
    workspaces: DashMap<String, WorkspaceReference>,
    sessions: DashMap<String, Session>,
}

impl WorkspaceRegistry {
    /// Create a registry whose session sandboxes live under `sessions_root`
    /// and expose every tool in `catalog`.
    pub fn new(sessions_root: impl Into<PathBuf>, catalog: ToolCatalog) -> Self {
        Self {
            sessions_root: sessions_root.into(),
            catalog,
            workspaces: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    pub fn sessions_root(&self) -> &Path {
        &self.sessions_root
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Create a session together with its primary `server_session`
    /// workspace rooted at `<sessions_root>/<session_id>`.
    ///
    /// The sandbox directory is created first; nothing is registered if
    /// that fails.
    pub async fn create_session(
        &self,
        title: Option<String>,
        tags: Vec<String>,
    ) -> Result<Session, WorkspaceError> {
        let session_id = Uuid::new_v4().to_string();
        let root = self.sessions_root.join(&session_id);
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| WorkspaceError::Io(format!("{}: {e}", root.display())))?;

        let primary = WorkspaceReference::session_primary(root, self.catalog.references());
        let mut session = Session::new(&session_id, &primary.id);
        session.title = title;
        session.tags = tags;

        self.workspaces.insert(primary.id.clone(), primary);
        self.sessions.insert(session_id.clone(), session.clone());
        info!(session_id = %session_id, "Session created");
        Ok(session)
    }

    /// Register a server directory or client workspace so sessions can
    /// attach it.
    pub fn register_workspace(&self, workspace: WorkspaceReference) -> Result<String, WorkspaceError> {
        if workspace.host_type == HostType::ServerSession {
            let inside = workspace
                .root_path
                .as_deref()
                .is_some_and(|root| root.starts_with(&self.sessions_root));
            if !inside {
                return Err(WorkspaceError::OutsideSessionRoot {
                    path: workspace
                        .root_path
                        .as_deref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                    sessions_root: self.sessions_root.display().to_string(),
                });
            }
        }

        let id = workspace.id.clone();
        match self.workspaces.entry(id.clone()) {
            Entry::Occupied(_) => Err(WorkspaceError::DuplicateWorkspace(id)),
            Entry::Vacant(slot) => {
                debug!(workspace_id = %id, host = ?workspace.host_type, "Workspace registered");
                slot.insert(workspace);
                Ok(id)
            }
        }
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|r| r.value().clone())
    }

    pub fn workspace(&self, id: &str) -> Option<WorkspaceReference> {
        self.workspaces.get(id).map(|r| r.value().clone())
    }

    /// Non-archived sessions, most recently updated first.
    pub fn sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|r| !r.value().is_archived)
            .map(|r| r.value().clone())
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    /// Attach a registered workspace. Returns `false` if already attached.
    pub fn attach(&self, session_id: &str, workspace_id: &str) -> Result<bool, WorkspaceError> {
        if !self.workspaces.contains_key(workspace_id) {
            return Err(WorkspaceError::WorkspaceNotFound(workspace_id.into()));
        }
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| WorkspaceError::SessionNotFound(session_id.into()))?;
        let attached = session.attach(workspace_id);
        if attached {
            debug!(session_id, workspace_id, "Workspace attached");
        }
        Ok(attached)
    }

    /// Detach a workspace. Returns `false` if it was not attached.
    ///
    /// The workspace is destroyed once no session references it any more.
    pub fn detach(&self, session_id: &str, workspace_id: &str) -> Result<bool, WorkspaceError> {
        let detached = {
            let mut session = self
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| WorkspaceError::SessionNotFound(session_id.into()))?;
            if session.primary_workspace_id == workspace_id {
                return Err(WorkspaceError::PrimaryDetach(workspace_id.into()));
            }
            session.detach(workspace_id)
        };
        if detached {
            debug!(session_id, workspace_id, "Workspace detached");
            self.release_if_unreferenced(workspace_id);
        }
        Ok(detached)
    }

    /// Drop a workspace row that no session lists any more. Must not be
    /// called while holding a guard into `sessions`.
    fn release_if_unreferenced(&self, workspace_id: &str) {
        let referenced = self
            .sessions
            .iter()
            .any(|s| s.value().workspace_ids().any(|id| id == workspace_id));
        if !referenced && self.workspaces.remove(workspace_id).is_some() {
            debug!(workspace_id, "Workspace destroyed");
        }
    }

    /// Mark every client workspace of `owner_id` as missing. Returns how
    /// many changed.
    pub fn mark_missing(&self, owner_id: &str) -> usize {
        self.set_client_status(owner_id, WorkspaceStatus::Missing)
    }

    /// Reactivate the client workspaces of a reconnected owner.
    pub fn mark_active(&self, owner_id: &str) -> usize {
        self.set_client_status(owner_id, WorkspaceStatus::Active)
    }

    fn set_client_status(&self, owner_id: &str, status: WorkspaceStatus) -> usize {
        let mut changed = 0;
        for mut entry in self.workspaces.iter_mut() {
            let ws = entry.value_mut();
            if ws.host_type == HostType::Client
                && ws.owner_id.as_deref() == Some(owner_id)
                && ws.status != status
            {
                ws.status = status;
                changed += 1;
            }
        }
        if changed > 0 {
            info!(owner_id, status = ?status, changed, "Client workspaces status changed");
        }
        changed
    }

    pub fn archive_session(&self, session_id: &str) -> Result<(), WorkspaceError> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| WorkspaceError::SessionNotFound(session_id.into()))?;
        session.is_archived = true;
        session.updated_at = Utc::now();
        Ok(())
    }

    /// Delete a session and destroy its primary workspace, including the
    /// sandbox directory. Attached workspaces are destroyed too unless
    /// another session still lists them.
    pub async fn delete_session(&self, session_id: &str) -> Result<Session, WorkspaceError> {
        let (_, session) = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| WorkspaceError::SessionNotFound(session_id.into()))?;

        if let Some((_, primary)) = self.workspaces.remove(&session.primary_workspace_id)
            && let Some(root) = primary.root_path
        {
            match tokio::fs::remove_dir_all(&root).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(session_id, error = %e, "Failed to remove session sandbox"),
            }
        }
        for workspace_id in &session.attached_workspace_ids {
            self.release_if_unreferenced(workspace_id);
        }
        info!(session_id, "Session deleted");
        Ok(session)
    }

    /// Freeze a session's workspace graph and tool registry.
    ///
    /// Attached ids whose workspace has been unregistered are dropped.
    pub fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, WorkspaceError> {
        let session = self
            .session(session_id)
            .ok_or_else(|| WorkspaceError::SessionNotFound(session_id.into()))?;
        let workspaces: Vec<WorkspaceReference> = session
            .workspace_ids()
            .filter_map(|id| self.workspace(id))
            .collect();
        let tools = ToolRegistry::build(
            &self.catalog,
            &workspaces.iter().filter(|w| w.is_active()).cloned().collect::<Vec<_>>(),
        );
        Ok(SessionSnapshot {
            session,
            workspaces,
            tools,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::tool::ToolReference;
    use cairn_core::workspace::TrustLevel;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> WorkspaceRegistry {
        WorkspaceRegistry::new(dir.path().join("sessions"), ToolCatalog::new())
    }

    #[tokio::test]
    async fn create_session_builds_primary_sandbox() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let session = registry
            .create_session(Some("Research".into()), vec!["work".into()])
            .await
            .unwrap();
        let primary = registry.workspace(&session.primary_workspace_id).unwrap();

        assert_eq!(primary.host_type, HostType::ServerSession);
        let root = primary.root_path.unwrap();
        assert_eq!(root, dir.path().join("sessions").join(&session.id));
        assert!(root.is_dir());
        assert_eq!(registry.session(&session.id).unwrap().title.as_deref(), Some("Research"));
    }

    #[tokio::test]
    async fn attach_and_detach_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let session = registry.create_session(None, vec![]).await.unwrap();

        let ws = WorkspaceReference::server_directory(
            dir.path().join("project"),
            TrustLevel::Full,
            vec![],
        );
        let ws_id = registry.register_workspace(ws).unwrap();

        assert!(registry.attach(&session.id, &ws_id).unwrap());
        assert!(!registry.attach(&session.id, &ws_id).unwrap());
        assert!(registry.detach(&session.id, &ws_id).unwrap());
        assert!(!registry.detach(&session.id, &ws_id).unwrap());

        let err = registry.detach(&session.id, &session.primary_workspace_id).unwrap_err();
        assert!(matches!(err, WorkspaceError::PrimaryDetach(_)));

        let err = registry.attach(&session.id, "nope").unwrap_err();
        assert_eq!(err, WorkspaceError::WorkspaceNotFound("nope".into()));
    }

    #[tokio::test]
    async fn session_workspace_outside_root_is_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let ws = WorkspaceReference::session_primary(PathBuf::from("/etc"), vec![]);
        let err = registry.register_workspace(ws).unwrap_err();
        assert!(matches!(err, WorkspaceError::OutsideSessionRoot { .. }));
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let ws = WorkspaceReference::client("device-1", "client://laptop", vec![]);
        registry.register_workspace(ws.clone()).unwrap();
        let err = registry.register_workspace(ws).unwrap_err();
        assert!(matches!(err, WorkspaceError::DuplicateWorkspace(_)));
    }

    #[tokio::test]
    async fn owner_disconnect_marks_client_workspaces_missing() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let laptop = registry
            .register_workspace(WorkspaceReference::client("device-1", "client://laptop", vec![]))
            .unwrap();
        let phone = registry
            .register_workspace(WorkspaceReference::client("device-2", "client://phone", vec![]))
            .unwrap();

        assert_eq!(registry.mark_missing("device-1"), 1);
        assert_eq!(registry.mark_missing("device-1"), 0);
        assert_eq!(registry.workspace(&laptop).unwrap().status, WorkspaceStatus::Missing);
        assert_eq!(registry.workspace(&phone).unwrap().status, WorkspaceStatus::Active);

        assert_eq!(registry.mark_active("device-1"), 1);
        assert!(registry.workspace(&laptop).unwrap().is_active());
    }

    #[tokio::test]
    async fn snapshot_orders_primary_first_and_skips_missing_tools() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let session = registry.create_session(None, vec![]).await.unwrap();

        let custom = ToolReference::custom(cairn_core::provider::ToolDefinition {
            name: "take_screenshot".into(),
            description: "client tool".into(),
            parameters: serde_json::json!({"type": "object"}),
        });
        let client = registry
            .register_workspace(WorkspaceReference::client("device-1", "client://laptop", vec![custom]))
            .unwrap();
        registry.attach(&session.id, &client).unwrap();

        let snapshot = registry.snapshot(&session.id).unwrap();
        assert_eq!(snapshot.workspaces.len(), 2);
        assert_eq!(snapshot.workspaces[0].id, session.primary_workspace_id);
        assert_eq!(snapshot.tools.definitions().len(), 1);

        registry.mark_missing("device-1");
        let snapshot = registry.snapshot(&session.id).unwrap();
        assert_eq!(snapshot.workspaces.len(), 2);
        assert!(snapshot.tools.definitions().is_empty());
    }

    #[tokio::test]
    async fn delete_session_removes_sandbox() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let session = registry.create_session(None, vec![]).await.unwrap();
        let root = registry
            .workspace(&session.primary_workspace_id)
            .unwrap()
            .root_path
            .unwrap();

        registry.delete_session(&session.id).await.unwrap();
        assert!(!root.exists());
        assert!(registry.session(&session.id).is_none());
        assert!(registry.workspace(&session.primary_workspace_id).is_none());
        assert!(matches!(
            registry.delete_session(&session.id).await,
            Err(WorkspaceError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn detach_destroys_an_unshared_workspace() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let a = registry.create_session(None, vec![]).await.unwrap();
        let b = registry.create_session(None, vec![]).await.unwrap();
        let shared = registry
            .register_workspace(WorkspaceReference::client("device-1", "client://laptop", vec![]))
            .unwrap();
        registry.attach(&a.id, &shared).unwrap();
        registry.attach(&b.id, &shared).unwrap();

        assert!(registry.detach(&a.id, &shared).unwrap());
        assert!(registry.workspace(&shared).is_some());

        assert!(registry.detach(&b.id, &shared).unwrap());
        assert!(registry.workspace(&shared).is_none());
        let err = registry.attach(&a.id, &shared).unwrap_err();
        assert_eq!(err, WorkspaceError::WorkspaceNotFound(shared));
    }

    #[tokio::test]
    async fn delete_session_destroys_its_attached_workspaces() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let a = registry.create_session(None, vec![]).await.unwrap();
        let b = registry.create_session(None, vec![]).await.unwrap();
        let project = registry
            .register_workspace(WorkspaceReference::server_directory(
                dir.path().join("project"),
                TrustLevel::Full,
                vec![],
            ))
            .unwrap();
        let shared = registry
            .register_workspace(WorkspaceReference::client("device-1", "client://laptop", vec![]))
            .unwrap();
        registry.attach(&a.id, &project).unwrap();
        registry.attach(&a.id, &shared).unwrap();
        registry.attach(&b.id, &shared).unwrap();

        registry.delete_session(&a.id).await.unwrap();

        assert!(registry.workspace(&project).is_none());
        assert!(registry.workspace(&shared).is_some());
        assert_eq!(registry.snapshot(&b.id).unwrap().workspaces.len(), 2);
    }

    #[tokio::test]
    async fn archived_sessions_are_hidden_from_listing() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let a = registry.create_session(None, vec![]).await.unwrap();
        let b = registry.create_session(None, vec![]).await.unwrap();
        registry.archive_session(&a.id).unwrap();

        let ids: Vec<String> = registry.sessions().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![b.id]);
        assert!(registry.session(&a.id).unwrap().is_archived);
    }
}
