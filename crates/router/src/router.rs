//! The per-session tool router.
//!
//! One [`SessionRouter`] exists per session and owns that session's loop
//! detection window and remote client channels. Each call goes through the
//! same pipeline:
//!
//! 1. Resolve the target workspace
//! 2. Refuse repeated identical calls
//! 3. Sandbox the `path` argument of filesystem tools
//! 4. Wait for operator approval in restricted workspaces
//! 5. Dispatch locally, or remotely with a timeout
//!
//! Domain failures of a tool come back as `ToolResult::failure`. Routing
//! failures come back as [`RouterError`] so the conversation loop can tell
//! them apart.

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};
use crate::loop_detect::LoopDetector;
use crate::resolve::resolve_target;
use crate::sandbox::resolve_in_root;
use cairn_config::RouterConfig;
use cairn_core::error::{RouterError, WorkspaceError};
use cairn_core::event::{EventBus, TurnEvent};
use cairn_core::remote::{ApprovalDecision, ApprovalGate, RemoteClientChannel};
use cairn_core::tool::{ToolCall, ToolContext, ToolResult};
use cairn_core::workspace::{TrustLevel, WorkspaceReference};
use cairn_workspace::{SessionSnapshot, WorkspaceRegistry};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct SessionRouter {
    session_id: String,
    registry: Arc<WorkspaceRegistry>,
    config: RouterConfig,
    detector: Mutex<LoopDetector>,
    clients: RwLock<HashMap<String, Arc<dyn RemoteClientChannel>>>,
    approval: Option<Arc<dyn ApprovalGate>>,
    audit: Arc<AuditLogger>,
    events: Option<Arc<EventBus>>,
}

impl SessionRouter {
    pub fn new(
        session_id: impl Into<String>,
        registry: Arc<WorkspaceRegistry>,
        config: RouterConfig,
    ) -> Self {
        let detector = LoopDetector::new(config.loop_threshold, config.loop_window);
        Self {
            session_id: session_id.into(),
            registry,
            config,
            detector: Mutex::new(detector),
            clients: RwLock::new(HashMap::new()),
            approval: None,
            audit: Arc::new(AuditLogger::default()),
            events: None,
        }
    }

    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval = Some(gate);
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// The session's current workspace graph and tools.
    pub fn snapshot(&self) -> Result<SessionSnapshot, WorkspaceError> {
        self.registry.snapshot(&self.session_id)
    }

    /// Clear the loop detection window.
    pub fn reset_loop_window(&self) {
        self.detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }

    /// Register a connected client and reactivate its workspaces.
    pub async fn connect_client(&self, channel: Arc<dyn RemoteClientChannel>) {
        let owner = channel.owner_id().to_string();
        self.clients.write().await.insert(owner.clone(), channel);
        self.registry.mark_active(&owner);
        info!(session_id = %self.session_id, owner_id = %owner, "Client connected");
    }

    /// Drop a client channel and mark its workspaces missing.
    pub async fn disconnect_client(&self, owner_id: &str) {
        self.clients.write().await.remove(owner_id);
        self.registry.mark_missing(owner_id);
        info!(session_id = %self.session_id, owner_id, "Client disconnected");
    }

    /// Run one tool call through resolution, loop detection, sandboxing,
    /// approval and dispatch.
    pub async fn execute(
        &self,
        call: &ToolCall,
        snapshot: &SessionSnapshot,
        explicit_target: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, RouterError> {
        let workspace = resolve_target(call, snapshot, explicit_target)?;

        let checked = self
            .detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .check(call);
        if let Err(e) = checked {
            warn!(session_id = %self.session_id, tool = %call.name, "Repeated tool call refused");
            self.audit.log(
                AuditEvent::LoopRejected { tool_name: call.name.clone() },
                &self.session_id,
                &workspace.id,
                AuditOutcome::Denied,
                Some(e.to_string()),
            );
            return Err(e);
        }

        let mut ctx = ToolContext {
            call_id: call.id.clone(),
            session_id: self.session_id.clone(),
            workspace_id: workspace.id.clone(),
            root: workspace.root_path.clone(),
            sandboxed_path: None,
        };

        let local = if workspace.host_type.is_local() {
            let tool = snapshot
                .tools
                .find(&workspace.id, &call.name)
                .and_then(|t| t.local.clone())
                .ok_or_else(|| RouterError::ToolNotFound(call.name.clone()))?;
            if tool.filesystem_capable() {
                ctx.sandboxed_path = Some(self.sandbox(call, workspace)?);
            }
            Some(tool)
        } else {
            None
        };

        if workspace.trust_level == TrustLevel::Restricted {
            self.await_approval(call, workspace, cancel).await?;
        }

        if let Some(events) = &self.events {
            events.publish(TurnEvent::ToolExecutionAttempting {
                session_id: self.session_id.clone(),
                call_id: call.id.clone(),
                name: call.name.clone(),
                workspace_id: workspace.id.clone(),
            });
        }
        debug!(
            session_id = %self.session_id,
            tool = %call.name,
            workspace_id = %workspace.id,
            host = ?workspace.host_type,
            "Dispatching tool call"
        );

        match local {
            Some(tool) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(RouterError::Cancelled),
                    outcome = tool.execute(&call.arguments, &ctx) => Ok(match outcome {
                        Ok(mut result) => {
                            result.call_id = call.id.clone();
                            result
                        }
                        Err(e) => ToolResult::failure(&call.id, e.to_string()),
                    }),
                }
            }
            None => self.dispatch_remote(call, workspace, cancel).await,
        }
    }

    /// Execute a turn's calls concurrently. Results come back in call
    /// order regardless of completion order.
    pub async fn execute_all(
        &self,
        calls: &[ToolCall],
        snapshot: &SessionSnapshot,
        cancel: &CancellationToken,
    ) -> Vec<Result<ToolResult, RouterError>> {
        join_all(
            calls
                .iter()
                .map(|call| self.execute(call, snapshot, None, cancel)),
        )
        .await
    }

    fn sandbox(
        &self,
        call: &ToolCall,
        workspace: &WorkspaceReference,
    ) -> Result<std::path::PathBuf, RouterError> {
        let requested = call.arguments.str("path").unwrap_or(".");
        let root_display = workspace
            .root_path
            .as_deref()
            .map(|r| r.display().to_string())
            .unwrap_or_default();

        let outcome = match workspace.root_path.as_deref() {
            Some(root) => resolve_in_root(root, requested).map_err(|e| e.to_string()),
            None => Err("workspace has no root".to_string()),
        };

        outcome.map_err(|reason| {
            warn!(
                session_id = %self.session_id,
                tool = %call.name,
                workspace_id = %workspace.id,
                path = %requested,
                "Sandbox violation"
            );
            self.audit.log(
                AuditEvent::SandboxViolation {
                    tool_name: call.name.clone(),
                    path: requested.to_string(),
                },
                &self.session_id,
                &workspace.id,
                AuditOutcome::Denied,
                Some(reason),
            );
            RouterError::SandboxViolation {
                path: requested.to_string(),
                root: root_display,
            }
        })
    }

    async fn await_approval(
        &self,
        call: &ToolCall,
        workspace: &WorkspaceReference,
        cancel: &CancellationToken,
    ) -> Result<(), RouterError> {
        let Some(gate) = &self.approval else {
            warn!(session_id = %self.session_id, tool = %call.name, "No approval gate for restricted workspace");
            return Err(RouterError::ApprovalDenied(call.name.clone()));
        };

        let timeout = Duration::from_secs(self.config.approval_timeout_secs);
        let decision = tokio::select! {
            _ = cancel.cancelled() => return Err(RouterError::Cancelled),
            decision = tokio::time::timeout(timeout, gate.request_approval(call, workspace)) => {
                decision.unwrap_or(ApprovalDecision::Denied)
            }
        };

        let outcome = match decision {
            ApprovalDecision::Granted => AuditOutcome::Allowed,
            ApprovalDecision::Denied => AuditOutcome::Denied,
        };
        self.audit.log(
            AuditEvent::Approval { tool_name: call.name.clone() },
            &self.session_id,
            &workspace.id,
            outcome,
            None,
        );

        match decision {
            ApprovalDecision::Granted => Ok(()),
            ApprovalDecision::Denied => Err(RouterError::ApprovalDenied(call.name.clone())),
        }
    }

    async fn dispatch_remote(
        &self,
        call: &ToolCall,
        workspace: &WorkspaceReference,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, RouterError> {
        let owner = workspace.owner_id.as_deref().unwrap_or_default();
        let channel = self
            .clients
            .read()
            .await
            .get(owner)
            .cloned()
            .filter(|c| c.is_connected())
            .ok_or_else(|| RouterError::ClientNotConnected(workspace.id.clone()))?;

        let timeout = Duration::from_secs(self.config.remote_timeout_secs);
        tokio::select! {
            _ = cancel.cancelled() => Err(RouterError::Cancelled),
            outcome = tokio::time::timeout(timeout, channel.dispatch(call, timeout)) => match outcome {
                Ok(result) => result.map(|mut r| {
                    r.call_id = call.id.clone();
                    r
                }),
                Err(_) => {
                    warn!(session_id = %self.session_id, tool = %call.name, "Remote tool timed out");
                    Err(RouterError::Timeout {
                        tool_name: call.name.clone(),
                        timeout_secs: self.config.remote_timeout_secs,
                    })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cairn_core::error::ToolError;
    use cairn_core::provider::ToolDefinition;
    use cairn_core::tool::{Tool, ToolCatalog, ToolReference};
    use cairn_core::value::ToolArguments;
    use cairn_core::workspace::Session;
    use cairn_workspace::ToolRegistry;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTool {
        name: &'static str,
        filesystem: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "counts calls"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn filesystem_capable(&self) -> bool {
            self.filesystem
        }
        async fn execute(
            &self,
            arguments: &ToolArguments,
            ctx: &ToolContext,
        ) -> Result<ToolResult, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if arguments.str("fail").is_some() {
                return Err(ToolError::InvalidArguments("asked to fail".into()));
            }
            let path = ctx
                .sandboxed_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            Ok(ToolResult::success("ignored", format!("{}:{path}", self.name)))
        }
    }

    struct ScriptedChannel {
        owner: &'static str,
        delay: Duration,
        connected: bool,
    }

    #[async_trait]
    impl RemoteClientChannel for ScriptedChannel {
        fn owner_id(&self) -> &str {
            self.owner
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
        async fn dispatch(
            &self,
            call: &ToolCall,
            _timeout: Duration,
        ) -> Result<ToolResult, RouterError> {
            tokio::time::sleep(self.delay).await;
            Ok(ToolResult::success("ignored", format!("remote:{}", call.name)))
        }
    }

    struct FixedGate(ApprovalDecision);

    #[async_trait]
    impl ApprovalGate for FixedGate {
        async fn request_approval(
            &self,
            _call: &ToolCall,
            _workspace: &WorkspaceReference,
        ) -> ApprovalDecision {
            self.0
        }
    }

    struct Fixture {
        router: SessionRouter,
        calls: Arc<AtomicUsize>,
        catalog: ToolCatalog,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut catalog = ToolCatalog::new();
        for (name, filesystem) in [("read_file", true), ("list_dir", true), ("search_memory", false)] {
            catalog.register(Arc::new(CountingTool {
                name,
                filesystem,
                calls: calls.clone(),
            }));
        }
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(WorkspaceRegistry::new(dir.path(), catalog.clone()));
        let config = RouterConfig {
            remote_timeout_secs: 5,
            ..RouterConfig::default()
        };
        Fixture {
            router: SessionRouter::new("s1", registry, config)
                .with_audit(Arc::new(AuditLogger::new())),
            calls,
            catalog,
            _dir: dir,
        }
    }

    fn snapshot(catalog: &ToolCatalog, workspaces: Vec<WorkspaceReference>) -> SessionSnapshot {
        let mut session = Session::new("s1", &workspaces[0].id);
        for ws in &workspaces[1..] {
            session.attach(&ws.id);
        }
        let tools = ToolRegistry::build(catalog, &workspaces);
        SessionSnapshot {
            session,
            workspaces,
            tools,
        }
    }

    fn primary(catalog: &ToolCatalog, root: &Path) -> WorkspaceReference {
        WorkspaceReference::session_primary(root.to_path_buf(), catalog.references())
    }

    fn call(id: &str, name: &str, args: ToolArguments) -> ToolCall {
        ToolCall::new(id, name, args)
    }

    fn client_workspace(owner: &str) -> WorkspaceReference {
        WorkspaceReference::client(
            owner,
            "client://laptop",
            vec![ToolReference::custom(ToolDefinition {
                name: "take_screenshot".into(),
                description: "client tool".into(),
                parameters: serde_json::json!({"type": "object"}),
            })],
        )
    }

    #[tokio::test]
    async fn path_escape_is_rejected_before_the_tool_runs() {
        let f = fixture();
        let snap = snapshot(&f.catalog, vec![primary(&f.catalog, Path::new("/sessions/abc"))]);
        let read = call("c1", "read_file", ToolArguments::new().with("path", "../../etc/passwd"));

        let err = f
            .router
            .execute(&read, &snap, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RouterError::SandboxViolation {
                path: "../../etc/passwd".into(),
                root: "/sessions/abc".into(),
            }
        );
        assert!(err.is_hard_failure());
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.router.audit().entries_by_outcome(AuditOutcome::Denied).len(), 1);
    }

    #[tokio::test]
    async fn sandboxed_path_reaches_the_tool() {
        let f = fixture();
        let snap = snapshot(&f.catalog, vec![primary(&f.catalog, Path::new("/sessions/abc"))]);
        let read = call("c1", "read_file", ToolArguments::new().with("path", "docs/a.md"));

        let result = f
            .router
            .execute(&read, &snap, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.output, "read_file:/sessions/abc/docs/a.md");
        assert_eq!(result.call_id, "c1");
    }

    #[tokio::test]
    async fn fourth_identical_call_is_refused_before_dispatch() {
        let f = fixture();
        let snap = snapshot(&f.catalog, vec![primary(&f.catalog, Path::new("/sessions/abc"))]);
        let cancel = CancellationToken::new();

        let mut outcomes = Vec::new();
        for i in 0..5 {
            let list = call(&format!("c{i}"), "list_dir", ToolArguments::new());
            outcomes.push(f.router.execute(&list, &snap, None, &cancel).await);
        }

        assert!(outcomes[..3].iter().all(|o| o.is_ok()));
        assert!(matches!(outcomes[3], Err(RouterError::LoopDetected { .. })));
        assert!(matches!(outcomes[4], Err(RouterError::LoopDetected { .. })));
        assert_eq!(f.calls.load(Ordering::SeqCst), 3);

        f.router.reset_loop_window();
        let list = call("c9", "list_dir", ToolArguments::new());
        assert!(f.router.execute(&list, &snap, None, &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn tool_errors_become_failed_results() {
        let f = fixture();
        let snap = snapshot(&f.catalog, vec![primary(&f.catalog, Path::new("/sessions/abc"))]);
        let search = call("c1", "search_memory", ToolArguments::new().with("fail", "yes"));

        let result = f
            .router
            .execute(&search, &snap, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("asked to fail"));
    }

    #[tokio::test]
    async fn restricted_workspace_needs_approval() {
        let f = fixture();
        let restricted = WorkspaceReference::server_directory(
            PathBuf::from("/srv/project"),
            TrustLevel::Restricted,
            vec![ToolReference::known("read_file")],
        );
        let mut only_restricted = primary(&f.catalog, Path::new("/sessions/abc"));
        only_restricted.tools.clear();
        let snap = snapshot(&f.catalog, vec![only_restricted, restricted]);
        let read = call("c1", "read_file", ToolArguments::new().with("path", "a"));
        let cancel = CancellationToken::new();

        // No gate at all
        let err = f.router.execute(&read, &snap, None, &cancel).await.unwrap_err();
        assert_eq!(err, RouterError::ApprovalDenied("read_file".into()));

        let denied = fixture();
        let router = denied
            .router
            .with_approval_gate(Arc::new(FixedGate(ApprovalDecision::Denied)));
        assert!(router.execute(&read, &snap, None, &cancel).await.is_err());
        assert_eq!(denied.calls.load(Ordering::SeqCst), 0);

        let granted = fixture();
        let router = granted
            .router
            .with_approval_gate(Arc::new(FixedGate(ApprovalDecision::Granted)));
        let result = router.execute(&read, &snap, None, &cancel).await.unwrap();
        assert_eq!(result.output, "read_file:/srv/project/a");
    }

    #[tokio::test]
    async fn remote_dispatch_requires_a_connected_client() {
        let f = fixture();
        let client = client_workspace("device-1");
        let snap = snapshot(
            &f.catalog,
            vec![primary(&f.catalog, Path::new("/sessions/abc")), client.clone()],
        );
        let shot = call("c1", "take_screenshot", ToolArguments::new());
        let cancel = CancellationToken::new();

        let err = f.router.execute(&shot, &snap, None, &cancel).await.unwrap_err();
        assert_eq!(err, RouterError::ClientNotConnected(client.id.clone()));

        f.router
            .connect_client(Arc::new(ScriptedChannel {
                owner: "device-1",
                delay: Duration::ZERO,
                connected: true,
            }))
            .await;
        let result = f.router.execute(&shot, &snap, None, &cancel).await.unwrap();
        assert_eq!(result.output, "remote:take_screenshot");
        assert_eq!(result.call_id, "c1");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_remote_call_times_out() {
        let f = fixture();
        let snap = snapshot(
            &f.catalog,
            vec![primary(&f.catalog, Path::new("/sessions/abc")), client_workspace("device-1")],
        );
        f.router
            .connect_client(Arc::new(ScriptedChannel {
                owner: "device-1",
                delay: Duration::from_secs(60),
                connected: true,
            }))
            .await;

        let shot = call("c1", "take_screenshot", ToolArguments::new());
        let err = f
            .router
            .execute(&shot, &snap, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RouterError::Timeout { tool_name: "take_screenshot".into(), timeout_secs: 5 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_remote_wait() {
        let f = fixture();
        let snap = snapshot(
            &f.catalog,
            vec![primary(&f.catalog, Path::new("/sessions/abc")), client_workspace("device-1")],
        );
        f.router
            .connect_client(Arc::new(ScriptedChannel {
                owner: "device-1",
                delay: Duration::from_secs(60),
                connected: true,
            }))
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let shot = call("c1", "take_screenshot", ToolArguments::new());
        let err = f.router.execute(&shot, &snap, None, &cancel).await.unwrap_err();
        assert_eq!(err, RouterError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_all_keeps_call_order() {
        let f = fixture();
        let snap = snapshot(
            &f.catalog,
            vec![primary(&f.catalog, Path::new("/sessions/abc")), client_workspace("device-1")],
        );
        f.router
            .connect_client(Arc::new(ScriptedChannel {
                owner: "device-1",
                delay: Duration::from_secs(2),
                connected: true,
            }))
            .await;

        let calls = vec![
            call("slow", "take_screenshot", ToolArguments::new()),
            call("fast", "list_dir", ToolArguments::new()),
        ];
        let results = f
            .router
            .execute_all(&calls, &snap, &CancellationToken::new())
            .await;

        let ids: Vec<String> = results
            .into_iter()
            .map(|r| r.unwrap().call_id)
            .collect();
        assert_eq!(ids, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn disconnect_marks_client_workspaces_missing() {
        let f = fixture();
        let client = client_workspace("device-1");
        let registry = Arc::new(WorkspaceRegistry::new(f._dir.path(), f.catalog.clone()));
        let client_id = registry.register_workspace(client).unwrap();
        let router = SessionRouter::new("s1", registry.clone(), RouterConfig::default());

        router.disconnect_client("device-1").await;
        assert!(!registry.workspace(&client_id).unwrap().is_active());

        router
            .connect_client(Arc::new(ScriptedChannel {
                owner: "device-1",
                delay: Duration::ZERO,
                connected: true,
            }))
            .await;
        assert!(registry.workspace(&client_id).unwrap().is_active());
    }
}
