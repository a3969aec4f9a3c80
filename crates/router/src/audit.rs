//! Audit logging: routing decisions that cross a trust boundary.
//!
//! Sandbox violations, approvals and loop rejections are recorded here
//! rather than as ordinary tool errors, so they can be monitored apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub session_id: String,
    pub workspace_id: String,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

/// Types of auditable routing events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A filesystem tool asked for a path outside its root
    SandboxViolation { tool_name: String, path: String },
    /// An operator decided on a restricted-workspace call
    Approval { tool_name: String },
    /// The loop detector refused a repeated call
    LoopRejected { tool_name: String },
}

/// Outcome of an audited decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Allowed,
    Denied,
}

/// Where audit entries are written.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Keeps entries in memory and forwards each one to its sinks.
pub struct AuditLogger {
    entries: Mutex<Vec<AuditEntry>>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("entry_count", &self.count())
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    /// A logger that forwards to [`TracingSink`].
    fn default() -> Self {
        Self::with_sinks(vec![Box::new(TracingSink)])
    }
}

impl AuditLogger {
    /// Create an audit logger with no sinks.
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sinks,
        }
    }

    pub fn log(
        &self,
        event: AuditEvent,
        session_id: &str,
        workspace_id: &str,
        outcome: AuditOutcome,
        details: Option<String>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            session_id: session_id.into(),
            workspace_id: workspace_id.into(),
            outcome,
            details,
        };

        for sink in &self.sinks {
            sink.record(&entry);
        }
        self.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().clone()
    }

    pub fn entries_by_outcome(&self, outcome: AuditOutcome) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|e| e.outcome == outcome)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AuditEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Emits entries through `tracing` under the `cairn::audit` target.
/// Denials log at `warn`, everything else at `info`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        match entry.outcome {
            AuditOutcome::Denied => tracing::warn!(
                target: "cairn::audit",
                event = ?entry.event,
                session_id = %entry.session_id,
                workspace_id = %entry.workspace_id,
                details = ?entry.details,
                "AUDIT denied"
            ),
            AuditOutcome::Allowed => tracing::info!(
                target: "cairn::audit",
                event = ?entry.event,
                session_id = %entry.session_id,
                workspace_id = %entry.workspace_id,
                details = ?entry.details,
                "AUDIT allowed"
            ),
        }
    }
}
