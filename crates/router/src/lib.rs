//! Workspace-scoped tool routing for Cairn.
//!
//! Provides:
//! - **Resolution**: pick the workspace of a session that runs a call
//! - **Sandboxing**: lexical containment of filesystem paths in a root
//! - **Loop detection**: refuse identical calls repeated within a window
//! - **Dispatch**: local execution, or remote with timeout and cancellation
//! - **Audit logging**: trust-boundary decisions under `cairn::audit`

pub mod audit;
pub mod loop_detect;
pub mod resolve;
pub mod router;
pub mod sandbox;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use loop_detect::LoopDetector;
pub use resolve::{TARGET_ARGUMENT, resolve_target, take_explicit_target};
pub use router::SessionRouter;
pub use sandbox::{SandboxError, resolve_in_root};
