//! Error types for the Cairn domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Cairn operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Routing errors ---
    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    // --- Workspace errors ---
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Invalid edge {source_id} -> {target_id}: {reason}")]
    InvalidEdge {
        source_id: String,
        target_id: String,
        reason: String,
    },
}

/// Domain failures raised by a tool implementation.
///
/// The router folds these into [`crate::ToolResult::failure`] so the model
/// sees them as ordinary tool output.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Infrastructural failures of tool routing.
///
/// Unlike [`ToolError`], these are distinguished kinds the conversation loop
/// may react to (abort auto-continuation, surface a notice, and so on).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("Tool not found in any workspace of this session: {0}")]
    ToolNotFound(String),

    #[error("Workspace not found or not active: {0}")]
    WorkspaceNotFound(String),

    #[error("Remote client not connected for workspace {0}")]
    ClientNotConnected(String),

    #[error("Tool {tool_name} timed out after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error(
        "Loop detected: {tool_name} was called {repeats} times with identical arguments; \
         try a different approach"
    )]
    LoopDetected { tool_name: String, repeats: usize },

    #[error("Sandbox violation: path '{path}' escapes workspace root '{root}'")]
    SandboxViolation { path: String, root: String },

    #[error("Approval denied for tool {0}")]
    ApprovalDenied(String),

    #[error("Tool execution cancelled")]
    Cancelled,
}

impl RouterError {
    /// Hard failures are never retried and are surfaced to the user in
    /// addition to the model.
    pub fn is_hard_failure(&self) -> bool {
        matches!(self, Self::SandboxViolation { .. })
    }

    /// Whether this failure must stop the loop from auto-continuing.
    pub fn breaks_auto_continue(&self) -> bool {
        matches!(self, Self::LoopDetected { .. } | Self::SandboxViolation { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("Workspace already registered: {0}")]
    DuplicateWorkspace(String),

    #[error("Primary workspace {0} cannot be detached")]
    PrimaryDetach(String),

    #[error("Workspace root {path} lies outside the session root {sessions_root}")]
    OutsideSessionRoot { path: String, sessions_root: String },

    #[error("Workspace I/O error: {0}")]
    Io(String),
}
