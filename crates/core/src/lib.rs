//! # Cairn Core
//!
//! Domain types, collaborator traits, and error definitions for the Cairn
//! reasoning engine. This crate has **no runtime behavior of its own**: it
//! defines the model that the memory, workspace, router, and agent crates
//! implement against.
//!
//! ## Collaborators
//!
//! Everything the engine consumes from the outside world is a trait here:
//! - [`EmbeddingProvider`] and [`ModelProvider`] for model access
//! - [`MemoryStore`] for durable facts and notes
//! - [`RemoteClientChannel`] and [`ApprovalGate`] for client-hosted tools and
//!   human-in-the-loop approval
//!
//! Swapping an implementation never requires touching the core loop.

pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod remote;
pub mod tool;
pub mod value;
pub mod workspace;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, ProviderError, Result, RouterError, ToolError, WorkspaceError};
pub use event::{EventBus, TurnEvent};
pub use memory::{
    Memory, MemoryEdge, MemoryStore, Note, NoteQuery, PruneReport, PruneRequest, ScoredMemory,
};
pub use message::{Conversation, Message, MessageToolCall, Role, SessionId};
pub use provider::{
    ChunkReceiver, EmbeddingProvider, ModelProvider, ProviderRequest, StreamChunk, ToolCallDelta,
    ToolDefinition, Usage,
};
pub use remote::{ApprovalDecision, ApprovalGate, RemoteClientChannel};
pub use tool::{CustomTool, Tool, ToolCall, ToolCatalog, ToolContext, ToolReference, ToolResult};
pub use value::{ToolArguments, ToolValue};
pub use workspace::{HostType, Session, TrustLevel, WorkspaceReference, WorkspaceStatus};
