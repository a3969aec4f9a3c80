//! Workspace registry and per-session tool registries for Cairn.
//!
//! A session sees the tools of its primary sandbox plus every attached
//! workspace. The registry is shared; [`SessionSnapshot`]s are what a
//! conversation loop actually works from.

pub mod registry;
pub mod tool_registry;

pub use registry::{SessionSnapshot, WorkspaceRegistry};
pub use tool_registry::{RegisteredTool, ToolRegistry};
