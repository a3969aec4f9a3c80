//! The Cairn reasoning loop.
//!
//! Each user message runs through a **generate → execute → generate** cycle:
//!
//! 1. **Assemble** a bounded prompt: recall memories and notes, then fit
//!    prioritized sections into the token budget
//! 2. **Stream** the model's reply, watching for tool calls
//! 3. **If tool calls**: route them through the session's workspaces, fold
//!    results into history in call order, and generate again
//! 4. **If text only**: the user turn is complete
//!
//! The cycle ends at a text answer, the turn cap, or cancellation.

pub mod context;
pub mod jobs;
pub mod loop_runner;
/// Scripted providers for tests. Integration tests enable the
/// `test-helpers` feature to reach them.
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use context::{
    AssembledPrompt, AssemblyInput, AssemblyMetadata, ComposedPrompt, ContextAssembler,
    ContextData, ContextSection, DropInfo, LayerStats, NoTags, Preserve, RenderedSection,
    SectionKind, Strategy, Summarizer, TagGenerator, TokenBudget, UtilityModel,
};
pub use jobs::JobQueue;
pub use loop_runner::{ConversationLoop, LoopSettings, LoopState, TurnOutcome};
