//! Context assembly pipeline.
//!
//! Recalls memories and notes for a turn, then composes a bounded prompt
//! from prioritized sections.
//!
//! # Sections (default priority order)
//!
//! | Section | Source | Overflow strategy |
//! |---------|--------|-------------------|
//! | System | Configured system prompt | Keep |
//! | User query | The new user message | Truncate, keep head |
//! | Notes | Always-append + matching notes | Summarize, else keep head |
//! | Tools | Session tool registry | Keep |
//! | Long-Term Memory | Merged recall, best first | Truncate, keep head |
//! | Conversation History | Prior turns | Truncate, keep tail |

pub mod assembler;
pub mod budget;
pub mod section;
pub mod token;
pub mod utility;

pub use assembler::{AssembledPrompt, AssemblyInput, ContextAssembler, ContextData};
pub use budget::{
    AssemblyMetadata, ComposedPrompt, DropInfo, LayerStats, RenderedSection, TokenBudget,
};
pub use section::{ContextSection, Preserve, SectionKind, Strategy};
pub use utility::{NoTags, Summarizer, TagGenerator, UtilityModel};
