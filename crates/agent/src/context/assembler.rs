//! Context assembly: recall, note selection and prompt composition.
//!
//! Per turn the assembler:
//!
//! 1. Augments the query with conversation context
//! 2. Recalls memories along three independent paths, in parallel:
//!    keyword search, vector similarity, and tag search with LLM-generated
//!    tags
//! 3. Merges the paths by memory id, boosting tag overlap, capped at a limit
//! 4. Fetches always-append notes plus notes matching the query
//! 5. Builds prioritized [`ContextSection`]s and composes them through the
//!    [`TokenBudget`]
//!
//! Every recall path is optional. An embedding or tag-generation failure
//! degrades recall quality and is logged; it never aborts the turn.

use crate::context::budget::{ComposedPrompt, TokenBudget};
use crate::context::section::{ContextSection, SectionKind};
use crate::context::utility::{NoTags, TagGenerator};
use cairn_config::ContextConfig;
use cairn_core::memory::{Memory, MemoryStore, Note, NoteQuery, ScoredMemory};
use cairn_core::message::{Message, Role};
use cairn_core::provider::{EmbeddingProvider, ToolDefinition};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Added to a memory's score when keyword search found it.
const KEYWORD_WEIGHT: f32 = 0.5;

/// Added per generated tag a memory carries.
const TAG_BOOST: f32 = 0.2;

/// Queries shorter than this many words borrow the previous user message.
const SHORT_QUERY_WORDS: usize = 3;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to tools. \
Use them when they help, and answer plainly when they do not.";

// ── Types ─────────────────────────────────────────────────────────────────

/// Everything recalled for one turn.
///
/// `generated_tags`, `semantic_results` and `tag_results` are diagnostics;
/// only `notes` and `memories` reach the prompt.
#[derive(Debug, Clone, Default)]
pub struct ContextData {
    pub notes: Vec<Note>,
    /// Merged, deduplicated recall, best first
    pub memories: Vec<Memory>,
    pub generated_tags: Vec<String>,
    pub semantic_results: Vec<ScoredMemory>,
    pub tag_results: Vec<Memory>,
    pub augmented_query: String,
}

/// Inputs for one prompt.
pub struct AssemblyInput<'a> {
    /// The new user text; empty on tool-loop continuation turns
    pub query: &'a str,
    /// Prior conversation, excluding `query`
    pub history: &'a [Message],
    /// Tools the session exposes this turn
    pub tools: &'a [ToolDefinition],
}

/// The assembled prompt, ready for a model request.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub messages: Vec<Message>,
    pub composed: ComposedPrompt,
    pub context: ContextData,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Orchestrates recall and composition. Create one per session and reuse it.
pub struct ContextAssembler {
    store: Arc<dyn MemoryStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    tag_generator: Arc<dyn TagGenerator>,
    budget: TokenBudget,
    config: ContextConfig,
    system_prompt: String,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn MemoryStore>, config: ContextConfig) -> Self {
        Self {
            store,
            embedder: None,
            tag_generator: Arc::new(NoTags),
            budget: TokenBudget::new().with_summary_target_ratio(config.summary_target_ratio),
            config,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_tag_generator(mut self, generator: Arc<dyn TagGenerator>) -> Self {
        self.tag_generator = generator;
        self
    }

    pub fn with_budget(mut self, budget: TokenBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Recall notes and memories relevant to `query`.
    pub async fn gather_context(
        &self,
        query: &str,
        history: &[Message],
        limit: usize,
        tag_generator: &dyn TagGenerator,
    ) -> ContextData {
        let augmented_query = augment_query(query, history);

        let notes_query = NoteQuery {
            include_always_append: true,
            text: (!augmented_query.is_empty()).then(|| augmented_query.clone()),
        };
        if augmented_query.is_empty() {
            return ContextData {
                notes: self.fetch_notes(&notes_query).await,
                ..ContextData::default()
            };
        }

        // Tags come from the user's own words; continuation turns have none
        let tag_query = match query.trim() {
            "" => augmented_query.as_str(),
            raw => raw,
        };
        let (keyword_results, semantic_results, (generated_tags, tag_results), notes) = futures::join!(
            self.keyword_recall(&augmented_query, limit),
            self.semantic_recall(&augmented_query),
            self.tag_recall(tag_query, limit, tag_generator),
            self.fetch_notes(&notes_query),
        );

        let memories = merge_recall(
            &keyword_results,
            &semantic_results,
            &tag_results,
            &generated_tags,
            limit,
        );
        debug!(
            keyword = keyword_results.len(),
            semantic = semantic_results.len(),
            tagged = tag_results.len(),
            merged = memories.len(),
            notes = notes.len(),
            "Context gathered"
        );

        ContextData {
            notes,
            memories,
            generated_tags,
            semantic_results,
            tag_results,
            augmented_query,
        }
    }

    /// Gather context and compose the full prompt for one generation.
    pub async fn assemble(&self, input: &AssemblyInput<'_>) -> AssembledPrompt {
        let context = self
            .gather_context(
                input.query,
                input.history,
                self.config.recall_limit,
                self.tag_generator.as_ref(),
            )
            .await;

        let sections = self.build_sections(&context, input);
        let composed = self
            .budget
            .compose(&sections, self.config.capacity_tokens)
            .await;
        debug!(
            total_tokens = composed.metadata.total_tokens,
            budget = composed.metadata.budget,
            drops = composed.metadata.drops.len(),
            "Prompt composed"
        );

        let mut messages = Vec::with_capacity(2);
        let system = composed.render_kinds(&[
            SectionKind::SystemInstructions,
            SectionKind::Notes,
            SectionKind::Tools,
            SectionKind::Memories,
        ]);
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        let user = composed.render_kinds(&[SectionKind::History, SectionKind::UserQuery]);
        if !user.is_empty() {
            messages.push(Message::user(user));
        }

        AssembledPrompt {
            messages,
            composed,
            context,
        }
    }

    /// Turn recalled context and live state into prompt sections, in
    /// declaration order.
    pub fn build_sections(
        &self,
        context: &ContextData,
        input: &AssemblyInput<'_>,
    ) -> Vec<ContextSection> {
        let notes = context
            .notes
            .iter()
            .map(|n| format!("## {}\n{}", n.name, n.content))
            .collect();
        let memories = context
            .memories
            .iter()
            .map(|m| format!("- {}: {}", m.title, m.content))
            .collect();
        let tools = input
            .tools
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect();
        let query = if input.query.trim().is_empty() {
            Vec::new()
        } else {
            vec![input.query.to_string()]
        };

        vec![
            ContextSection::new(SectionKind::SystemInstructions, vec![self.system_prompt.clone()]),
            ContextSection::new(SectionKind::Notes, notes),
            ContextSection::new(SectionKind::Tools, tools),
            ContextSection::new(SectionKind::Memories, memories),
            ContextSection::new(SectionKind::History, history_items(input.history)),
            ContextSection::new(SectionKind::UserQuery, query),
        ]
    }

    // ── Recall paths ──────────────────────────────────────────────────────

    async fn keyword_recall(&self, query: &str, limit: usize) -> Vec<Memory> {
        self.store
            .search_by_keyword(query, limit)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Keyword recall failed");
                Vec::new()
            })
    }

    async fn semantic_recall(&self, query: &str) -> Vec<ScoredMemory> {
        let Some(embedder) = &self.embedder else {
            return Vec::new();
        };
        let vector = match embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Embedding failed, no semantic recall this turn");
                return Vec::new();
            }
        };
        self.store
            .search_by_vector(&vector, self.config.vector_limit, self.config.min_similarity)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Vector recall failed");
                Vec::new()
            })
    }

    async fn tag_recall(
        &self,
        query: &str,
        limit: usize,
        tag_generator: &dyn TagGenerator,
    ) -> (Vec<String>, Vec<Memory>) {
        let tags = match tag_generator.generate_tags(query).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(error = %e, "Tag generation failed, no tag recall this turn");
                return (Vec::new(), Vec::new());
            }
        };
        if tags.is_empty() {
            return (tags, Vec::new());
        }
        let hits = self
            .store
            .search_by_tags(&tags, limit)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Tag recall failed");
                Vec::new()
            });
        (tags, hits)
    }

    async fn fetch_notes(&self, query: &NoteQuery) -> Vec<Note> {
        self.store.fetch_notes(query).await.unwrap_or_else(|e| {
            warn!(error = %e, "Note fetch failed");
            Vec::new()
        })
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

/// The query recall runs on. Continuation turns (empty query) fall back to
/// the latest user message; short follow-ups borrow it as extra context.
fn augment_query(query: &str, history: &[Message]) -> String {
    let query = query.trim();
    let previous = history
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty());

    match previous {
        None => query.to_string(),
        Some(prev) if query.is_empty() => prev.to_string(),
        Some(prev) if query.split_whitespace().count() < SHORT_QUERY_WORDS => {
            format!("{query} {prev}")
        }
        Some(_) => query.to_string(),
    }
}

/// Union of the three recall paths, deduplicated by id and ranked by
/// similarity plus keyword and tag boosts. Ties keep first-seen order
/// (keyword, then semantic, then tag hits).
fn merge_recall(
    keyword: &[Memory],
    semantic: &[ScoredMemory],
    tagged: &[Memory],
    generated_tags: &[String],
    limit: usize,
) -> Vec<Memory> {
    let mut order: Vec<&Memory> = Vec::new();
    let mut scores: HashMap<&str, f32> = HashMap::new();

    let mut seen = HashSet::new();
    let mut admit = |memory: &'_ Memory| seen.insert(memory.id.clone());

    for memory in keyword {
        if admit(memory) {
            order.push(memory);
        }
        *scores.entry(memory.id.as_str()).or_default() += KEYWORD_WEIGHT;
    }
    for hit in semantic {
        if admit(&hit.memory) {
            order.push(&hit.memory);
        }
        *scores.entry(hit.memory.id.as_str()).or_default() += hit.score;
    }
    for memory in tagged {
        if admit(memory) {
            order.push(memory);
        }
        scores.entry(memory.id.as_str()).or_default();
    }

    for memory in order.iter().copied() {
        let overlap = generated_tags
            .iter()
            .filter(|t| memory.shares_tag_with(std::slice::from_ref(*t)))
            .count();
        *scores.entry(memory.id.as_str()).or_default() += overlap as f32 * TAG_BOOST;
    }

    // Stable sort keeps first-seen order on ties
    order.sort_by(|a, b| {
        let sa = scores.get(a.id.as_str()).copied().unwrap_or_default();
        let sb = scores.get(b.id.as_str()).copied().unwrap_or_default();
        sb.total_cmp(&sa)
    });
    order.into_iter().take(limit).cloned().collect()
}

/// One transcript line per message.
fn history_items(history: &[Message]) -> Vec<String> {
    history
        .iter()
        .map(|m| match m.role {
            Role::User => format!("user: {}", m.content),
            Role::System => format!("system: {}", m.content),
            Role::Tool => format!(
                "tool result [{}]: {}",
                m.tool_call_id.as_deref().unwrap_or("?"),
                m.content
            ),
            Role::Assistant => {
                let mut line = format!("assistant: {}", m.content);
                if m.truncated {
                    line.push_str(" [interrupted]");
                }
                for call in &m.tool_calls {
                    line.push_str(&format!(
                        "\nassistant called {}({}) [{}]",
                        call.name, call.arguments, call.id
                    ));
                }
                line
            }
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────
