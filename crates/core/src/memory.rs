//! Memory store trait: durable long-term facts, their relations, and notes.
//!
//! The store supports three independent recall paths:
//! - Keyword search over title and content
//! - Vector similarity search over stored embeddings
//! - Tag search over the memory's tag set
//!
//! Notes are durable project/persona instructions; some of them are flagged
//! to be appended to every prompt.

use crate::error::MemoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A single long-term fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Stable identity; never changes after creation
    pub id: String,

    pub title: String,

    pub content: String,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// Embedding of `content`, when one could be generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Memory {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            tags: BTreeSet::new(),
            embedding: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(|t| normalize_tag(&t.into())).collect();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Whether any of this memory's tags appear in `tags`.
    pub fn shares_tag_with(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.tags.contains(&normalize_tag(t)))
    }
}

/// Tags are compared case-insensitively and without surrounding whitespace.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// A memory paired with the similarity that recalled it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub memory: Memory,
    pub score: f32,
}

/// A directed, weighted relation between two memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEdge {
    pub source_id: String,
    pub target_id: String,
    pub relationship: String,
    /// Clamped to `[0, 1]` on save
    pub weight: f32,
}

/// A durable instruction document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    /// Gates the edit tool; the store itself does not enforce it
    #[serde(default)]
    pub is_readonly: bool,
    /// Appended to the prompt on every turn
    #[serde(default)]
    pub always_append: bool,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            content: content.into(),
            tags: BTreeSet::new(),
            is_readonly: false,
            always_append: false,
            updated_at: Utc::now(),
        }
    }

    /// Case-insensitive match against name, description and tags.
    pub fn matches(&self, text: &str) -> bool {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        let name = self.name.to_lowercase();
        let description = self.description.to_lowercase();
        name.contains(&needle)
            || (!name.is_empty() && needle.contains(&name))
            || (!description.is_empty() && description.contains(&needle))
            || self.tags.iter().any(|t| needle.split_whitespace().any(|w| w == t))
    }
}

/// Which notes to fetch for a turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteQuery {
    /// Include notes flagged `always_append`
    pub include_always_append: bool,
    /// Include notes whose name, description or tags match this text
    #[serde(default)]
    pub text: Option<String>,
}

/// Criteria for pruning memories. All given criteria must match; a request
/// with no criteria matches nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneRequest {
    #[serde(default)]
    pub older_than: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
}

impl PruneRequest {
    pub fn has_criteria(&self) -> bool {
        self.older_than.is_some() || !self.tags.is_empty()
    }

    pub fn matches(&self, memory: &Memory) -> bool {
        if !self.has_criteria() {
            return false;
        }
        let age_ok = self.older_than.is_none_or(|cutoff| memory.updated_at < cutoff);
        let tags_ok = self.tags.is_empty() || memory.shares_tag_with(&self.tags);
        age_ok && tags_ok
    }
}

/// Outcome of a prune call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PruneReport {
    /// Ids that matched the request
    pub matched: Vec<String>,
    /// How many were actually removed (0 on dry run)
    pub removed: usize,
    pub dry_run: bool,
}

/// The durable store of long-term facts and notes.
///
/// Implementations: in-memory (tests, ephemeral sessions) and JSONL file.
/// All methods take `&self`; implementations serialize writers internally.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "file").
    fn name(&self) -> &str;

    /// Insert or update a memory, returning its id. `created_at` of an
    /// existing memory is preserved.
    async fn upsert(&self, memory: Memory) -> Result<String, MemoryError>;

    async fn get(&self, id: &str) -> Result<Option<Memory>, MemoryError>;

    /// Keyword search over title and content.
    async fn search_by_keyword(&self, query: &str, limit: usize)
    -> Result<Vec<Memory>, MemoryError>;

    /// Cosine similarity search, highest first, cut off at `min_similarity`.
    async fn search_by_vector(
        &self,
        vector: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredMemory>, MemoryError>;

    /// Memories sharing at least one tag, most overlapping first.
    async fn search_by_tags(&self, tags: &[String], limit: usize)
    -> Result<Vec<Memory>, MemoryError>;

    /// Save a relation. Both endpoints must already exist.
    async fn save_edge(&self, edge: MemoryEdge) -> Result<(), MemoryError>;

    /// Outgoing edges of a memory.
    async fn edges_from(&self, id: &str) -> Result<Vec<MemoryEdge>, MemoryError>;

    async fn upsert_note(&self, note: Note) -> Result<String, MemoryError>;

    async fn get_note(&self, name: &str) -> Result<Option<Note>, MemoryError>;

    async fn fetch_notes(&self, query: &NoteQuery) -> Result<Vec<Note>, MemoryError>;

    /// Remove memories matching the request (nothing is removed on dry run).
    async fn prune(&self, request: &PruneRequest) -> Result<PruneReport, MemoryError>;

    async fn count(&self) -> Result<usize, MemoryError>;
}
