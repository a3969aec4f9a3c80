//! In-memory store: useful for testing and ephemeral sessions.
//!
//! Each row lives in its own `DashMap` shard, so readers never block each
//! other and writers only contend on the row they touch.

use crate::vector::{rank_by_keyword, rank_by_similarity, rank_by_tags};
use async_trait::async_trait;
use cairn_core::error::MemoryError;
use cairn_core::memory::{
    Memory, MemoryEdge, MemoryStore, Note, NoteQuery, PruneReport, PruneRequest, ScoredMemory,
};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// One persisted row. Used by the file store's JSONL snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Record {
    Memory(Memory),
    Edge(MemoryEdge),
    Note(Note),
}

/// An in-memory store keyed by memory id, edge source and note name.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    memories: DashMap<String, Memory>,
    edges: DashMap<String, Vec<MemoryEdge>>,
    notes: DashMap<String, Note>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        for record in records {
            match record {
                Record::Memory(m) => {
                    store.memories.insert(m.id.clone(), m);
                }
                Record::Edge(e) => store.edges.entry(e.source_id.clone()).or_default().push(e),
                Record::Note(n) => {
                    store.notes.insert(n.name.clone(), n);
                }
            }
        }
        store
    }

    /// Every row, memories first, each group sorted by key so snapshots diff
    /// cleanly.
    pub(crate) fn records(&self) -> Vec<Record> {
        let mut memories: Vec<Memory> = self.memories.iter().map(|r| r.value().clone()).collect();
        memories.sort_by(|a, b| a.id.cmp(&b.id));

        let mut edges: Vec<MemoryEdge> = self
            .edges
            .iter()
            .flat_map(|r| r.value().clone())
            .collect();
        edges.sort_by(|a, b| {
            (&a.source_id, &a.target_id, &a.relationship)
                .cmp(&(&b.source_id, &b.target_id, &b.relationship))
        });

        let mut notes: Vec<Note> = self.notes.iter().map(|r| r.value().clone()).collect();
        notes.sort_by(|a, b| a.name.cmp(&b.name));

        memories
            .into_iter()
            .map(Record::Memory)
            .chain(edges.into_iter().map(Record::Edge))
            .chain(notes.into_iter().map(Record::Note))
            .collect()
    }

    fn snapshot_memories(&self) -> Vec<Memory> {
        self.memories.iter().map(|r| r.value().clone()).collect()
    }

    fn invalid_edge(edge: &MemoryEdge, reason: &str) -> MemoryError {
        MemoryError::InvalidEdge {
            source_id: edge.source_id.clone(),
            target_id: edge.target_id.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn upsert(&self, mut memory: Memory) -> Result<String, MemoryError> {
        if memory.id.is_empty() {
            memory.id = Uuid::new_v4().to_string();
        }
        let id = memory.id.clone();
        memory.updated_at = Utc::now();

        match self.memories.entry(id.clone()) {
            Entry::Occupied(mut existing) => {
                memory.created_at = existing.get().created_at;
                existing.insert(memory);
            }
            Entry::Vacant(slot) => {
                slot.insert(memory);
            }
        }
        debug!(id = %id, "Memory upserted");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Memory>, MemoryError> {
        Ok(self.memories.get(id).map(|r| r.value().clone()))
    }

    async fn search_by_keyword(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        let memories = self.snapshot_memories();
        Ok(rank_by_keyword(&memories, query, limit))
    }

    async fn search_by_vector(
        &self,
        vector: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        let memories = self.snapshot_memories();
        Ok(rank_by_similarity(&memories, vector, limit, min_similarity))
    }

    async fn search_by_tags(
        &self,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let memories = self.snapshot_memories();
        Ok(rank_by_tags(&memories, tags, limit))
    }

    async fn save_edge(&self, mut edge: MemoryEdge) -> Result<(), MemoryError> {
        if edge.source_id == edge.target_id {
            return Err(Self::invalid_edge(&edge, "a memory cannot relate to itself"));
        }
        if edge.relationship.trim().is_empty() {
            return Err(Self::invalid_edge(&edge, "relationship is empty"));
        }
        if !self.memories.contains_key(&edge.target_id) {
            return Err(Self::invalid_edge(&edge, "target memory does not exist"));
        }
        edge.weight = if edge.weight.is_nan() { 0.0 } else { edge.weight.clamp(0.0, 1.0) };

        // Holding the source row keeps a concurrent prune from orphaning the edge.
        let Some(_source) = self.memories.get(&edge.source_id) else {
            return Err(Self::invalid_edge(&edge, "source memory does not exist"));
        };
        let mut outgoing = self.edges.entry(edge.source_id.clone()).or_default();
        outgoing.retain(|e| !(e.target_id == edge.target_id && e.relationship == edge.relationship));
        outgoing.push(edge);
        Ok(())
    }

    async fn edges_from(&self, id: &str) -> Result<Vec<MemoryEdge>, MemoryError> {
        Ok(self.edges.get(id).map(|r| r.value().clone()).unwrap_or_default())
    }

    async fn upsert_note(&self, mut note: Note) -> Result<String, MemoryError> {
        let name = note.name.trim().to_string();
        if name.is_empty() {
            return Err(MemoryError::Storage("note name is empty".into()));
        }
        note.name = name.clone();
        note.updated_at = Utc::now();

        match self.notes.entry(name) {
            Entry::Occupied(mut existing) => {
                note.id = existing.get().id.clone();
                existing.insert(note.clone());
            }
            Entry::Vacant(slot) => {
                if note.id.is_empty() {
                    note.id = Uuid::new_v4().to_string();
                }
                slot.insert(note.clone());
            }
        }
        Ok(note.id)
    }

    async fn get_note(&self, name: &str) -> Result<Option<Note>, MemoryError> {
        Ok(self.notes.get(name.trim()).map(|r| r.value().clone()))
    }

    async fn fetch_notes(&self, query: &NoteQuery) -> Result<Vec<Note>, MemoryError> {
        let mut notes: Vec<Note> = self
            .notes
            .iter()
            .filter(|r| {
                let note = r.value();
                (query.include_always_append && note.always_append)
                    || query.text.as_deref().is_some_and(|t| note.matches(t))
            })
            .map(|r| r.value().clone())
            .collect();
        notes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(notes)
    }

    async fn prune(&self, request: &PruneRequest) -> Result<PruneReport, MemoryError> {
        let mut matched: Vec<String> = self
            .memories
            .iter()
            .filter(|r| request.matches(r.value()))
            .map(|r| r.key().clone())
            .collect();
        matched.sort();

        if request.dry_run {
            return Ok(PruneReport {
                matched,
                removed: 0,
                dry_run: true,
            });
        }

        let mut removed = 0;
        for id in &matched {
            if self.memories.remove(id).is_some() {
                removed += 1;
            }
            self.edges.remove(id);
        }
        self.edges.iter_mut().for_each(|mut r| {
            r.value_mut().retain(|e| !matched.contains(&e.target_id));
        });
        self.edges.retain(|_, outgoing| !outgoing.is_empty());

        debug!(removed, "Memories pruned");
        Ok(PruneReport {
            matched,
            removed,
            dry_run: false,
        })
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.memories.len())
    }
}
