//! File-based memory store: persistent JSON-lines storage.
//!
//! Each line is one tagged record (`memory`, `edge` or `note`). Rows are
//! loaded into an [`InMemoryStore`] on open and the whole snapshot is
//! rewritten after every mutation.
//!
//! Storage location: `~/.cairn/memory/memories.jsonl`

use crate::in_memory::{InMemoryStore, Record};
use async_trait::async_trait;
use cairn_core::error::MemoryError;
use cairn_core::memory::{
    Memory, MemoryEdge, MemoryStore, Note, NoteQuery, PruneReport, PruneRequest, ScoredMemory,
};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A file-backed memory store using JSONL (one JSON object per line).
pub struct FileStore {
    path: PathBuf,
    inner: InMemoryStore,
    /// Serializes snapshot writes; reads go straight to `inner`
    flush_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store at the given path.
    ///
    /// A missing file starts empty (it is created on first write). Corrupted
    /// lines are skipped with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = Self::load_from_disk(&path);
        debug!(path = %path.display(), rows = records.len(), "File memory store loaded");
        Self {
            path,
            inner: InMemoryStore::from_records(records),
            flush_lock: Mutex::new(()),
        }
    }

    /// Default path: `~/.cairn/memory/memories.jsonl`
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".cairn")
            .join("memory")
            .join("memories.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Vec<Record> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Record>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted memory record");
                    None
                }
            })
            .collect()
    }

    async fn flush(&self) -> Result<(), MemoryError> {
        let _guard = self.flush_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for record in self.inner.records() {
            let line = serde_json::to_string(&record).map_err(|e| {
                MemoryError::Storage(format!("Failed to serialize memory record: {e}"))
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        // Write-then-rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, &content)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to replace memory file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl MemoryStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn upsert(&self, memory: Memory) -> Result<String, MemoryError> {
        let id = self.inner.upsert(memory).await?;
        self.flush().await?;
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Memory>, MemoryError> {
        self.inner.get(id).await
    }

    async fn search_by_keyword(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        self.inner.search_by_keyword(query, limit).await
    }

    async fn search_by_vector(
        &self,
        vector: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        self.inner.search_by_vector(vector, limit, min_similarity).await
    }

    async fn search_by_tags(
        &self,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        self.inner.search_by_tags(tags, limit).await
    }

    async fn save_edge(&self, edge: MemoryEdge) -> Result<(), MemoryError> {
        self.inner.save_edge(edge).await?;
        self.flush().await
    }

    async fn edges_from(&self, id: &str) -> Result<Vec<MemoryEdge>, MemoryError> {
        self.inner.edges_from(id).await
    }

    async fn upsert_note(&self, note: Note) -> Result<String, MemoryError> {
        let id = self.inner.upsert_note(note).await?;
        self.flush().await?;
        Ok(id)
    }

    async fn get_note(&self, name: &str) -> Result<Option<Note>, MemoryError> {
        self.inner.get_note(name).await
    }

    async fn fetch_notes(&self, query: &NoteQuery) -> Result<Vec<Note>, MemoryError> {
        self.inner.fetch_notes(query).await
    }

    async fn prune(&self, request: &PruneRequest) -> Result<PruneReport, MemoryError> {
        let report = self.inner.prune(request).await?;
        if report.removed > 0 {
            self.flush().await?;
        }
        Ok(report)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        self.inner.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[tokio::test]
    async fn upsert_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memories.jsonl");

        let store = FileStore::open(&path);
        let id = store.upsert(Memory::new("lang", "Rust is great")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Rust is great"));
        assert!(content.contains(r#""kind":"memory""#));

        let reopened = FileStore::open(&path);
        let memory = reopened.get(&id).await.unwrap().unwrap();
        assert_eq!(memory.content, "Rust is great");
    }

    #[tokio::test]
    async fn edges_and_notes_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("memories.jsonl");

        let store = FileStore::open(&path);
        store.upsert(Memory::new("a", "a").with_id("a")).await.unwrap();
        store.upsert(Memory::new("b", "b").with_id("b")).await.unwrap();
        store
            .save_edge(MemoryEdge {
                source_id: "a".into(),
                target_id: "b".into(),
                relationship: "depends_on".into(),
                weight: 0.8,
            })
            .await
            .unwrap();
        store.upsert_note(Note::new("persona", "Be concise")).await.unwrap();

        let reopened = FileStore::open(&path);
        assert_eq!(reopened.edges_from("a").await.unwrap().len(), 1);
        assert_eq!(
            reopened.get_note("persona").await.unwrap().unwrap().content,
            "Be concise"
        );
    }

    #[tokio::test]
    async fn prune_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memories.jsonl");

        let store = FileStore::open(&path);
        store
            .upsert(Memory::new("tmp", "scratch").with_tags(["scratch"]))
            .await
            .unwrap();
        let report = store
            .prune(&PruneRequest { older_than: None, tags: vec!["scratch".into()], dry_run: false })
            .await
            .unwrap();
        assert_eq!(report.removed, 1);

        let reopened = FileStore::open(&path);
        assert_eq!(reopened.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn handles_missing_file_gracefully() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("absent.jsonl"));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn handles_corrupted_lines() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, r#"{{"kind":"memory","id":"1","title":"t","content":"valid","created_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z"}}"#).unwrap();
        writeln!(tmp, "this is not json").unwrap();
        writeln!(tmp, r#"{{"kind":"memory","id":"2","title":"t","content":"also valid","created_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z"}}"#).unwrap();

        let store = FileStore::open(tmp.path());
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
