//! Memory tools: let the model save, search and relate long-term facts.

use async_trait::async_trait;
use cairn_core::error::ToolError;
use cairn_core::memory::{Memory, MemoryEdge, MemoryStore};
use cairn_core::provider::EmbeddingProvider;
use cairn_core::tool::{Tool, ToolContext, ToolResult};
use cairn_core::value::ToolArguments;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Saves a fact, embedding its content when an embedder is available.
pub struct SaveMemoryTool {
    store: Arc<dyn MemoryStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl SaveMemoryTool {
    pub fn new(store: Arc<dyn MemoryStore>, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self { store, embedder }
    }
}

#[async_trait]
impl Tool for SaveMemoryTool {
    fn name(&self) -> &str {
        "save_memory"
    }

    fn description(&self) -> &str {
        "Save a durable fact to long-term memory so it can be recalled in later turns \
         and sessions. Returns the memory id."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Short title of the fact" },
                "content": { "type": "string", "description": "The fact itself" },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Tags used for later recall"
                }
            },
            "required": ["title", "content"]
        })
    }

    async fn execute(
        &self,
        arguments: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let title = arguments.require_str("title")?;
        let content = arguments.require_str("content")?;
        let mut memory = Memory::new(title, content).with_tags(arguments.str_list("tags"));

        if let Some(embedder) = &self.embedder {
            match embedder.embed(content).await {
                Ok(vector) => memory = memory.with_embedding(vector),
                Err(e) => warn!(error = %e, "Embedding failed, storing memory without vector"),
            }
        }

        match self.store.upsert(memory).await {
            Ok(id) => {
                debug!(id = %id, session_id = %ctx.session_id, "Memory saved");
                Ok(ToolResult::success(&ctx.call_id, format!("Saved memory {id}")))
            }
            Err(e) => Ok(ToolResult::failure(&ctx.call_id, format!("Failed to save memory: {e}"))),
        }
    }
}

#[derive(Serialize)]
struct MemoryHit<'a> {
    id: &'a str,
    title: &'a str,
    content: &'a str,
    tags: Vec<&'a str>,
}

/// Keyword search over stored memories.
pub struct SearchMemoryTool {
    store: Arc<dyn MemoryStore>,
}

impl SearchMemoryTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SearchMemoryTool {
    fn name(&self) -> &str {
        "search_memory"
    }

    fn description(&self) -> &str {
        "Search your long-term memory for relevant facts. Use this when you need to recall \
         something you've learned or been told before."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to find relevant memories"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of memories to return (default 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let query = arguments.require_str("query")?;
        let limit = arguments.f64("limit").map(|l| l.max(1.0) as usize).unwrap_or(5).min(50);

        let memories = match self.store.search_by_keyword(query, limit).await {
            Ok(memories) => memories,
            Err(e) => {
                return Ok(ToolResult::failure(&ctx.call_id, format!("Memory search failed: {e}")));
            }
        };

        if memories.is_empty() {
            return Ok(ToolResult::success(
                &ctx.call_id,
                format!("No memories found matching '{query}'."),
            ));
        }

        let hits: Vec<MemoryHit<'_>> = memories
            .iter()
            .map(|m| MemoryHit {
                id: &m.id,
                title: &m.title,
                content: &m.content,
                tags: m.tags.iter().map(String::as_str).collect(),
            })
            .collect();
        let output = serde_json::to_string_pretty(&hits)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;
        Ok(ToolResult::success(&ctx.call_id, output))
    }
}

/// Records a weighted relation between two existing memories.
pub struct LinkMemoriesTool {
    store: Arc<dyn MemoryStore>,
}

impl LinkMemoriesTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for LinkMemoriesTool {
    fn name(&self) -> &str {
        "link_memories"
    }

    fn description(&self) -> &str {
        "Relate two saved memories, e.g. 'depends_on' or 'contradicts'. Both ids must exist."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "source_id": { "type": "string" },
                "target_id": { "type": "string" },
                "relationship": { "type": "string", "description": "Relation name" },
                "weight": {
                    "type": "number",
                    "description": "Strength between 0 and 1 (default 0.5)",
                    "default": 0.5
                }
            },
            "required": ["source_id", "target_id", "relationship"]
        })
    }

    async fn execute(
        &self,
        arguments: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let edge = MemoryEdge {
            source_id: arguments.require_str("source_id")?.to_string(),
            target_id: arguments.require_str("target_id")?.to_string(),
            relationship: arguments.require_str("relationship")?.to_string(),
            weight: arguments.f64("weight").unwrap_or(0.5) as f32,
        };
        let summary = format!(
            "Linked {} -[{}]-> {}",
            edge.source_id, edge.relationship, edge.target_id
        );

        match self.store.save_edge(edge).await {
            Ok(()) => Ok(ToolResult::success(&ctx.call_id, summary)),
            Err(e) => Ok(ToolResult::failure(&ctx.call_id, e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::error::ProviderError;
    use cairn_memory::InMemoryStore;

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Err(ProviderError::EmbeddingFailed("offline".into()))
        }
    }

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![1.0, 0.0])
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            call_id: "call_1".into(),
            ..Default::default()
        }
    }

    fn save_args() -> ToolArguments {
        let mut args = ToolArguments::new()
            .with("title", "deploys")
            .with("content", "Deployment goes through staging first");
        args.insert(
            "tags",
            cairn_core::value::ToolValue::Array(vec!["Deploy".into()]),
        );
        args
    }

    #[tokio::test]
    async fn save_memory_embeds_content() {
        let store = Arc::new(InMemoryStore::new());
        let tool = SaveMemoryTool::new(store.clone(), Some(Arc::new(FixedEmbedder)));

        let result = tool.execute(&save_args(), &ctx()).await.unwrap();
        assert!(result.success);

        let hits = store.search_by_vector(&[1.0, 0.0], 5, 0.9).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].memory.tags.contains("deploy"));
    }

    #[tokio::test]
    async fn save_memory_survives_embedding_failure() {
        let store = Arc::new(InMemoryStore::new());
        let tool = SaveMemoryTool::new(store.clone(), Some(Arc::new(FailingEmbedder)));

        let result = tool.execute(&save_args(), &ctx()).await.unwrap();
        assert!(result.success);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.search_by_vector(&[1.0, 0.0], 5, 0.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_memory_reports_no_hits() {
        let store = Arc::new(InMemoryStore::new());
        let tool = SearchMemoryTool::new(store);
        let args = ToolArguments::new().with("query", "deployment");
        let result = tool.execute(&args, &ctx()).await.unwrap();
        assert!(result.success);
        assert!(result.output.contains("No memories found"));
    }

    #[tokio::test]
    async fn search_memory_returns_json_hits() {
        let store = Arc::new(InMemoryStore::new());
        SaveMemoryTool::new(store.clone(), None)
            .execute(&save_args(), &ctx())
            .await
            .unwrap();

        let args = ToolArguments::new().with("query", "staging").with("limit", 3.0);
        let result = SearchMemoryTool::new(store).execute(&args, &ctx()).await.unwrap();
        let hits: serde_json::Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(hits[0]["title"], "deploys");
    }

    #[tokio::test]
    async fn link_memories_rejects_unknown_ids() {
        let store = Arc::new(InMemoryStore::new());
        let tool = LinkMemoriesTool::new(store);
        let args = ToolArguments::new()
            .with("source_id", "a")
            .with("target_id", "b")
            .with("relationship", "depends_on");
        let result = tool.execute(&args, &ctx()).await.unwrap();
        assert!(!result.success);
        assert!(result.output.contains("does not exist"));
    }
}
