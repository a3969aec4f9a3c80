//! Model and embedding provider traits: the abstraction over LLM backends.
//!
//! A [`ModelProvider`] streams a completion as a sequence of deltas that ends
//! with a `done` chunk. Wire formats of specific vendors are out of scope;
//! implementations translate them into [`StreamChunk`]s.

use crate::error::ProviderError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A request for one model generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use. The utility model is selected by name here too.
    pub model: String,

    /// The prompt, already assembled and budgeted
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    /// A tool-less request, as used for tag generation and summarization.
    pub fn utility(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.0,
            max_tokens: None,
            tools: Vec::new(),
        }
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A fragment of a tool call, keyed by call id.
///
/// The first delta for an id carries the name; argument text arrives in
/// fragments that are concatenated in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: String,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Partial tool call deltas
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }
}

/// Receiving half of a completion stream.
pub type ChunkReceiver = mpsc::Receiver<Result<StreamChunk, ProviderError>>;

/// The model provider trait.
///
/// The conversation loop calls `stream_completion()` for the main generation;
/// the context assembler and token budget use `complete()` with the utility
/// model for tag generation and section summaries.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Start a generation and return a stream of chunks ending with `done`.
    async fn stream_completion(&self, request: ProviderRequest)
    -> Result<ChunkReceiver, ProviderError>;

    /// Run a generation to completion and return its text.
    ///
    /// Default implementation drains `stream_completion()`.
    async fn complete(&self, request: ProviderRequest) -> Result<String, ProviderError> {
        let mut rx = self.stream_completion(request).await?;
        let mut text = String::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(delta) = chunk.content {
                text.push_str(&delta);
            }
            if chunk.done {
                break;
            }
        }
        Ok(text)
    }
}

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedProvider {
        chunks: Vec<StreamChunk>,
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream_completion(
            &self,
            _request: ProviderRequest,
        ) -> Result<ChunkReceiver, ProviderError> {
            let (tx, rx) = mpsc::channel(self.chunks.len().max(1));
            for chunk in self.chunks.clone() {
                let _ = tx.send(Ok(chunk)).await;
            }
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn complete_concatenates_content_until_done() {
        let provider = ScriptedProvider {
            chunks: vec![
                StreamChunk::content("deploy"),
                StreamChunk::content("ment"),
                StreamChunk::done(),
                StreamChunk::content("ignored"),
            ],
        };
        let text = provider
            .complete(ProviderRequest::utility("fast", vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(text, "deployment");
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "read_file".into(),
            description: "Read a file".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "The file to read" }
                },
                "required": ["path"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("read_file"));
        assert!(json.contains("path"));
    }

    #[test]
    fn utility_request_has_no_tools() {
        let req = ProviderRequest::utility("fast", vec![]);
        assert!(req.tools.is_empty());
        assert_eq!(req.temperature, 0.0);
    }
}
