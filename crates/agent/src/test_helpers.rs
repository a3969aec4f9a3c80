//! Scripted collaborators for exercising the conversation loop without a
//! real model backend.

use async_trait::async_trait;
use cairn_core::error::ProviderError;
use cairn_core::provider::{
    ChunkReceiver, ModelProvider, ProviderRequest, StreamChunk, ToolCallDelta,
};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// One scripted generation.
#[derive(Debug, Clone)]
pub enum Script {
    /// Stream these chunks, then close.
    Chunks(Vec<StreamChunk>),
    /// Stream these chunks, then stall without ever finishing.
    Stall(Vec<StreamChunk>),
    /// Fail before streaming.
    Fail(ProviderError),
}

/// A provider that answers each `stream_completion` with the next script.
///
/// With [`repeat_last`](Self::repeat_last) set, the final script is replayed
/// forever; otherwise running out of scripts is a provider error.
pub struct SequentialMockProvider {
    scripts: Mutex<VecDeque<Script>>,
    last: Mutex<Option<Script>>,
    repeat_last: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            last: Mutex::new(None),
            repeat_last: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![Script::Chunks(text_response(text))])
    }

    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn next_script(&self) -> Option<Script> {
        let next = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match next {
            Some(script) => {
                *last = Some(script.clone());
                Some(script)
            }
            None if self.repeat_last => last.clone(),
            None => None,
        }
    }
}

#[async_trait]
impl ModelProvider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn stream_completion(
        &self,
        request: ProviderRequest,
    ) -> Result<ChunkReceiver, ProviderError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let script = self.next_script().ok_or_else(|| {
            ProviderError::NotConfigured("no scripted response left".into())
        })?;

        let (chunks, stall) = match script {
            Script::Chunks(chunks) => (chunks, false),
            Script::Stall(chunks) => (chunks, true),
            Script::Fail(e) => return Err(e),
        };

        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            if stall {
                // Hold the sender open until the receiver goes away
                tx.closed().await;
            }
        });
        Ok(rx)
    }
}

/// A text answer streamed in two halves.
pub fn text_response(text: &str) -> Vec<StreamChunk> {
    let (head, tail) = halves(text);
    vec![
        StreamChunk::content(head),
        StreamChunk::content(tail),
        StreamChunk::done(),
    ]
}

/// Tool calls streamed as deltas: the name first, then the arguments in two
/// fragments.
pub fn tool_call_response(calls: &[(&str, &str, serde_json::Value)]) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    for (id, name, arguments) in calls {
        let raw = arguments.to_string();
        let (head, tail) = halves(&raw);
        chunks.push(StreamChunk {
            tool_calls: vec![ToolCallDelta {
                id: (*id).into(),
                name: Some((*name).into()),
                arguments: head.into(),
            }],
            ..StreamChunk::default()
        });
        chunks.push(StreamChunk {
            tool_calls: vec![ToolCallDelta {
                id: (*id).into(),
                name: None,
                arguments: tail.into(),
            }],
            ..StreamChunk::default()
        });
    }
    chunks.push(StreamChunk::done());
    chunks
}

fn halves(text: &str) -> (&str, &str) {
    let mid = (0..=text.len() / 2)
        .rev()
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(0);
    text.split_at(mid)
}
