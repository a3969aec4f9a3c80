//! Turn-lifecycle events.
//!
//! The conversation loop publishes these as a turn progresses. A transport
//! layer can subscribe and forward them (for example as server-sent events);
//! the encoding on the wire is the transport's business.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events emitted while a turn runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A model generation is starting
    GenerationStarted { session_id: String, turn: u32 },

    /// Partial text from the model
    ContentDelta { session_id: String, content: String },

    /// The model asked for a tool
    ToolCallRequested {
        session_id: String,
        call_id: String,
        name: String,
    },

    /// The router resolved a workspace and is about to execute
    ToolExecutionAttempting {
        session_id: String,
        call_id: String,
        name: String,
        workspace_id: String,
    },

    ToolExecutionSucceeded {
        session_id: String,
        call_id: String,
        name: String,
        duration_ms: u64,
    },

    ToolExecutionFailed {
        session_id: String,
        call_id: String,
        name: String,
        error: String,
    },

    /// The user turn reached Idle
    TurnCompleted {
        session_id: String,
        turns: u32,
        tool_calls_made: usize,
    },

    /// Something the end user must see directly rather than through the
    /// model's reply (sandbox violations, max turns)
    Notice { session_id: String, message: String },

    Error { session_id: String, message: String },
}

impl TurnEvent {
    /// Stable event name, suitable as an SSE `event:` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::GenerationStarted { .. } => "generation_started",
            Self::ContentDelta { .. } => "content_delta",
            Self::ToolCallRequested { .. } => "tool_call_requested",
            Self::ToolExecutionAttempting { .. } => "tool_execution_attempting",
            Self::ToolExecutionSucceeded { .. } => "tool_execution_succeeded",
            Self::ToolExecutionFailed { .. } => "tool_execution_failed",
            Self::TurnCompleted { .. } => "turn_completed",
            Self::Notice { .. } => "notice",
            Self::Error { .. } => "error",
        }
    }
}

/// A broadcast-based event bus for turn events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<TurnEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: TurnEvent) {
        let event_type = event.event_type();
        if self.sender.send(Arc::new(event)).is_err() {
            tracing::trace!(event_type, "No subscribers for turn event");
        }
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TurnEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
