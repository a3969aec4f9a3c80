//! The conversation loop: one instance per session.
//!
//! ```text
//! Idle ──start──▶ Generating ──tool calls──▶ ToolExecuting ──▶ Generating
//!                     │                                           │
//!                     └───────────── no tool calls ──▶ Idle ◀─────┘
//! ```
//!
//! Any non-idle state moves to `Cancelled` when the turn's cancellation
//! token fires. The token is observed at every suspension point (context
//! assembly, stream reads, tool dispatch, approval), so a stalled collaborator never wedges
//! the loop.
//!
//! Turns within a session are sequential by construction: `run_turn` takes
//! `&mut self`.

use crate::context::{AssemblyInput, ContextAssembler};
use crate::jobs::JobQueue;
use cairn_config::{AgentConfig, ModelConfig};
use cairn_core::error::{Error, RouterError};
use cairn_core::event::{EventBus, TurnEvent};
use cairn_core::message::{Conversation, Message, MessageToolCall, SessionId};
use cairn_core::provider::{ChunkReceiver, ModelProvider, ProviderRequest, StreamChunk};
use cairn_core::tool::{ToolCall, ToolResult};
use cairn_core::value::ToolArguments;
use cairn_router::{SessionRouter, take_explicit_target};
use cairn_workspace::SessionSnapshot;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the loop is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Generating,
    ToolExecuting,
    Cancelled,
}

/// How a user turn ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model answered without requesting tools.
    Completed { text: String },
    /// The turn cap was hit while the model kept calling tools.
    MaxTurnsExceeded { turns: u32 },
    /// Cancelled mid-turn; `partial` is the text streamed before the stop.
    Cancelled { partial: String },
}

/// Per-session loop settings.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Model generations allowed per user turn
    pub max_turns: u32,
    /// Pull the next queued job after a completed turn
    pub auto_continue: bool,
}

impl LoopSettings {
    pub fn from_config(model: &ModelConfig, agent: &AgentConfig) -> Self {
        Self {
            model: model.model.clone(),
            temperature: model.temperature,
            max_tokens: None,
            max_turns: agent.max_turns,
            auto_continue: agent.auto_continue,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&ModelConfig::default(), &AgentConfig::default())
    }
}

/// Text and tool calls of one finished generation.
#[derive(Debug, Default)]
struct Generation {
    text: String,
    calls: Vec<MessageToolCall>,
}

/// Tool call deltas merged by id, in first-seen order.
#[derive(Debug, Default)]
struct PendingCalls {
    calls: Vec<(String, Option<String>, String)>,
}

impl PendingCalls {
    fn absorb(&mut self, chunk: &StreamChunk) {
        for delta in &chunk.tool_calls {
            // An empty id continues the most recent call
            let slot = if delta.id.is_empty() {
                self.calls.last_mut()
            } else if let Some(pos) = self.calls.iter().position(|(id, _, _)| *id == delta.id) {
                self.calls.get_mut(pos)
            } else {
                self.calls.push((delta.id.clone(), None, String::new()));
                self.calls.last_mut()
            };
            let Some((_, name, arguments)) = slot else {
                continue;
            };
            if let Some(n) = &delta.name {
                *name = Some(n.clone());
            }
            arguments.push_str(&delta.arguments);
        }
    }

    fn finish(self) -> Vec<MessageToolCall> {
        self.calls
            .into_iter()
            .map(|(id, name, arguments)| MessageToolCall {
                id,
                name: name.unwrap_or_default(),
                arguments,
            })
            .collect()
    }
}

/// The outcome of one tool call as folded back into history.
struct Executed {
    result: ToolResult,
    error: Option<RouterError>,
    duration_ms: u64,
}

/// Drives generate → execute → generate cycles for one session.
pub struct ConversationLoop {
    session_id: SessionId,
    provider: Arc<dyn ModelProvider>,
    assembler: ContextAssembler,
    router: Arc<SessionRouter>,
    events: Arc<EventBus>,
    jobs: Arc<JobQueue>,
    settings: LoopSettings,
    conversation: Conversation,
    state: LoopState,
}

impl ConversationLoop {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        assembler: ContextAssembler,
        router: Arc<SessionRouter>,
        settings: LoopSettings,
    ) -> Self {
        let session_id = SessionId::from(router.session_id());
        Self {
            conversation: Conversation::new(session_id.clone()),
            session_id,
            provider,
            assembler,
            router,
            events: Arc::new(EventBus::default()),
            jobs: Arc::new(JobQueue::new()),
            settings,
            state: LoopState::Idle,
        }
    }

    /// Publish turn events on a shared bus (usually the router's too).
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_jobs(mut self, jobs: Arc<JobQueue>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Resume from an existing history.
    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn jobs(&self) -> Arc<JobQueue> {
        Arc::clone(&self.jobs)
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Run one user turn to completion, cancellation or the turn cap.
    ///
    /// With auto-continuation on, a completed turn is followed by turns
    /// synthesized from queued jobs until the queue drains, a turn does not
    /// complete, or a loop-detected failure disables continuation. The
    /// outcome of the last turn run is returned.
    pub async fn run_turn(
        &mut self,
        user_message: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, Error> {
        let mut message = user_message.into();
        let mut may_continue = self.settings.auto_continue;

        loop {
            let outcome = self.run_user_turn(message, cancel, &mut may_continue).await;
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.state = LoopState::Idle;
                    self.events.publish(TurnEvent::Error {
                        session_id: self.session_id.to_string(),
                        message: e.to_string(),
                    });
                    return Err(e);
                }
            };

            if !matches!(outcome, TurnOutcome::Completed { .. }) || !may_continue {
                return Ok(outcome);
            }
            let Some(job) = self.jobs.pop() else {
                return Ok(outcome);
            };
            info!(
                session_id = %self.session_id,
                pending = self.jobs.len(),
                "Auto-continuing with queued job"
            );
            message = job;
        }
    }

    async fn run_user_turn(
        &mut self,
        message: String,
        cancel: &CancellationToken,
        may_continue: &mut bool,
    ) -> Result<TurnOutcome, Error> {
        info!(session_id = %self.session_id, "User turn started");
        self.router.reset_loop_window();
        self.conversation.push(Message::user(message.as_str()));

        let mut query = message;
        let mut tool_calls_made = 0;

        for turn in 1..=self.settings.max_turns {
            self.state = LoopState::Generating;
            self.events.publish(TurnEvent::GenerationStarted {
                session_id: self.session_id.to_string(),
                turn,
            });

            let snapshot = self.router.snapshot()?;
            // Assembly waits on auxiliary model calls for tags and summaries
            let request = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                request = self.build_request(&query, &snapshot) => Some(request),
            };
            let Some(request) = request else {
                return Ok(self.cancelled(String::new()));
            };
            debug!(session_id = %self.session_id, turn, messages = request.messages.len(), "Generating");

            let generation = match self.generate(request, cancel).await? {
                Ok(generation) => generation,
                Err(partial) => return Ok(self.cancelled(partial)),
            };

            if generation.calls.is_empty() {
                self.conversation.push(Message::assistant(generation.text.as_str()));
                self.finish_turn(turn, tool_calls_made);
                return Ok(TurnOutcome::Completed {
                    text: generation.text,
                });
            }

            self.state = LoopState::ToolExecuting;
            let mut assistant = Message::assistant(generation.text.as_str());
            assistant.tool_calls = generation.calls.clone();
            self.conversation.push(assistant);

            let executed = self.execute_calls(&generation.calls, &snapshot, cancel).await;
            tool_calls_made += executed.len();
            for (call, outcome) in generation.calls.iter().zip(executed) {
                self.fold_result(call, outcome, may_continue);
            }

            if cancel.is_cancelled() {
                return Ok(self.cancelled(String::new()));
            }

            // Later generations rely on history alone
            query = String::new();
        }

        let turns = self.settings.max_turns;
        warn!(session_id = %self.session_id, turns, "Max turns exceeded");
        self.notice(format!(
            "The operation could not complete: reached the limit of {turns} model turns"
        ));
        self.finish_turn(turns, tool_calls_made);
        Ok(TurnOutcome::MaxTurnsExceeded { turns })
    }

    async fn build_request(&self, query: &str, snapshot: &SessionSnapshot) -> ProviderRequest {
        let messages = &self.conversation.messages;
        // On the first generation the query is the newest history entry
        let history_end = if query.is_empty() {
            messages.len()
        } else {
            messages.len().saturating_sub(1)
        };
        let tools = snapshot.tools.definitions();
        let prompt = self
            .assembler
            .assemble(&AssemblyInput {
                query,
                history: &messages[..history_end],
                tools: &tools,
            })
            .await;

        ProviderRequest {
            model: self.settings.model.clone(),
            messages: prompt.messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            tools,
        }
    }

    /// Stream one generation. The inner `Err` carries the partial text when
    /// cancellation interrupted it.
    async fn generate(
        &self,
        request: ProviderRequest,
        cancel: &CancellationToken,
    ) -> Result<Result<Generation, String>, Error> {
        let mut rx: ChunkReceiver = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Err(String::new())),
            rx = self.provider.stream_completion(request) => rx?,
        };

        let mut text = String::new();
        let mut pending = PendingCalls::default();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Err(text)),
                next = rx.recv() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            if let Some(delta) = chunk.content.as_deref().filter(|d| !d.is_empty()) {
                text.push_str(delta);
                self.events.publish(TurnEvent::ContentDelta {
                    session_id: self.session_id.to_string(),
                    content: delta.to_string(),
                });
            }
            pending.absorb(&chunk);
            if chunk.done {
                break;
            }
        }

        Ok(Ok(Generation {
            text,
            calls: pending.finish(),
        }))
    }

    /// Execute a generation's calls concurrently; results come back in call
    /// order.
    async fn execute_calls(
        &self,
        calls: &[MessageToolCall],
        snapshot: &SessionSnapshot,
        cancel: &CancellationToken,
    ) -> Vec<Executed> {
        for call in calls {
            self.events.publish(TurnEvent::ToolCallRequested {
                session_id: self.session_id.to_string(),
                call_id: call.id.clone(),
                name: call.name.clone(),
            });
        }

        join_all(calls.iter().map(|call| async move {
            let start = Instant::now();
            let parsed = if call.name.is_empty() {
                Err("tool call is missing a name".to_string())
            } else {
                ToolArguments::from_json_str(&call.arguments)
                    .and_then(|mut arguments| {
                        let target = take_explicit_target(&mut arguments)?;
                        Ok((arguments, target))
                    })
                    .map_err(|e| e.to_string())
            };
            let (result, error) = match parsed {
                Err(reason) => (ToolResult::failure(&call.id, reason), None),
                Ok((arguments, target)) => {
                    let tool_call = ToolCall::new(&call.id, &call.name, arguments);
                    match self
                        .router
                        .execute(&tool_call, snapshot, target.as_deref(), cancel)
                        .await
                    {
                        Ok(result) => (result, None),
                        Err(e) => (ToolResult::failure(&call.id, e.to_string()), Some(e)),
                    }
                }
            };
            Executed {
                result,
                error,
                duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            }
        }))
        .await
    }

    fn fold_result(&mut self, call: &MessageToolCall, executed: Executed, may_continue: &mut bool) {
        let session_id = self.session_id.to_string();
        let Executed {
            result,
            error,
            duration_ms,
        } = executed;

        if let Some(e) = &error {
            if e.breaks_auto_continue() && *may_continue {
                debug!(session_id = %session_id, tool = %call.name, "Auto-continuation disabled");
                *may_continue = false;
            }
            if e.is_hard_failure() {
                self.notice(format!("The operation could not complete: {e}"));
            }
        }

        if result.success {
            self.events.publish(TurnEvent::ToolExecutionSucceeded {
                session_id,
                call_id: call.id.clone(),
                name: call.name.clone(),
                duration_ms,
            });
        } else {
            debug!(tool = %call.name, error = ?result.error, "Tool call failed");
            self.events.publish(TurnEvent::ToolExecutionFailed {
                session_id,
                call_id: call.id.clone(),
                name: call.name.clone(),
                error: result.error.clone().unwrap_or_default(),
            });
        }

        self.conversation
            .push(Message::tool_result(&call.id, result.output));
    }

    fn cancelled(&mut self, partial: String) -> TurnOutcome {
        info!(session_id = %self.session_id, partial_len = partial.len(), "Turn cancelled");
        if !partial.is_empty() {
            self.conversation
                .push(Message::truncated_assistant(partial.as_str()));
        }
        self.state = LoopState::Cancelled;
        TurnOutcome::Cancelled { partial }
    }

    fn finish_turn(&mut self, turns: u32, tool_calls_made: usize) {
        self.state = LoopState::Idle;
        info!(session_id = %self.session_id, turns, tool_calls_made, "User turn completed");
        self.events.publish(TurnEvent::TurnCompleted {
            session_id: self.session_id.to_string(),
            turns,
            tool_calls_made,
        });
    }

    fn notice(&self, message: String) {
        self.events.publish(TurnEvent::Notice {
            session_id: self.session_id.to_string(),
            message,
        });
    }
}
