// ABOUTME: Streaming completion relay orchestrating one chat turn end to end
// ABOUTME: Persists the user message, streams model output, executes tools, finalizes storage
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Completion Relay
//!
//! One turn moves through `received → user-persisted → model-invoked →
//! streaming → finalizing → done`, with `error` reachable from any step.
//! The relay reconciles three timelines: the caller's HTTP stream, the
//! upstream provider stream, and the database writes. The caller starts
//! receiving output before the reply is known; the full assistant message is
//! accumulated alongside and persisted once the provider stream completes.
//!
//! The turn body runs in a detached task: if the caller disconnects
//! mid-stream, the provider stream is still consumed to completion so the
//! assistant message can be persisted.

/// Output accumulation and streamed tool-call assembly
pub mod accumulator;

pub use accumulator::{ToolCallAssembler, TurnAccumulator};

use crate::database::chat::{ChatStore, MessageRecord, DEFAULT_TITLE};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::llm::{prompts, ChatMessage, ChatRequest, FunctionCall, LlmProvider};
use crate::models::{text_content, MessagePart, NewMessage, ToolCallState};
use crate::titles::TitleGenerator;
use crate::tools::{ToolOutcome, ToolRegistry};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Maximum number of tool-call rounds before the turn is cut off
const MAX_TOOL_ITERATIONS: usize = 10;

/// Buffered events between the turn task and the HTTP response stream
const EVENT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Turn Events
// ============================================================================

/// Event forwarded to the caller over the turn's response stream
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TurnEvent {
    /// Echo of the persisted user message, sent first
    UserMessage {
        /// The stored user message
        message: MessageRecord,
    },
    /// Incremental assistant text
    TextDelta {
        /// Text fragment to append
        delta: String,
    },
    /// A tool call became fully specified and is about to execute
    ToolInputAvailable {
        /// Provider-assigned call id
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Tool being invoked
        #[serde(rename = "toolName")]
        tool_name: String,
        /// Input payload
        input: Value,
    },
    /// A tool call produced output
    ToolOutputAvailable {
        /// Provider-assigned call id
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Executor output
        output: Value,
    },
    /// A tool call failed
    ToolOutputError {
        /// Provider-assigned call id
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Captured error text
        #[serde(rename = "errorText")]
        error_text: String,
    },
    /// Completion marker carrying the finalized assistant message
    Finish {
        /// The assistant message as persisted (or as delivered, when the
        /// finalize write failed and was logged)
        message: MessageRecord,
    },
    /// Error marker terminating the stream
    Error {
        /// Human-readable error message
        message: String,
    },
}

/// The new user message submitted with a turn
#[derive(Debug, Clone)]
pub struct TurnMessage {
    /// Client-supplied message id, honored when present
    pub id: Option<String>,
    /// Message content parts
    pub parts: Vec<MessagePart>,
}

// ============================================================================
// Relay
// ============================================================================

/// Orchestrates chat turns against the store, provider, and tool registry
#[derive(Clone)]
pub struct CompletionRelay {
    store: ChatStore,
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    titles: TitleGenerator,
}

impl CompletionRelay {
    /// Create a relay over its collaborators
    #[must_use]
    pub fn new(
        store: ChatStore,
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        titles: TitleGenerator,
    ) -> Self {
        Self {
            store,
            provider,
            tools,
            titles,
        }
    }

    /// Start a turn: validate, persist the user message, and begin streaming
    ///
    /// Runs the pre-stream steps synchronously so authorization and
    /// validation failures reject the request before any output is produced,
    /// then spawns the streaming body and returns its event stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is empty, the conversation is owned
    /// by another user, or a pre-stream database write fails
    #[instrument(skip(self, message), fields(conversation_id = %conversation_id, user_id = %user_id))]
    pub async fn start_turn(
        &self,
        user_id: &str,
        conversation_id: &str,
        message: TurnMessage,
    ) -> AppResult<ReceiverStream<TurnEvent>> {
        if conversation_id.trim().is_empty() {
            return Err(AppError::new(
                ErrorCode::MissingRequiredField,
                "conversationId is required",
            ));
        }
        if message.parts.is_empty() {
            return Err(AppError::new(
                ErrorCode::MissingRequiredField,
                "Turn message has no content parts",
            ));
        }

        // Ownership is checked before any side effect. A conversation owned
        // by someone else fails closed without revealing whether it exists.
        match self.store.get_conversation_owner(conversation_id).await? {
            Some(owner) if owner != user_id => {
                return Err(AppError::new(
                    ErrorCode::PermissionDenied,
                    "Access denied",
                ));
            }
            Some(_) => {}
            None => {
                self.store
                    .create_conversation_with_id(conversation_id, user_id, DEFAULT_TITLE)
                    .await?;
                self.spawn_title_task(conversation_id, user_id, text_content(&message.parts));
            }
        }

        // The user message is durable before the model is invoked, so a crash
        // from here on never loses the user's input.
        let user_record = self
            .store
            .append_message(
                conversation_id,
                NewMessage {
                    id: message.id,
                    role: crate::llm::MessageRole::User,
                    parts: message.parts,
                    attachments: Vec::new(),
                },
            )
            .await?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let relay = self.clone();
        let conversation_id = conversation_id.to_owned();

        tokio::spawn(async move {
            relay.run_stream(&conversation_id, user_record, &tx).await;
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Fire-and-forget title generation for a newly created conversation
    ///
    /// The update writes through the same ownership-checked rename path as a
    /// user-initiated rename; failure is logged and the placeholder stays.
    fn spawn_title_task(&self, conversation_id: &str, user_id: &str, first_user_text: String) {
        let titles = self.titles.clone();
        let store = self.store.clone();
        let conversation_id = conversation_id.to_owned();
        let user_id = user_id.to_owned();

        tokio::spawn(async move {
            match titles.generate(&first_user_text).await {
                Ok(title) => {
                    debug!("Generated title for {}: {}", conversation_id, title);
                    match store
                        .rename_conversation(&conversation_id, &user_id, &title)
                        .await
                    {
                        Ok(true) => {}
                        // Conversation already deleted; nothing to update
                        Ok(false) => debug!("Title update skipped for {}", conversation_id),
                        Err(e) => warn!("Failed to store generated title: {}", e),
                    }
                }
                Err(e) => warn!("Title generation failed: {}", e),
            }
        });
    }

    /// The streaming turn body: model invocation, tool rounds, finalization
    async fn run_stream(
        &self,
        conversation_id: &str,
        user_record: MessageRecord,
        tx: &mpsc::Sender<TurnEvent>,
    ) {
        emit(
            tx,
            TurnEvent::UserMessage {
                message: user_record,
            },
        )
        .await;

        let mut transcript = match self.load_transcript(conversation_id).await {
            Ok(transcript) => transcript,
            Err(e) => {
                error!("Failed to load transcript: {}", e);
                emit(
                    tx,
                    TurnEvent::Error {
                        message: e.to_string(),
                    },
                )
                .await;
                return;
            }
        };

        let tool_definitions = self.tools.definitions();
        let mut accumulator = TurnAccumulator::new();
        let mut errored = false;

        'turn: for iteration in 0..MAX_TOOL_ITERATIONS {
            let request = ChatRequest::new(transcript.clone())
                .with_streaming()
                .with_tools(tool_definitions.clone());

            let mut stream = match self.provider.complete_stream(&request).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Provider stream failed to start: {}", e);
                    emit(
                        tx,
                        TurnEvent::Error {
                            message: e.to_string(),
                        },
                    )
                    .await;
                    errored = true;
                    break 'turn;
                }
            };

            let mut assembler = ToolCallAssembler::new();
            let mut round_text = String::new();
            let mut finish_reason = None;

            while let Some(chunk_result) = stream.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        if !chunk.delta.is_empty() {
                            round_text.push_str(&chunk.delta);
                            accumulator.push_text(&chunk.delta);
                            emit(
                                tx,
                                TurnEvent::TextDelta {
                                    delta: chunk.delta,
                                },
                            )
                            .await;
                        }
                        assembler.absorb(&chunk.tool_call_deltas);
                        if chunk.is_final {
                            finish_reason = chunk.finish_reason;
                        }
                    }
                    Err(e) => {
                        error!("Provider stream error: {}", e);
                        emit(
                            tx,
                            TurnEvent::Error {
                                message: e.to_string(),
                            },
                        )
                        .await;
                        errored = true;
                        break 'turn;
                    }
                }
            }

            if assembler.is_empty() {
                // Plain text round: the reply is complete
                debug!(
                    "Turn complete after {} iteration(s), finish_reason: {:?}",
                    iteration + 1,
                    finish_reason
                );
                break 'turn;
            }

            let calls = match assembler.finish() {
                Ok(calls) => calls,
                Err(e) => {
                    error!("Failed to assemble tool calls: {}", e);
                    emit(
                        tx,
                        TurnEvent::Error {
                            message: e.to_string(),
                        },
                    )
                    .await;
                    errored = true;
                    break 'turn;
                }
            };

            info!(
                "Iteration {}: executing {} tool call(s)",
                iteration,
                calls.len()
            );

            transcript.push(ChatMessage::Assistant {
                content: round_text,
                tool_calls: calls.clone(),
            });

            for call in calls {
                self.execute_tool_call(&call, &mut accumulator, &mut transcript, tx)
                    .await;
            }
        }

        self.finalize(conversation_id, accumulator, errored, tx)
            .await;
    }

    /// Execute one tool call, record its final state, and extend the transcript
    async fn execute_tool_call(
        &self,
        call: &FunctionCall,
        accumulator: &mut TurnAccumulator,
        transcript: &mut Vec<ChatMessage>,
        tx: &mpsc::Sender<TurnEvent>,
    ) {
        emit(
            tx,
            TurnEvent::ToolInputAvailable {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                input: call.arguments.clone(),
            },
        )
        .await;

        match self.tools.execute(&call.name, call.arguments.clone()).await {
            ToolOutcome::Output(output) => {
                accumulator.push_tool_output(call, output.clone());
                transcript.push(ChatMessage::ToolResult {
                    tool_call_id: call.id.clone(),
                    content: output.to_string(),
                });
                emit(
                    tx,
                    TurnEvent::ToolOutputAvailable {
                        tool_call_id: call.id.clone(),
                        output,
                    },
                )
                .await;
            }
            ToolOutcome::Error(error_text) => {
                accumulator.push_tool_error(call, error_text.clone());
                transcript.push(ChatMessage::ToolResult {
                    tool_call_id: call.id.clone(),
                    content: serde_json::json!({ "error": error_text }).to_string(),
                });
                emit(
                    tx,
                    TurnEvent::ToolOutputError {
                        tool_call_id: call.id.clone(),
                        error_text,
                    },
                )
                .await;
            }
        }
    }

    /// Persist the accumulated assistant message and close the stream
    ///
    /// A persistence failure here is logged but does not retro-fail the
    /// stream the caller already received; the finish marker still carries
    /// the delivered content.
    async fn finalize(
        &self,
        conversation_id: &str,
        accumulator: TurnAccumulator,
        errored: bool,
        tx: &mpsc::Sender<TurnEvent>,
    ) {
        if errored {
            return;
        }

        let Some(message) = accumulator.into_message() else {
            emit(
                tx,
                TurnEvent::Error {
                    message: "Model produced no output".to_owned(),
                },
            )
            .await;
            return;
        };

        let fallback = unsaved_record(conversation_id, &message);

        match self.store.append_message(conversation_id, message).await {
            Ok(record) => {
                emit(tx, TurnEvent::Finish { message: record }).await;
            }
            Err(e) => {
                // Silent data loss of the assistant reply; surfaced through
                // logs for monitoring, never retried inline (a retry would
                // risk duplicate assistant messages).
                error!(
                    "Failed to persist assistant message for {}: {}",
                    conversation_id, e
                );
                emit(tx, TurnEvent::Finish { message: fallback }).await;
            }
        }
    }

    /// Load the stored history as a provider transcript with the system prompt
    async fn load_transcript(&self, conversation_id: &str) -> AppResult<Vec<ChatMessage>> {
        let history = self.store.list_messages(conversation_id).await?;

        let mut transcript = Vec::with_capacity(history.len() + 1);
        transcript.push(ChatMessage::system(prompts::chat_system_prompt()));
        for record in &history {
            transcript.extend(transcript_entries(record));
        }

        Ok(transcript)
    }
}

/// Convert one stored message into provider transcript entries
///
/// Assistant messages with tool invocations are replayed as a tool-call turn
/// followed by the recorded tool results, so the model sees the same call
/// structure it originally produced.
fn transcript_entries(record: &MessageRecord) -> Vec<ChatMessage> {
    let text = text_content(&record.parts);

    match record.role.as_str() {
        "system" => vec![ChatMessage::system(text)],
        "user" => vec![ChatMessage::user(text)],
        "assistant" => {
            let invocations: Vec<_> = record
                .parts
                .iter()
                .filter_map(|part| match part {
                    MessagePart::ToolInvocation {
                        tool_call_id,
                        tool_name,
                        state,
                        input,
                        output,
                        error_text,
                    } => Some((tool_call_id, tool_name, state, input, output, error_text)),
                    MessagePart::Text { .. } => None,
                })
                .collect();

            if invocations.is_empty() {
                return vec![ChatMessage::assistant(text)];
            }

            let tool_calls = invocations
                .iter()
                .map(|(id, name, _, input, _, _)| FunctionCall {
                    id: (*id).clone(),
                    name: (*name).clone(),
                    arguments: (*input).clone(),
                })
                .collect();

            let mut entries = vec![ChatMessage::Assistant {
                content: text,
                tool_calls,
            }];

            for (id, _, state, _, output, error_text) in invocations {
                let content = match state {
                    ToolCallState::OutputAvailable => output
                        .clone()
                        .unwrap_or(Value::Null)
                        .to_string(),
                    ToolCallState::OutputError | ToolCallState::Pending => serde_json::json!({
                        "error": error_text.clone().unwrap_or_else(|| "unknown error".to_owned())
                    })
                    .to_string(),
                };
                entries.push(ChatMessage::ToolResult {
                    tool_call_id: id.clone(),
                    content,
                });
            }

            entries
        }
        other => {
            warn!("Skipping message with unknown role: {}", other);
            Vec::new()
        }
    }
}

/// Build the record reported to the caller when the finalize write failed
fn unsaved_record(conversation_id: &str, message: &NewMessage) -> MessageRecord {
    MessageRecord {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation_id.to_owned(),
        role: message.role.as_str().to_owned(),
        parts: message.parts.clone(),
        attachments: message.attachments.clone(),
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// Forward an event to the caller, tolerating a dropped receiver
///
/// When the client disconnects mid-stream the receiver is gone; the turn
/// keeps consuming the provider stream so finalization still happens.
async fn emit(tx: &mpsc::Sender<TurnEvent>, event: TurnEvent) {
    if tx.send(event).await.is_err() {
        debug!("Turn event receiver dropped; continuing for persistence");
    }
}
