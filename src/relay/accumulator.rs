// ABOUTME: Accumulates streamed output into the assistant message persisted at turn end
// ABOUTME: Assembles streamed tool-call fragments into complete, parsed function calls
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Turn accumulation
//!
//! The relay forwards provider output to the client as it arrives while this
//! module buffers the same output into the part sequence that becomes the
//! persisted assistant message. Tool invocations are recorded as final
//! snapshots (`output-available` / `output-error`), never as pending rows.

use crate::errors::{AppError, AppResult};
use crate::llm::{FunctionCall, MessageRole, ToolCallDelta};
use crate::models::{MessagePart, NewMessage, ToolCallState};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Tool Call Assembly
// ============================================================================

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Folds streamed tool-call fragments into complete calls
///
/// Providers stream a call's id and name on its first fragment and the JSON
/// argument text in pieces across subsequent fragments, keyed by index.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: BTreeMap<usize, PendingToolCall>,
}

impl ToolCallAssembler {
    /// Create an empty assembler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb the fragments carried by one stream chunk
    pub fn absorb(&mut self, deltas: &[ToolCallDelta]) {
        for delta in deltas {
            let call = self.calls.entry(delta.index).or_default();
            if let Some(ref id) = delta.id {
                call.id = Some(id.clone());
            }
            if let Some(ref name) = delta.name {
                call.name = Some(name.clone());
            }
            call.arguments.push_str(&delta.arguments_delta);
        }
    }

    /// Whether any fragments were absorbed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Produce the completed calls, parsing accumulated argument JSON
    ///
    /// # Errors
    ///
    /// Returns an error if a call is missing its name or its arguments are
    /// not valid JSON once complete
    pub fn finish(self) -> AppResult<Vec<FunctionCall>> {
        self.calls
            .into_values()
            .enumerate()
            .map(|(position, call)| {
                let name = call.name.ok_or_else(|| {
                    AppError::serialization(format!(
                        "Streamed tool call at position {position} has no name"
                    ))
                })?;
                let arguments: Value = if call.arguments.trim().is_empty() {
                    Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_str(&call.arguments).map_err(|e| {
                        AppError::serialization(format!(
                            "Tool call {name} arguments are not valid JSON: {e}"
                        ))
                    })?
                };
                Ok(FunctionCall {
                    id: call
                        .id
                        .unwrap_or_else(|| format!("call_{position}")),
                    name,
                    arguments,
                })
            })
            .collect()
    }
}

// ============================================================================
// Turn Accumulation
// ============================================================================

/// Buffers the parts of the assistant message produced by one turn
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    parts: Vec<MessagePart>,
}

impl TurnAccumulator {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text delta, extending the current text part when one is open
    pub fn push_text(&mut self, delta: &str) {
        if let Some(MessagePart::Text { text }) = self.parts.last_mut() {
            text.push_str(delta);
        } else {
            self.parts.push(MessagePart::text(delta));
        }
    }

    /// Record a successfully executed tool call
    pub fn push_tool_output(&mut self, call: &FunctionCall, output: Value) {
        self.parts.push(MessagePart::ToolInvocation {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            state: ToolCallState::OutputAvailable,
            input: call.arguments.clone(),
            output: Some(output),
            error_text: None,
        });
    }

    /// Record a failed tool call
    pub fn push_tool_error(&mut self, call: &FunctionCall, error_text: String) {
        self.parts.push(MessagePart::ToolInvocation {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            state: ToolCallState::OutputError,
            input: call.arguments.clone(),
            output: None,
            error_text: Some(error_text),
        });
    }

    /// Whether anything was accumulated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Consume the accumulator into the assistant message to persist
    ///
    /// Returns `None` when the turn produced no output at all.
    #[must_use]
    pub fn into_message(self) -> Option<NewMessage> {
        if self.parts.is_empty() {
            return None;
        }
        Some(NewMessage {
            id: None,
            role: MessageRole::Assistant,
            parts: self.parts,
            attachments: Vec::new(),
        })
    }
}
