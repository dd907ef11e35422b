// ABOUTME: Domain model for chat message content parts and new-message payloads
// ABOUTME: Typed part sequences (text, tool invocations) persisted as structured JSON
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Message content model
//!
//! A message body is an ordered sequence of typed parts. Parts are immutable
//! once persisted; tool invocations are stored as final snapshots of their
//! call state.

use crate::llm::MessageRole;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a tool invocation recorded in a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallState {
    /// Call issued, no result yet
    Pending,
    /// Executor completed and produced output
    OutputAvailable,
    /// Executor failed; the error text stands in for output
    OutputError,
}

/// A typed fragment of a message's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessagePart {
    /// Plain text segment
    #[serde(rename = "text")]
    Text {
        /// Text content
        text: String,
    },
    /// Record of a tool call made while producing this message
    #[serde(rename = "tool-invocation")]
    ToolInvocation {
        /// Provider-assigned call id
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Registered tool name
        #[serde(rename = "toolName")]
        tool_name: String,
        /// Final call state
        state: ToolCallState,
        /// Input payload passed to the executor
        input: Value,
        /// Output payload when the call succeeded
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        /// Error text when the call failed
        #[serde(rename = "errorText", skip_serializing_if = "Option::is_none")]
        error_text: Option<String>,
    },
}

impl MessagePart {
    /// Create a text part
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Payload for appending a message to a conversation
///
/// The id is caller-supplied when the client authored the message (so client
/// and server state stay reconciled) and generated server-side otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    /// Message id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Author role
    pub role: MessageRole,
    /// Ordered content parts
    pub parts: Vec<MessagePart>,
    /// Opaque side-channel metadata
    #[serde(default)]
    pub attachments: Vec<Value>,
}

impl NewMessage {
    /// Create a user message from plain text
    #[must_use]
    pub fn user_text(id: Option<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            role: MessageRole::User,
            parts: vec![MessagePart::text(text)],
            attachments: Vec::new(),
        }
    }

    /// Concatenated text content across all text parts
    #[must_use]
    pub fn text_content(&self) -> String {
        text_content(&self.parts)
    }
}

/// Concatenated text content of a part sequence
#[must_use]
pub fn text_content(parts: &[MessagePart]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::Text { text } => Some(text.as_str()),
            MessagePart::ToolInvocation { .. } => None,
        })
        .collect()
}
