// ABOUTME: Conversation title generation from the first user message
// ABOUTME: Single non-streaming model call with no tool access
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Title generation
//!
//! Derives a short conversation label from the first user message. Callers
//! treat failure as cosmetic: the relay fires this from a detached task and
//! keeps the placeholder title if generation fails.

use crate::errors::{AppError, AppResult};
use crate::llm::{prompts, ChatMessage, ChatRequest, LlmProvider};
use std::sync::Arc;

/// Hard cap on generated title length, matching the prompt's instruction
const MAX_TITLE_CHARS: usize = 80;

/// Generates conversation titles via a single completion call
#[derive(Clone)]
pub struct TitleGenerator {
    provider: Arc<dyn LlmProvider>,
}

impl TitleGenerator {
    /// Create a title generator backed by the given provider
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Generate a short title for a conversation
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails or produces an empty title
    pub async fn generate(&self, first_user_text: &str) -> AppResult<String> {
        let request = ChatRequest::new(vec![
            ChatMessage::system(prompts::title_system_prompt()),
            ChatMessage::user(first_user_text),
        ]);

        let response = self.provider.complete(&request).await?;
        let title = normalize_title(&response.content);

        if title.is_empty() {
            return Err(AppError::external_service(
                self.provider.display_name(),
                "Title generation produced empty output",
            ));
        }

        Ok(title)
    }
}

/// Trim whitespace and newlines, enforce the length cap
fn normalize_title(raw: &str) -> String {
    let cleaned = raw
        .trim()
        .trim_matches('"')
        .lines()
        .next()
        .unwrap_or_default()
        .trim();

    cleaned.chars().take(MAX_TITLE_CHARS).collect()
}
