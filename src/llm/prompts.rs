// ABOUTME: System prompts for chat completion and conversation title generation
// ABOUTME: Compile-time prompt constants with accessor functions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! System prompts used by the relay and the title generator

/// System prompt for chat turns
const CHAT_SYSTEM_PROMPT: &str = "\
You are a helpful assistant. Answer concisely and stay on topic. \
When the user asks about current weather and provides a city name or \
coordinates, call the displayWeather tool instead of guessing.";

/// System prompt for title generation
const TITLE_SYSTEM_PROMPT: &str = "\
You will generate a short title based on the first message a user begins a \
conversation with. Ensure it is not more than 80 characters long. The title \
should be a summary of the user's message. Do not use quotes or colons.";

/// System prompt applied to every chat turn
#[must_use]
pub const fn chat_system_prompt() -> &'static str {
    CHAT_SYSTEM_PROMPT
}

/// System prompt for the title generator
#[must_use]
pub const fn title_system_prompt() -> &'static str {
    TITLE_SYSTEM_PROMPT
}
