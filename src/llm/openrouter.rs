// ABOUTME: OpenRouter LLM provider implementation with streaming and tool calling
// ABOUTME: Uses the OpenAI-compatible chat completions API with SSE streaming
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # OpenRouter Provider
//!
//! Implementation of the [`LlmProvider`] trait against OpenRouter's
//! OpenAI-compatible API, which fronts the Gemini models this server chats
//! with by default.
//!
//! ## Configuration
//!
//! Set the `OPENROUTER_API_KEY` environment variable with your API key from
//! <https://openrouter.ai/keys>.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use super::sse_parser::create_sse_stream;
use super::{
    ChatMessage, ChatRequest, ChatResponse, ChatStream, FunctionCall, LlmCapabilities, LlmProvider,
    StreamChunk, TokenUsage, ToolCallDelta, ToolDefinition,
};
use crate::config::environment::LlmConfig;
use crate::errors::AppError;

/// Environment variable for the OpenRouter API key
const OPENROUTER_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Default model to use
const DEFAULT_MODEL: &str = "google/gemini-2.5-flash-lite";

/// Base URL for the OpenRouter API (OpenAI-compatible)
const API_BASE_URL: &str = "https://openrouter.ai/api/v1";

// ============================================================================
// API Request/Response Types (OpenAI-compatible format)
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenRouterRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

/// Message structure on the wire
#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded arguments, per the OpenAI wire convention
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunctionDef,
}

#[derive(Debug, Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    choices: Vec<OpenRouterChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(rename = "prompt_tokens")]
    prompt: u32,
    #[serde(rename = "completion_tokens")]
    completion: u32,
    #[serde(rename = "total_tokens")]
    total: u32,
}

/// Streaming chunk structure
#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    choices: Vec<WireStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: WireDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireErrorResponse {
    error: WireErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// OpenRouter LLM provider
pub struct OpenRouterProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenRouterProvider {
    /// Create a new OpenRouter provider with the given API key
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: API_BASE_URL.to_owned(),
            default_model: DEFAULT_MODEL.to_owned(),
        }
    }

    /// Create a provider from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `OPENROUTER_API_KEY` is not set
    pub fn from_env() -> Result<Self, AppError> {
        let api_key = std::env::var(OPENROUTER_API_KEY_ENV).map_err(|_| {
            AppError::config(format!(
                "Missing {OPENROUTER_API_KEY_ENV} environment variable. Get your API key from https://openrouter.ai/keys"
            ))
        })?;

        Ok(Self::new(api_key))
    }

    /// Create a provider from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured
    pub fn from_config(config: &LlmConfig) -> Result<Self, AppError> {
        let api_key = config.openrouter_api_key.clone().ok_or_else(|| {
            AppError::config(format!("Missing {OPENROUTER_API_KEY_ENV} configuration"))
        })?;

        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: config.base_url.clone(),
            default_model: config.default_model.clone(),
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    /// Convert transcript messages to the OpenAI wire format
    fn convert_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|msg| match msg {
                ChatMessage::System { content } => WireMessage {
                    role: "system",
                    content: content.clone(),
                    tool_calls: None,
                    tool_call_id: None,
                },
                ChatMessage::User { content } => WireMessage {
                    role: "user",
                    content: content.clone(),
                    tool_calls: None,
                    tool_call_id: None,
                },
                ChatMessage::Assistant {
                    content,
                    tool_calls,
                } => WireMessage {
                    role: "assistant",
                    content: content.clone(),
                    tool_calls: (!tool_calls.is_empty())
                        .then(|| tool_calls.iter().map(Self::convert_tool_call).collect()),
                    tool_call_id: None,
                },
                ChatMessage::ToolResult {
                    tool_call_id,
                    content,
                } => WireMessage {
                    role: "tool",
                    content: content.clone(),
                    tool_calls: None,
                    tool_call_id: Some(tool_call_id.clone()),
                },
            })
            .collect()
    }

    fn convert_tool_call(call: &FunctionCall) -> WireToolCall {
        WireToolCall {
            id: call.id.clone(),
            call_type: "function".to_owned(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        }
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Vec<WireTool> {
        tools
            .iter()
            .map(|tool| WireTool {
                tool_type: "function",
                function: WireFunctionDef {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect()
    }

    fn build_request(&self, request: &ChatRequest, stream: bool) -> OpenRouterRequest {
        OpenRouterRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages: Self::convert_messages(&request.messages),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: Some(stream),
            tools: (!request.tools.is_empty()).then(|| Self::convert_tools(&request.tools)),
            tool_choice: (!request.tools.is_empty()).then(|| "auto".to_owned()),
        }
    }

    /// Parse error response from the API
    fn parse_error_response(status: reqwest::StatusCode, body: &str) -> AppError {
        if let Ok(error_response) = serde_json::from_str::<WireErrorResponse>(body) {
            let error_type = error_response
                .error
                .error_type
                .unwrap_or_else(|| "unknown".to_owned());

            match status.as_u16() {
                401 => AppError::auth_invalid(format!(
                    "OpenRouter API authentication failed: {}",
                    error_response.error.message
                )),
                400 => AppError::invalid_input(format!(
                    "OpenRouter API validation error: {}",
                    error_response.error.message
                )),
                _ => AppError::external_service(
                    "OpenRouter",
                    format!("{} - {}", error_type, error_response.error.message),
                ),
            }
        } else {
            AppError::external_service(
                "OpenRouter",
                format!(
                    "API error ({}): {}",
                    status,
                    body.chars().take(200).collect::<String>()
                ),
            )
        }
    }

    /// Parse one streamed JSON payload into a [`StreamChunk`]
    fn parse_stream_data(json_str: &str) -> Option<Result<StreamChunk, AppError>> {
        match serde_json::from_str::<WireStreamChunk>(json_str) {
            Ok(chunk) => {
                let choice = chunk.choices.into_iter().next()?;
                let delta = choice.delta.content.unwrap_or_default();
                let tool_call_deltas = choice
                    .delta
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|call| ToolCallDelta {
                        index: call.index,
                        id: call.id,
                        name: call.function.as_ref().and_then(|f| f.name.clone()),
                        arguments_delta: call
                            .function
                            .and_then(|f| f.arguments)
                            .unwrap_or_default(),
                    })
                    .collect();
                let is_final = choice.finish_reason.is_some();

                Some(Ok(StreamChunk {
                    delta,
                    tool_call_deltas,
                    is_final,
                    finish_reason: choice.finish_reason,
                }))
            }
            Err(e) => {
                warn!("Failed to parse OpenRouter stream chunk: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    fn display_name(&self) -> &'static str {
        "OpenRouter"
    }

    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities::STREAMING
            | LlmCapabilities::FUNCTION_CALLING
            | LlmCapabilities::SYSTEM_MESSAGES
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    #[instrument(skip(self, request), fields(model = %request.model.as_deref().unwrap_or(&self.default_model)))]
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        debug!("Sending chat completion request to OpenRouter");

        let wire_request = self.build_request(request, false);

        let response = self
            .client
            .post(self.api_url("chat/completions"))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send request to OpenRouter API: {}", e);
                AppError::external_service("OpenRouter", format!("Failed to connect: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!("Failed to read OpenRouter API response: {}", e);
            AppError::external_service("OpenRouter", format!("Failed to read response: {e}"))
        })?;

        if !status.is_success() {
            return Err(Self::parse_error_response(status, &body));
        }

        let wire_response: OpenRouterResponse = serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse OpenRouter API response: {}", e);
            AppError::external_service("OpenRouter", format!("Failed to parse response: {e}"))
        })?;

        let choice = wire_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::external_service("OpenRouter", "API returned no choices"))?;

        let content = choice.message.content.unwrap_or_default();

        debug!(
            "Received response from OpenRouter: {} chars, finish_reason: {:?}",
            content.len(),
            choice.finish_reason
        );

        Ok(ChatResponse {
            content,
            model: wire_response.model,
            usage: wire_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt,
                completion_tokens: u.completion,
                total_tokens: u.total,
            }),
            finish_reason: choice.finish_reason,
        })
    }

    #[instrument(skip(self, request), fields(model = %request.model.as_deref().unwrap_or(&self.default_model)))]
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError> {
        debug!(
            "Sending streaming chat completion request to OpenRouter with {} tools",
            request.tools.len()
        );

        let wire_request = self.build_request(request, true);

        let response = self
            .client
            .post(self.api_url("chat/completions"))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send streaming request to OpenRouter API: {}", e);
                AppError::external_service("OpenRouter", format!("Failed to connect: {e}"))
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error_response(status, &body));
        }

        Ok(create_sse_stream(
            response.bytes_stream(),
            Self::parse_stream_data,
            "OpenRouter",
        ))
    }
}
