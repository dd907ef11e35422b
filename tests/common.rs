// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides database, auth, scripted provider, and fake weather API helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(dead_code)]

//! Shared test utilities for `cirrus_chat_server`

use async_trait::async_trait;
use cirrus_chat_server::{
    auth::{generate_jwt_secret, AuthManager},
    database::Database,
    errors::{AppError, AppResult},
    llm::{
        ChatRequest, ChatResponse, ChatStream, LlmCapabilities, LlmProvider, StreamChunk,
        ToolCallDelta,
    },
    resources::ServerResources,
    tools::{weather::Coordinates, weather::WeatherApi, ToolRegistry},
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_test_writer()
            .init();
    });
}

// ============================================================================
// Scripted Mock Provider
// ============================================================================

/// Scripted LLM provider for relay tests
///
/// Streaming turns and non-streaming completions are queued ahead of time;
/// each provider call pops the next script entry. An exhausted script fails
/// the call, which doubles as the upstream-error scenario.
pub struct MockProvider {
    stream_turns: Mutex<VecDeque<Vec<Result<StreamChunk, AppError>>>>,
    completions: Mutex<VecDeque<String>>,
    pub stream_calls: AtomicUsize,
    pub complete_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            stream_turns: Mutex::new(VecDeque::new()),
            completions: Mutex::new(VecDeque::new()),
            stream_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
        }
    }

    /// Queue one streaming turn
    pub fn push_stream_turn(&self, chunks: Vec<Result<StreamChunk, AppError>>) {
        self.stream_turns.lock().unwrap().push_back(chunks);
    }

    /// Queue one non-streaming completion (used by title generation)
    pub fn push_completion(&self, text: &str) {
        self.completions.lock().unwrap().push_back(text.to_owned());
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn display_name(&self) -> &'static str {
        "Mock Provider"
    }

    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities::STREAMING
            | LlmCapabilities::FUNCTION_CALLING
            | LlmCapabilities::SYSTEM_MESSAGES
    }

    fn default_model(&self) -> &'static str {
        "mock-model"
    }

    async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, AppError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let content = self
            .completions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::external_service("Mock", "No scripted completion"))?;

        Ok(ChatResponse {
            content,
            model: "mock-model".to_owned(),
            usage: None,
            finish_reason: Some("stop".to_owned()),
        })
    }

    async fn complete_stream(&self, _request: &ChatRequest) -> Result<ChatStream, AppError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let chunks = self
            .stream_turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::external_service("Mock", "No scripted stream turn"))?;

        Ok(Box::pin(tokio_stream::iter(chunks)))
    }
}

// ============================================================================
// Stream Chunk Builders
// ============================================================================

/// A streamed text reply split into word-sized deltas plus a stop marker
pub fn text_turn(text: &str) -> Vec<Result<StreamChunk, AppError>> {
    let mut chunks: Vec<Result<StreamChunk, AppError>> = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let take = remaining.len().min(4);
        let (head, tail) = remaining.split_at(take);
        chunks.push(Ok(StreamChunk {
            delta: head.to_owned(),
            ..StreamChunk::default()
        }));
        remaining = tail;
    }
    chunks.push(Ok(StreamChunk {
        is_final: true,
        finish_reason: Some("stop".to_owned()),
        ..StreamChunk::default()
    }));
    chunks
}

/// A streamed tool-call turn: id/name first, arguments split across chunks
pub fn tool_call_turn(
    call_id: &str,
    tool_name: &str,
    arguments: &Value,
) -> Vec<Result<StreamChunk, AppError>> {
    let args = arguments.to_string();
    let split_at = args.len() / 2;
    let (first, second) = args.split_at(split_at);

    vec![
        Ok(StreamChunk {
            tool_call_deltas: vec![ToolCallDelta {
                index: 0,
                id: Some(call_id.to_owned()),
                name: Some(tool_name.to_owned()),
                arguments_delta: first.to_owned(),
            }],
            ..StreamChunk::default()
        }),
        Ok(StreamChunk {
            tool_call_deltas: vec![ToolCallDelta {
                index: 0,
                id: None,
                name: None,
                arguments_delta: second.to_owned(),
            }],
            ..StreamChunk::default()
        }),
        Ok(StreamChunk {
            is_final: true,
            finish_reason: Some("tool_calls".to_owned()),
            ..StreamChunk::default()
        }),
    ]
}

/// A turn that fails mid-stream after some text
pub fn failing_turn(text_before_error: &str) -> Vec<Result<StreamChunk, AppError>> {
    vec![
        Ok(StreamChunk {
            delta: text_before_error.to_owned(),
            ..StreamChunk::default()
        }),
        Err(AppError::external_service("Mock", "upstream exploded")),
    ]
}

// ============================================================================
// Fake Weather API
// ============================================================================

/// Counting fake for the weather service
pub struct FakeWeatherApi {
    cities: HashMap<String, Coordinates>,
    pub geocode_calls: AtomicUsize,
    pub conditions_calls: AtomicUsize,
}

impl FakeWeatherApi {
    pub fn new() -> Self {
        let mut cities = HashMap::new();
        cities.insert(
            "taipei".to_owned(),
            Coordinates {
                latitude: 25.03,
                longitude: 121.56,
            },
        );
        Self {
            cities,
            geocode_calls: AtomicUsize::new(0),
            conditions_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WeatherApi for FakeWeatherApi {
    async fn geocode(&self, city: &str) -> AppResult<Option<Coordinates>> {
        self.geocode_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.cities.get(&city.to_lowercase()).copied())
    }

    async fn current_conditions(&self, latitude: f64, longitude: f64) -> AppResult<Value> {
        self.conditions_calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "temperature": 28,
            "conditions": "Partly cloudy",
            "latitude": latitude,
            "longitude": longitude,
        }))
    }
}

// ============================================================================
// Resource Setup
// ============================================================================

/// Standard test database setup
pub async fn create_test_database() -> Arc<Database> {
    init_test_logging();
    Arc::new(
        Database::new("sqlite::memory:")
            .await
            .expect("Failed to create test database"),
    )
}

/// Create test authentication manager
pub fn create_test_auth_manager() -> Arc<AuthManager> {
    Arc::new(AuthManager::new(generate_jwt_secret().to_vec(), 24))
}

/// Create server resources over a scripted provider and tool registry
pub async fn create_test_resources(
    provider: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
) -> Arc<ServerResources> {
    let database = create_test_database().await;
    let auth_manager = create_test_auth_manager();
    Arc::new(ServerResources::new(
        database,
        auth_manager,
        provider,
        Arc::new(tools),
    ))
}

/// Create server resources with an empty tool registry
pub async fn create_plain_test_resources(provider: Arc<dyn LlmProvider>) -> Arc<ServerResources> {
    create_test_resources(provider, ToolRegistry::new()).await
}

/// Generate a bearer header value for a test user
pub fn bearer_token(resources: &ServerResources, user_id: &str) -> String {
    let token = resources
        .auth_manager
        .generate_token(user_id, &format!("{user_id}@example.com"))
        .expect("Failed to generate test token");
    format!("Bearer {token}")
}
