// ABOUTME: End-to-end tests for the streaming completion relay
// ABOUTME: Covers streaming, tool rounds, title generation, errors, and disconnects
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use cirrus_chat_server::cache::TtlCache;
use cirrus_chat_server::models::{MessagePart, ToolCallState};
use cirrus_chat_server::relay::{TurnEvent, TurnMessage};
use cirrus_chat_server::resources::ServerResources;
use cirrus_chat_server::routes::chat::ChatRoutes;
use cirrus_chat_server::tools::{ToolRegistry, WeatherTool};
use common::{
    bearer_token, create_plain_test_resources, create_test_resources, failing_turn, text_turn,
    tool_call_turn, FakeWeatherApi, MockProvider,
};
use helpers::axum_test::AxumTestRequest;

use axum::http::StatusCode;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

const USER: &str = "user-1";

/// Poll an async condition until it holds or a short deadline passes
async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    false
}

async fn collect_events(
    resources: &ServerResources,
    conversation_id: &str,
    text: &str,
) -> Vec<TurnEvent> {
    let mut stream = resources
        .relay
        .start_turn(
            USER,
            conversation_id,
            TurnMessage {
                id: None,
                parts: vec![MessagePart::text(text)],
            },
        )
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

// ============================================================================
// End-to-End Streaming
// ============================================================================

#[tokio::test]
async fn test_new_conversation_turn_end_to_end() {
    let provider = Arc::new(MockProvider::new());
    provider.push_stream_turn(text_turn("Hello! How can I help?"));
    provider.push_completion("Friendly greeting");

    let resources = create_plain_test_resources(provider.clone()).await;
    let auth_token = bearer_token(&resources, USER);
    let router = ChatRoutes::routes(resources.clone());

    let response = AxumTestRequest::post("/api/chat/turns")
        .header("authorization", &auth_token)
        .json(&json!({
            "conversationId": "conv-e2e-1",
            "message": {
                "id": "client-msg-1",
                "parts": [{"type": "text", "text": "hello"}]
            }
        }))
        .send(router)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);

    let events = response.sse_events();
    assert!(!events.is_empty());

    // User message echoed first, with the client-supplied id
    assert_eq!(events[0]["type"], "user-message");
    assert_eq!(events[0]["message"]["id"], "client-msg-1");
    assert_eq!(events[0]["message"]["role"], "user");

    // At least one incremental text delta before the finish marker
    let deltas: Vec<_> = events
        .iter()
        .filter(|e| e["type"] == "text-delta")
        .collect();
    assert!(deltas.len() > 1);

    let finish = events.last().unwrap();
    assert_eq!(finish["type"], "finish");
    assert_eq!(finish["message"]["role"], "assistant");

    // Both messages persisted, in order
    let messages = resources.store.list_messages("conv-e2e-1").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, "user");
    assert_eq!(messages[1].role, "assistant");
    assert_eq!(
        messages[1].parts,
        vec![MessagePart::text("Hello! How can I help?")]
    );

    // Conversation was created with the placeholder and retitled in the
    // background
    let store = resources.store.clone();
    let titled = eventually(|| {
        let store = store.clone();
        async move {
            store
                .get_conversation("conv-e2e-1", USER)
                .await
                .unwrap()
                .is_some_and(|c| c.title == "Friendly greeting")
        }
    })
    .await;
    assert!(titled, "Background title generation never landed");
}

#[tokio::test]
async fn test_existing_conversation_keeps_its_title() {
    let provider = Arc::new(MockProvider::new());
    provider.push_stream_turn(text_turn("Sure."));

    let resources = create_plain_test_resources(provider.clone()).await;
    resources
        .store
        .create_conversation_with_id("conv-kept", USER, "Custom title")
        .await
        .unwrap();

    let events = collect_events(&resources, "conv-kept", "thanks").await;
    assert!(matches!(events.last(), Some(TurnEvent::Finish { .. })));

    // No title call was made for an existing conversation
    assert_eq!(provider.complete_calls.load(Ordering::SeqCst), 0);
    let conv = resources
        .store
        .get_conversation("conv-kept", USER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conv.title, "Custom title");
}

#[tokio::test]
async fn test_turn_on_foreign_conversation_fails_closed() {
    let provider = Arc::new(MockProvider::new());
    let resources = create_plain_test_resources(provider).await;
    let router = ChatRoutes::routes(resources.clone());

    resources
        .store
        .create_conversation_with_id("conv-private", "someone-else", "Private")
        .await
        .unwrap();

    let intruder_token = bearer_token(&resources, USER);
    let response = AxumTestRequest::post("/api/chat/turns")
        .header("authorization", &intruder_token)
        .json(&json!({
            "conversationId": "conv-private",
            "message": {"parts": [{"type": "text", "text": "let me in"}]}
        }))
        .send(router)
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    // Rejected before any side effect
    let messages = resources.store.list_messages("conv-private").await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn test_empty_turn_message_is_rejected() {
    let provider = Arc::new(MockProvider::new());
    let resources = create_plain_test_resources(provider).await;
    let router = ChatRoutes::routes(resources.clone());
    let auth_token = bearer_token(&resources, USER);

    let response = AxumTestRequest::post("/api/chat/turns")
        .header("authorization", &auth_token)
        .json(&json!({
            "conversationId": "conv-empty",
            "message": {"parts": []}
        }))
        .send(router)
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    // Nothing was created
    assert!(resources
        .store
        .get_conversation("conv-empty", USER)
        .await
        .unwrap()
        .is_none());
}

// ============================================================================
// Tool Rounds
// ============================================================================

fn weather_registry(api: &Arc<FakeWeatherApi>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(WeatherTool::new(
        api.clone(),
        Arc::new(TtlCache::new(Duration::from_secs(86_400))),
    )));
    registry
}

#[tokio::test]
async fn test_tool_round_trip_with_geocode_cache() {
    let provider = Arc::new(MockProvider::new());
    let weather_api = Arc::new(FakeWeatherApi::new());

    // First turn: tool call then a text wrap-up
    provider.push_stream_turn(tool_call_turn(
        "call_1",
        "displayWeather",
        &json!({"city": "taipei"}),
    ));
    provider.push_stream_turn(text_turn("It is 28 degrees in Taipei."));
    provider.push_completion("Taipei weather");

    let resources = create_test_resources(provider.clone(), weather_registry(&weather_api)).await;

    let events = collect_events(&resources, "conv-tools", "weather in taipei?").await;

    let input_event = events
        .iter()
        .find(|e| matches!(e, TurnEvent::ToolInputAvailable { .. }))
        .expect("No tool input event");
    if let TurnEvent::ToolInputAvailable {
        tool_name, input, ..
    } = input_event
    {
        assert_eq!(tool_name, "displayWeather");
        assert_eq!(input["city"], "taipei");
    }

    let output_event = events
        .iter()
        .find(|e| matches!(e, TurnEvent::ToolOutputAvailable { .. }))
        .expect("No tool output event");
    if let TurnEvent::ToolOutputAvailable { output, .. } = output_event {
        assert_eq!(output["cityName"], "taipei");
        assert_eq!(output["temperature"], 28);
    }

    assert!(matches!(events.last(), Some(TurnEvent::Finish { .. })));

    // The persisted assistant message carries the final tool snapshot and text
    let messages = resources.store.list_messages("conv-tools").await.unwrap();
    assert_eq!(messages.len(), 2);
    let assistant = &messages[1];
    assert_eq!(assistant.role, "assistant");
    assert!(assistant.parts.iter().any(|part| matches!(
        part,
        MessagePart::ToolInvocation {
            state: ToolCallState::OutputAvailable,
            ..
        }
    )));
    assert!(assistant
        .parts
        .iter()
        .any(|part| matches!(part, MessagePart::Text { text } if text.contains("28 degrees"))));

    assert_eq!(weather_api.geocode_calls.load(Ordering::SeqCst), 1);

    // Second identical turn within the TTL: no new geocode lookup
    provider.push_stream_turn(tool_call_turn(
        "call_2",
        "displayWeather",
        &json!({"city": "taipei"}),
    ));
    provider.push_stream_turn(text_turn("Still 28 degrees."));

    let events = collect_events(&resources, "conv-tools", "and now?").await;
    assert!(matches!(events.last(), Some(TurnEvent::Finish { .. })));
    assert_eq!(weather_api.geocode_calls.load(Ordering::SeqCst), 1);
    assert_eq!(weather_api.conditions_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_tool_validation_error_is_nonfatal() {
    let provider = Arc::new(MockProvider::new());
    let weather_api = Arc::new(FakeWeatherApi::new());

    provider.push_stream_turn(tool_call_turn("call_1", "displayWeather", &json!({})));
    provider.push_stream_turn(text_turn("I need a city or coordinates."));
    provider.push_completion("Weather question");

    let resources = create_test_resources(provider, weather_registry(&weather_api)).await;

    let events = collect_events(&resources, "conv-badtool", "weather?").await;

    let error_event = events
        .iter()
        .find(|e| matches!(e, TurnEvent::ToolOutputError { .. }))
        .expect("No tool error event");
    if let TurnEvent::ToolOutputError { error_text, .. } = error_event {
        assert!(error_text.contains("city name or both latitude"));
    }

    // The stream still completes successfully
    assert!(matches!(events.last(), Some(TurnEvent::Finish { .. })));

    // The assistant message persists with the error snapshot
    let messages = resources.store.list_messages("conv-badtool").await.unwrap();
    let assistant = &messages[1];
    assert!(assistant.parts.iter().any(|part| matches!(
        part,
        MessagePart::ToolInvocation {
            state: ToolCallState::OutputError,
            ..
        }
    )));
}

// ============================================================================
// Error Paths
// ============================================================================

#[tokio::test]
async fn test_provider_failure_surfaces_as_stream_error() {
    // No scripted stream turn: the provider call itself fails
    let provider = Arc::new(MockProvider::new());
    provider.push_completion("Doomed turn");
    let resources = create_plain_test_resources(provider).await;

    let events = collect_events(&resources, "conv-err", "hello").await;

    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::Error { .. })));
    assert!(!events.iter().any(|e| matches!(e, TurnEvent::Finish { .. })));

    // The user message persisted before the model was invoked and is not
    // rolled back
    let messages = resources.store.list_messages("conv-err").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, "user");
}

#[tokio::test]
async fn test_midstream_error_discards_partial_reply() {
    let provider = Arc::new(MockProvider::new());
    provider.push_stream_turn(failing_turn("Partial "));
    provider.push_completion("Broken turn");
    let resources = create_plain_test_resources(provider).await;

    let events = collect_events(&resources, "conv-midstream", "hello").await;

    // The caller saw the delta, then the in-stream error marker
    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::TextDelta { delta } if delta == "Partial ")));
    assert!(matches!(events.last(), Some(TurnEvent::Error { .. })));

    // The partial assistant reply is not persisted
    let messages = resources
        .store
        .list_messages("conv-midstream")
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
}

// ============================================================================
// Disconnect Policy
// ============================================================================

#[tokio::test]
async fn test_disconnect_still_persists_assistant_message() {
    let provider = Arc::new(MockProvider::new());
    provider.push_stream_turn(text_turn("A reply the caller never reads."));
    provider.push_completion("Abandoned chat");
    let resources = create_plain_test_resources(provider).await;

    let stream = resources
        .relay
        .start_turn(
            USER,
            "conv-gone",
            TurnMessage {
                id: None,
                parts: vec![MessagePart::text("hello?")],
            },
        )
        .await
        .unwrap();

    // Caller disconnects immediately
    drop(stream);

    let store = resources.store.clone();
    let persisted = eventually(|| {
        let store = store.clone();
        async move {
            store
                .list_messages("conv-gone")
                .await
                .unwrap()
                .iter()
                .any(|m| m.role == "assistant")
        }
    })
    .await;

    assert!(persisted, "Assistant message was lost on disconnect");
}
