// ABOUTME: Integration tests for the chat route handlers
// ABOUTME: Tests conversation CRUD, message endpoints, and authentication flows
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use cirrus_chat_server::routes::chat::{
    ChatRoutes, ConversationDetailResponse, ConversationListResponse, ConversationResponse,
    MessagesListResponse,
};
use common::{bearer_token, create_plain_test_resources, MockProvider};
use helpers::axum_test::AxumTestRequest;

use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

async fn setup_test_environment() -> (axum::Router, String) {
    let resources = create_plain_test_resources(Arc::new(MockProvider::new())).await;
    let auth_token = bearer_token(&resources, "user-1");
    let router = ChatRoutes::routes(resources);
    (router, auth_token)
}

// ============================================================================
// Conversation CRUD Tests
// ============================================================================

#[tokio::test]
async fn test_create_conversation() {
    let (router, auth_token) = setup_test_environment().await;

    let response = AxumTestRequest::post("/api/chat/conversations")
        .header("authorization", &auth_token)
        .json(&json!({"title": "Test Conversation"}))
        .send(router)
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);

    let conv: ConversationResponse = response.json();
    assert_eq!(conv.title, "Test Conversation");
    assert!(!conv.id.is_empty());
}

#[tokio::test]
async fn test_create_conversation_defaults_to_placeholder_title() {
    let (router, auth_token) = setup_test_environment().await;

    let response = AxumTestRequest::post("/api/chat/conversations")
        .header("authorization", &auth_token)
        .json(&json!({}))
        .send(router)
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);

    let conv: ConversationResponse = response.json();
    assert_eq!(conv.title, "New chat");
}

#[tokio::test]
async fn test_list_conversations() {
    let (router, auth_token) = setup_test_environment().await;

    let create_response = AxumTestRequest::post("/api/chat/conversations")
        .header("authorization", &auth_token)
        .json(&json!({"title": "Test Conversation"}))
        .send(router.clone())
        .await;

    assert_eq!(create_response.status_code(), StatusCode::CREATED);

    let list_response = AxumTestRequest::get("/api/chat/conversations")
        .header("authorization", &auth_token)
        .send(router)
        .await;

    assert_eq!(list_response.status_code(), StatusCode::OK);

    let list: ConversationListResponse = list_response.json();
    assert_eq!(list.total, 1);
    assert_eq!(list.conversations.len(), 1);
    assert_eq!(list.conversations[0].title, "Test Conversation");
}

#[tokio::test]
async fn test_get_conversation_returns_messages() {
    let (router, auth_token) = setup_test_environment().await;

    let create_response = AxumTestRequest::post("/api/chat/conversations")
        .header("authorization", &auth_token)
        .json(&json!({"title": "Get Test Conv"}))
        .send(router.clone())
        .await;

    let created: ConversationResponse = create_response.json();

    let save_response = AxumTestRequest::post(&format!(
        "/api/chat/conversations/{}/messages",
        created.id
    ))
    .header("authorization", &auth_token)
    .json(&json!({
        "role": "user",
        "parts": [{"type": "text", "text": "hello"}]
    }))
    .send(router.clone())
    .await;
    assert_eq!(save_response.status_code(), StatusCode::CREATED);

    let get_response = AxumTestRequest::get(&format!("/api/chat/conversations/{}", created.id))
        .header("authorization", &auth_token)
        .send(router)
        .await;

    assert_eq!(get_response.status_code(), StatusCode::OK);

    let detail: ConversationDetailResponse = get_response.json();
    assert_eq!(detail.conversation.id, created.id);
    assert_eq!(detail.conversation.title, "Get Test Conv");
    assert_eq!(detail.messages.len(), 1);
    assert_eq!(detail.messages[0].role, "user");
}

#[tokio::test]
async fn test_rename_conversation() {
    let (router, auth_token) = setup_test_environment().await;

    let create_response = AxumTestRequest::post("/api/chat/conversations")
        .header("authorization", &auth_token)
        .json(&json!({"title": "Original Title"}))
        .send(router.clone())
        .await;

    let created: ConversationResponse = create_response.json();

    let update_response = AxumTestRequest::put(&format!("/api/chat/conversations/{}", created.id))
        .header("authorization", &auth_token)
        .json(&json!({"title": "Updated Title"}))
        .send(router.clone())
        .await;

    assert_eq!(update_response.status_code(), StatusCode::OK);

    let get_response = AxumTestRequest::get(&format!("/api/chat/conversations/{}", created.id))
        .header("authorization", &auth_token)
        .send(router)
        .await;

    let detail: ConversationDetailResponse = get_response.json();
    assert_eq!(detail.conversation.title, "Updated Title");
}

#[tokio::test]
async fn test_rename_with_empty_title_is_rejected() {
    let (router, auth_token) = setup_test_environment().await;

    let create_response = AxumTestRequest::post("/api/chat/conversations")
        .header("authorization", &auth_token)
        .json(&json!({"title": "Original"}))
        .send(router.clone())
        .await;

    let created: ConversationResponse = create_response.json();

    let update_response = AxumTestRequest::put(&format!("/api/chat/conversations/{}", created.id))
        .header("authorization", &auth_token)
        .json(&json!({"title": "   "}))
        .send(router)
        .await;

    assert_eq!(update_response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_conversation() {
    let (router, auth_token) = setup_test_environment().await;

    let create_response = AxumTestRequest::post("/api/chat/conversations")
        .header("authorization", &auth_token)
        .json(&json!({"title": "To Delete"}))
        .send(router.clone())
        .await;

    let created: ConversationResponse = create_response.json();

    let delete_response =
        AxumTestRequest::delete(&format!("/api/chat/conversations/{}", created.id))
            .header("authorization", &auth_token)
            .send(router.clone())
            .await;

    assert_eq!(delete_response.status_code(), StatusCode::NO_CONTENT);

    // Second delete reports not-found, not success
    let second_delete =
        AxumTestRequest::delete(&format!("/api/chat/conversations/{}", created.id))
            .header("authorization", &auth_token)
            .send(router.clone())
            .await;
    assert_eq!(second_delete.status_code(), StatusCode::NOT_FOUND);

    let get_response = AxumTestRequest::get(&format!("/api/chat/conversations/{}", created.id))
        .header("authorization", &auth_token)
        .send(router)
        .await;

    assert_eq!(get_response.status_code(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Authentication Tests
// ============================================================================

#[tokio::test]
async fn test_create_conversation_unauthorized() {
    let (router, _) = setup_test_environment().await;

    let response = AxumTestRequest::post("/api/chat/conversations")
        .json(&json!({"title": "Test Conversation"}))
        .send(router)
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_conversation_invalid_token() {
    let (router, _) = setup_test_environment().await;

    let response = AxumTestRequest::post("/api/chat/conversations")
        .header("authorization", "Bearer invalid_token")
        .json(&json!({"title": "Test Conversation"}))
        .send(router)
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_other_users_conversation_is_invisible() {
    let resources = create_plain_test_resources(Arc::new(MockProvider::new())).await;
    let owner_token = bearer_token(&resources, "owner");
    let intruder_token = bearer_token(&resources, "intruder");
    let router = ChatRoutes::routes(resources);

    let create_response = AxumTestRequest::post("/api/chat/conversations")
        .header("authorization", &owner_token)
        .json(&json!({"title": "Private"}))
        .send(router.clone())
        .await;
    let created: ConversationResponse = create_response.json();

    // Get, rename, delete, and message access all come back as not-found
    let get = AxumTestRequest::get(&format!("/api/chat/conversations/{}", created.id))
        .header("authorization", &intruder_token)
        .send(router.clone())
        .await;
    assert_eq!(get.status_code(), StatusCode::NOT_FOUND);

    let rename = AxumTestRequest::put(&format!("/api/chat/conversations/{}", created.id))
        .header("authorization", &intruder_token)
        .json(&json!({"title": "Mine now"}))
        .send(router.clone())
        .await;
    assert_eq!(rename.status_code(), StatusCode::NOT_FOUND);

    let delete = AxumTestRequest::delete(&format!("/api/chat/conversations/{}", created.id))
        .header("authorization", &intruder_token)
        .send(router.clone())
        .await;
    assert_eq!(delete.status_code(), StatusCode::NOT_FOUND);

    let messages = AxumTestRequest::get(&format!(
        "/api/chat/conversations/{}/messages",
        created.id
    ))
    .header("authorization", &intruder_token)
    .send(router.clone())
    .await;
    assert_eq!(messages.status_code(), StatusCode::NOT_FOUND);

    // And nothing was mutated
    let still_there = AxumTestRequest::get(&format!("/api/chat/conversations/{}", created.id))
        .header("authorization", &owner_token)
        .send(router)
        .await;
    let detail: ConversationDetailResponse = still_there.json();
    assert_eq!(detail.conversation.title, "Private");
}

// ============================================================================
// Message Endpoint Tests
// ============================================================================

#[tokio::test]
async fn test_save_and_list_messages() {
    let (router, auth_token) = setup_test_environment().await;

    let create_response = AxumTestRequest::post("/api/chat/conversations")
        .header("authorization", &auth_token)
        .json(&json!({"title": "With messages"}))
        .send(router.clone())
        .await;
    let created: ConversationResponse = create_response.json();

    let save_response = AxumTestRequest::post(&format!(
        "/api/chat/conversations/{}/messages",
        created.id
    ))
    .header("authorization", &auth_token)
    .json(&json!({
        "id": "client-msg-1",
        "role": "assistant",
        "parts": [{"type": "text", "text": "rendered client-side"}]
    }))
    .send(router.clone())
    .await;

    assert_eq!(save_response.status_code(), StatusCode::CREATED);

    let list_response = AxumTestRequest::get(&format!(
        "/api/chat/conversations/{}/messages",
        created.id
    ))
    .header("authorization", &auth_token)
    .send(router)
    .await;

    let list: MessagesListResponse = list_response.json();
    assert_eq!(list.messages.len(), 1);
    assert_eq!(list.messages[0].id, "client-msg-1");
    assert_eq!(list.messages[0].role, "assistant");
}

#[tokio::test]
async fn test_save_message_rejects_unknown_role() {
    let (router, auth_token) = setup_test_environment().await;

    let create_response = AxumTestRequest::post("/api/chat/conversations")
        .header("authorization", &auth_token)
        .json(&json!({"title": "Role check"}))
        .send(router.clone())
        .await;
    let created: ConversationResponse = create_response.json();

    let save_response = AxumTestRequest::post(&format!(
        "/api/chat/conversations/{}/messages",
        created.id
    ))
    .header("authorization", &auth_token)
    .json(&json!({
        "role": "tool",
        "parts": [{"type": "text", "text": "nope"}]
    }))
    .send(router)
    .await;

    assert_eq!(save_response.status_code(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Not Found Tests
// ============================================================================

#[tokio::test]
async fn test_get_nonexistent_conversation() {
    let (router, auth_token) = setup_test_environment().await;

    let response = AxumTestRequest::get("/api/chat/conversations/nonexistent-id")
        .header("authorization", &auth_token)
        .send(router)
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rename_nonexistent_conversation() {
    let (router, auth_token) = setup_test_environment().await;

    let response = AxumTestRequest::put("/api/chat/conversations/nonexistent-id")
        .header("authorization", &auth_token)
        .json(&json!({"title": "New Title"}))
        .send(router)
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Pagination Tests
// ============================================================================

#[tokio::test]
async fn test_list_conversations_pagination() {
    let (router, auth_token) = setup_test_environment().await;

    for i in 1..=5 {
        AxumTestRequest::post("/api/chat/conversations")
            .header("authorization", &auth_token)
            .json(&json!({"title": format!("Conv {}", i)}))
            .send(router.clone())
            .await;
    }

    let page1_response = AxumTestRequest::get("/api/chat/conversations?limit=2&offset=0")
        .header("authorization", &auth_token)
        .send(router.clone())
        .await;

    let page1: ConversationListResponse = page1_response.json();
    assert_eq!(page1.conversations.len(), 2);
    assert_eq!(page1.conversations[0].title, "Conv 5");

    let page3_response = AxumTestRequest::get("/api/chat/conversations?limit=2&offset=4")
        .header("authorization", &auth_token)
        .send(router)
        .await;

    // Short page signals exhaustion
    let page3: ConversationListResponse = page3_response.json();
    assert_eq!(page3.conversations.len(), 1);
}
