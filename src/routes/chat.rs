// ABOUTME: Chat route handlers for conversation management and streaming turns
// ABOUTME: REST endpoints for conversation CRUD, message history, and the SSE turn stream
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Chat routes
//!
//! Conversation management, message history, the direct save-message path,
//! and the streaming turn endpoint. All handlers require authentication; a
//! conversation is only visible to its owner, and missing and unowned
//! resources are deliberately indistinguishable at this boundary.

use crate::{
    auth::AuthResult,
    database::chat::{parse_role, ConversationRecord, MessageRecord, DEFAULT_TITLE},
    errors::AppError,
    models::{MessagePart, NewMessage},
    relay::{TurnEvent, TurnMessage},
    resources::ServerResources,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post, put},
    Json, Router,
};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{convert::Infallible, sync::Arc};
use tokio_stream::StreamExt;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to create a new conversation
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    /// Conversation title; defaults to the placeholder when absent
    #[serde(default)]
    pub title: Option<String>,
}

/// Conversation payload returned by the API
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    /// Conversation ID
    pub id: String,
    /// Conversation title
    pub title: String,
    /// Creation timestamp
    pub created_at: String,
}

impl From<ConversationRecord> for ConversationResponse {
    fn from(record: ConversationRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            created_at: record.created_at,
        }
    }
}

/// Response for listing conversations
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationListResponse {
    /// Conversations, newest first
    pub conversations: Vec<ConversationResponse>,
    /// Number of conversations in this page
    pub total: usize,
}

/// Response for a conversation with its messages
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationDetailResponse {
    /// The conversation
    pub conversation: ConversationResponse,
    /// Messages in ascending creation order
    pub messages: Vec<MessageRecord>,
}

/// Request to rename a conversation
#[derive(Debug, Deserialize)]
pub struct UpdateConversationRequest {
    /// New title
    pub title: String,
}

/// Response for a messages list
#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesListResponse {
    /// Messages in ascending creation order
    pub messages: Vec<MessageRecord>,
}

/// Request to save a message directly
///
/// Used by clients that consumed a turn stream themselves and commit the
/// rendered assistant message back, as an alternative to server-side
/// finalization. Must not be combined with the turn endpoint's own
/// finalization for the same reply.
#[derive(Debug, Deserialize)]
pub struct SaveMessageRequest {
    /// Message id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Author role (system, user, or assistant)
    pub role: String,
    /// Ordered content parts
    pub parts: Vec<MessagePart>,
    /// Opaque attachment metadata
    #[serde(default)]
    pub attachments: Vec<Value>,
}

/// Request to post a turn
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    /// Conversation id; created with a placeholder title when new
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    /// The new user message
    pub message: TurnMessagePayload,
}

/// The user message submitted with a turn
#[derive(Debug, Deserialize)]
pub struct TurnMessagePayload {
    /// Client-supplied message id
    #[serde(default)]
    pub id: Option<String>,
    /// Message content parts
    pub parts: Vec<MessagePart>,
}

/// Query parameters for listing conversations
#[derive(Debug, Deserialize, Default)]
pub struct ListConversationsQuery {
    /// Maximum number of conversations to return
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Offset for pagination
    #[serde(default)]
    pub offset: i64,
}

const fn default_limit() -> i64 {
    20
}

// ============================================================================
// Chat Routes
// ============================================================================

/// Chat routes handler
pub struct ChatRoutes;

impl ChatRoutes {
    /// Create all chat routes
    #[must_use]
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            // Conversation management
            .route("/api/chat/conversations", post(Self::create_conversation))
            .route("/api/chat/conversations", get(Self::list_conversations))
            .route(
                "/api/chat/conversations/:conversation_id",
                get(Self::get_conversation),
            )
            .route(
                "/api/chat/conversations/:conversation_id",
                put(Self::rename_conversation),
            )
            .route(
                "/api/chat/conversations/:conversation_id",
                delete(Self::delete_conversation),
            )
            // Messages
            .route(
                "/api/chat/conversations/:conversation_id/messages",
                get(Self::get_messages),
            )
            .route(
                "/api/chat/conversations/:conversation_id/messages",
                post(Self::save_message),
            )
            // Streaming turn endpoint
            .route("/api/chat/turns", post(Self::post_turn))
            .with_state(resources)
    }

    /// Authenticate the caller from request headers
    fn authenticate(
        headers: &axum::http::HeaderMap,
        resources: &Arc<ServerResources>,
    ) -> Result<AuthResult, AppError> {
        resources.auth_manager.authenticate_request(headers)
    }

    // ========================================================================
    // Conversation Handlers
    // ========================================================================

    /// Create a new conversation
    async fn create_conversation(
        State(resources): State<Arc<ServerResources>>,
        headers: axum::http::HeaderMap,
        Json(request): Json<CreateConversationRequest>,
    ) -> Result<Response, AppError> {
        let auth = Self::authenticate(&headers, &resources)?;

        let title = match request.title.as_deref().map(str::trim) {
            None => DEFAULT_TITLE,
            Some("") => return Err(AppError::invalid_input("Title must not be empty")),
            Some(title) => title,
        };

        let conversation = resources
            .store
            .create_conversation(&auth.user_id, title)
            .await?;

        Ok((
            StatusCode::CREATED,
            Json(ConversationResponse::from(conversation)),
        )
            .into_response())
    }

    /// List the caller's conversations, newest first
    async fn list_conversations(
        State(resources): State<Arc<ServerResources>>,
        headers: axum::http::HeaderMap,
        Query(query): Query<ListConversationsQuery>,
    ) -> Result<Response, AppError> {
        let auth = Self::authenticate(&headers, &resources)?;

        let conversations = resources
            .store
            .list_conversations(&auth.user_id, query.limit, query.offset)
            .await?;

        let conversations: Vec<ConversationResponse> = conversations
            .into_iter()
            .map(ConversationResponse::from)
            .collect();

        let response = ConversationListResponse {
            total: conversations.len(),
            conversations,
        };

        Ok((StatusCode::OK, Json(response)).into_response())
    }

    /// Get a conversation and its messages
    async fn get_conversation(
        State(resources): State<Arc<ServerResources>>,
        headers: axum::http::HeaderMap,
        Path(conversation_id): Path<String>,
    ) -> Result<Response, AppError> {
        let auth = Self::authenticate(&headers, &resources)?;

        let conversation = resources
            .store
            .get_conversation(&conversation_id, &auth.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        let messages = resources.store.list_messages(&conversation_id).await?;

        let response = ConversationDetailResponse {
            conversation: ConversationResponse::from(conversation),
            messages,
        };

        Ok((StatusCode::OK, Json(response)).into_response())
    }

    /// Rename a conversation
    async fn rename_conversation(
        State(resources): State<Arc<ServerResources>>,
        headers: axum::http::HeaderMap,
        Path(conversation_id): Path<String>,
        Json(request): Json<UpdateConversationRequest>,
    ) -> Result<Response, AppError> {
        let auth = Self::authenticate(&headers, &resources)?;

        let title = request.title.trim();
        if title.is_empty() {
            return Err(AppError::invalid_input("Title must not be empty"));
        }

        let renamed = resources
            .store
            .rename_conversation(&conversation_id, &auth.user_id, title)
            .await?;

        if !renamed {
            return Err(AppError::not_found("Conversation"));
        }

        Ok((StatusCode::OK, Json(serde_json::json!({"success": true}))).into_response())
    }

    /// Delete a conversation and its messages
    async fn delete_conversation(
        State(resources): State<Arc<ServerResources>>,
        headers: axum::http::HeaderMap,
        Path(conversation_id): Path<String>,
    ) -> Result<Response, AppError> {
        let auth = Self::authenticate(&headers, &resources)?;

        let deleted = resources
            .store
            .delete_conversation(&conversation_id, &auth.user_id)
            .await?;

        if !deleted {
            return Err(AppError::not_found("Conversation"));
        }

        Ok((StatusCode::NO_CONTENT, ()).into_response())
    }

    // ========================================================================
    // Message Handlers
    // ========================================================================

    /// Get messages for a conversation
    async fn get_messages(
        State(resources): State<Arc<ServerResources>>,
        headers: axum::http::HeaderMap,
        Path(conversation_id): Path<String>,
    ) -> Result<Response, AppError> {
        let auth = Self::authenticate(&headers, &resources)?;

        // Verify the caller owns this conversation
        resources
            .store
            .get_conversation(&conversation_id, &auth.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        let messages = resources.store.list_messages(&conversation_id).await?;

        Ok((StatusCode::OK, Json(MessagesListResponse { messages })).into_response())
    }

    /// Save a message directly to a conversation
    async fn save_message(
        State(resources): State<Arc<ServerResources>>,
        headers: axum::http::HeaderMap,
        Path(conversation_id): Path<String>,
        Json(request): Json<SaveMessageRequest>,
    ) -> Result<Response, AppError> {
        let auth = Self::authenticate(&headers, &resources)?;

        // Verify the caller owns this conversation
        resources
            .store
            .get_conversation(&conversation_id, &auth.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        let role = parse_role(&request.role)?;
        if request.parts.is_empty() {
            return Err(AppError::invalid_input("Message has no content parts"));
        }

        let message = resources
            .store
            .append_message(
                &conversation_id,
                NewMessage {
                    id: request.id,
                    role,
                    parts: request.parts,
                    attachments: request.attachments,
                },
            )
            .await?;

        Ok((StatusCode::CREATED, Json(message)).into_response())
    }

    // ========================================================================
    // Turn Handler
    // ========================================================================

    /// Post a turn and stream the assistant reply via SSE
    ///
    /// The response stream carries JSON events terminated by a `finish` or
    /// `error` marker; see [`TurnEvent`] for the wire shapes.
    async fn post_turn(
        State(resources): State<Arc<ServerResources>>,
        headers: axum::http::HeaderMap,
        Json(request): Json<TurnRequest>,
    ) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
        let auth = Self::authenticate(&headers, &resources)?;

        let turn_stream = resources
            .relay
            .start_turn(
                &auth.user_id,
                &request.conversation_id,
                TurnMessage {
                    id: request.message.id,
                    parts: request.message.parts,
                },
            )
            .await?;

        let stream = turn_stream.map(|event| Ok(sse_event(&event)));

        Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
    }
}

/// Serialize a turn event into an SSE data frame
fn sse_event(event: &TurnEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(payload) => Event::default().data(payload),
        Err(e) => Event::default().data(
            serde_json::json!({
                "type": "error",
                "message": format!("Failed to serialize event: {e}")
            })
            .to_string(),
        ),
    }
}
