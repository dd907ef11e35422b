// ABOUTME: Database operations for chat conversations and messages
// ABOUTME: Owner-scoped CRUD with cascade delete and append-only message history
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::errors::{AppError, AppResult};
use crate::llm::MessageRole;
use crate::models::{MessagePart, NewMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Placeholder title a conversation carries until title generation lands
pub const DEFAULT_TITLE: &str = "New chat";

// ============================================================================
// Database Record Types
// ============================================================================

/// Database representation of a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Unique conversation ID
    pub id: String,
    /// User ID who owns the conversation
    pub user_id: String,
    /// Conversation title (placeholder until generated, or user-defined)
    pub title: String,
    /// When the conversation was created (RFC 3339)
    pub created_at: String,
}

/// Database representation of a chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique message ID
    pub id: String,
    /// Conversation ID this message belongs to
    pub conversation_id: String,
    /// Role of the message author (system, user, assistant)
    pub role: String,
    /// Ordered content parts
    pub parts: Vec<MessagePart>,
    /// Opaque attachment metadata
    pub attachments: Vec<Value>,
    /// When the message was created (RFC 3339)
    pub created_at: String,
}

// ============================================================================
// Chat Store
// ============================================================================

/// Conversation and message storage operations
///
/// Every mutating operation that takes a `user_id` verifies ownership inside
/// the query itself; no operation acts across owner boundaries. Messages are
/// append-only: there is no update or reorder operation.
#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

impl ChatStore {
    /// Create a new chat store
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Conversation Operations
    // ========================================================================

    /// Create a new conversation
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
    ) -> AppResult<ConversationRecord> {
        self.create_conversation_with_id(&Uuid::new_v4().to_string(), user_id, title)
            .await
    }

    /// Create a conversation with a caller-supplied id
    ///
    /// Used by the relay when the client opens a new chat under an id it
    /// already rendered, so client and server state stay reconciled.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn create_conversation_with_id(
        &self,
        id: &str,
        user_id: &str,
        title: &str,
    ) -> AppResult<ConversationRecord> {
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r"
            INSERT INTO conversations (id, user_id, title, created_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create conversation: {e}")))?;

        Ok(ConversationRecord {
            id: id.to_owned(),
            user_id: user_id.to_owned(),
            title: title.to_owned(),
            created_at: now,
        })
    }

    /// Get a conversation by ID, scoped to its owner
    ///
    /// A non-owner sees `None`, indistinguishable from a missing row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> AppResult<Option<ConversationRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, title, created_at
            FROM conversations
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get conversation: {e}")))?;

        Ok(row.map(|r| ConversationRecord {
            id: r.get("id"),
            user_id: r.get("user_id"),
            title: r.get("title"),
            created_at: r.get("created_at"),
        }))
    }

    /// Look up a conversation's owner without scoping
    ///
    /// The relay needs this to distinguish "absent" (create it) from
    /// "owned by someone else" (reject) before any side effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get_conversation_owner(
        &self,
        conversation_id: &str,
    ) -> AppResult<Option<String>> {
        let row = sqlx::query("SELECT user_id FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get conversation owner: {e}")))?;

        Ok(row.map(|r| r.get("user_id")))
    }

    /// List conversations for a user, newest first, with offset pagination
    ///
    /// A page shorter than `limit` signals exhaustion.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn list_conversations(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<ConversationRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, title, created_at
            FROM conversations
            WHERE user_id = $1
            ORDER BY created_at DESC, rowid DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list conversations: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|r| ConversationRecord {
                id: r.get("id"),
                user_id: r.get("user_id"),
                title: r.get("title"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    /// Rename a conversation, scoped to its owner
    ///
    /// Returns `false` when the conversation is absent or owned by another
    /// user. The background title update writes through this same path, so
    /// concurrent writes are last-write-wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn rename_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
        title: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE conversations
            SET title = $1
            WHERE id = $2 AND user_id = $3
            ",
        )
        .bind(title)
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to rename conversation: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a conversation and all its messages (cascade)
    ///
    /// Returns `false` when nothing was deleted (absent, already deleted, or
    /// owned by another user).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn delete_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r"
            DELETE FROM conversations
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to delete conversation: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Message Operations
    // ========================================================================

    /// Append a message to a conversation
    ///
    /// Honors a caller-supplied message id; generates one otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database operation fails
    pub async fn append_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
    ) -> AppResult<MessageRecord> {
        let id = message
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = chrono::Utc::now().to_rfc3339();

        let parts_json = serde_json::to_string(&message.parts)
            .map_err(|e| AppError::serialization(format!("Failed to encode parts: {e}")))?;
        let attachments_json = serde_json::to_string(&message.attachments)
            .map_err(|e| AppError::serialization(format!("Failed to encode attachments: {e}")))?;

        sqlx::query(
            r"
            INSERT INTO messages (id, conversation_id, role, parts, attachments, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(message.role.as_str())
        .bind(&parts_json)
        .bind(&attachments_json)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to append message: {e}")))?;

        Ok(MessageRecord {
            id,
            conversation_id: conversation_id.to_owned(),
            role: message.role.as_str().to_owned(),
            parts: message.parts,
            attachments: message.attachments,
            created_at: now,
        })
    }

    /// Get all messages for a conversation in chronological order
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or a stored payload
    /// fails to decode
    pub async fn list_messages(&self, conversation_id: &str) -> AppResult<Vec<MessageRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, conversation_id, role, parts, attachments, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, rowid ASC
            ",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list messages: {e}")))?;

        rows.into_iter().map(decode_message_row).collect()
    }

    /// Get a single message by id
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored payload
    /// fails to decode
    pub async fn get_message(&self, message_id: &str) -> AppResult<Option<MessageRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, conversation_id, role, parts, attachments, created_at
            FROM messages
            WHERE id = $1
            ",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get message: {e}")))?;

        row.map(decode_message_row).transpose()
    }

    /// Get message count for a conversation
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn count_messages(&self, conversation_id: &str) -> AppResult<i64> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) as count
            FROM messages
            WHERE conversation_id = $1
            ",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to count messages: {e}")))?;

        Ok(row.get("count"))
    }
}

/// Validate a role string against the closed role enumeration
///
/// # Errors
///
/// Returns an error for any role outside system/user/assistant
pub fn parse_role(role: &str) -> AppResult<MessageRole> {
    MessageRole::parse(role)
        .ok_or_else(|| AppError::invalid_input(format!("Unknown message role: {role}")))
}

fn decode_message_row(r: sqlx::sqlite::SqliteRow) -> AppResult<MessageRecord> {
    let parts_json: String = r.get("parts");
    let attachments_json: String = r.get("attachments");

    let parts: Vec<MessagePart> = serde_json::from_str(&parts_json)
        .map_err(|e| AppError::serialization(format!("Failed to decode parts: {e}")))?;
    let attachments: Vec<Value> = serde_json::from_str(&attachments_json)
        .map_err(|e| AppError::serialization(format!("Failed to decode attachments: {e}")))?;

    Ok(MessageRecord {
        id: r.get("id"),
        conversation_id: r.get("conversation_id"),
        role: r.get("role"),
        parts,
        attachments,
        created_at: r.get("created_at"),
    })
}
