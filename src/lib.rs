// ABOUTME: Main library entry point for the Cirrus chat server
// ABOUTME: Streaming AI chat with durable conversations, tool calling, and SSE delivery
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Cirrus Chat Server
//!
//! A web chat server where authenticated users converse with an AI
//! assistant. Conversations persist to SQLite, replies stream to the caller
//! token by token, and the assistant can invoke tools (weather lookup)
//! mid-reply.
//!
//! ## Architecture
//!
//! - **Message Store** (`database`): owner-scoped conversation and message
//!   CRUD with cascade delete and append-only history
//! - **Title Generator** (`titles`): background conversation labeling from
//!   the first user message
//! - **Tool Registry** (`tools`): named, schema-validated async functions
//!   exposed to the model
//! - **Completion Relay** (`relay`): the orchestrator that persists the user
//!   message, streams the provider reply to the caller while accumulating
//!   it, executes tool calls, and finalizes the assistant message
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cirrus_chat_server::config::environment::ServerConfig;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ServerConfig::from_env()?;
//! println!("Cirrus configured on port {}", config.http_port);
//! # Ok(())
//! # }
//! ```

/// Authentication and session token validation
pub mod auth;

/// Bounded-TTL in-process cache with injectable clock
pub mod cache;

/// Configuration management
pub mod config;

/// Database connection and chat storage
pub mod database;

/// Unified error handling with standard error codes and HTTP responses
pub mod errors;

/// LLM provider abstraction and implementations
pub mod llm;

/// Logging configuration and structured output
pub mod logging;

/// Message content model
pub mod models;

/// Streaming completion relay
pub mod relay;

/// Shared server resources for route handlers
pub mod resources;

/// HTTP route handlers
pub mod routes;

/// Conversation title generation
pub mod titles;

/// Tool registry and built-in tools
pub mod tools;
