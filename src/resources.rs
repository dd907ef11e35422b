// ABOUTME: Shared server resources injected into route handlers as axum state
// ABOUTME: Wires the store, auth manager, provider, tool registry, and relay together
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Dependency container for route handlers

use crate::auth::AuthManager;
use crate::database::{ChatStore, Database};
use crate::llm::LlmProvider;
use crate::relay::CompletionRelay;
use crate::titles::TitleGenerator;
use crate::tools::ToolRegistry;
use std::sync::Arc;

/// Shared resources for all HTTP handlers
pub struct ServerResources {
    /// Database handle
    pub database: Arc<Database>,
    /// Conversation and message store
    pub store: ChatStore,
    /// JWT authentication manager
    pub auth_manager: Arc<AuthManager>,
    /// Completion relay orchestrating chat turns
    pub relay: CompletionRelay,
}

impl ServerResources {
    /// Assemble resources from their leaf collaborators
    #[must_use]
    pub fn new(
        database: Arc<Database>,
        auth_manager: Arc<AuthManager>,
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let store = ChatStore::new(database.pool().clone());
        let titles = TitleGenerator::new(provider.clone());
        let relay = CompletionRelay::new(store.clone(), provider, tools, titles);

        Self {
            database,
            store,
            auth_manager,
            relay,
        }
    }
}
