// ABOUTME: Route module organization for the Cirrus chat server HTTP endpoints
// ABOUTME: Centralized route definitions organized by domain
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Route modules
//!
//! Each domain module contains route definitions and thin handlers that
//! delegate to the store and relay layers.

/// Chat conversation and turn routes
pub mod chat;
/// Health check routes
pub mod health;

pub use chat::ChatRoutes;
pub use health::HealthRoutes;

use crate::resources::ServerResources;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the complete application router
#[must_use]
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .merge(ChatRoutes::routes(resources.clone()))
        .merge(HealthRoutes::routes(resources))
        .layer(TraceLayer::new_for_http())
}
