// ABOUTME: Tool registry exposing named, schema-validated callable functions to the model
// ABOUTME: Executor errors are captured as structured outcomes, never relay-fatal
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Tool Registry
//!
//! Tools are named async functions the model may invoke mid-reply. Each tool
//! declares a JSON Schema used both as provider-side function-calling
//! metadata and for runtime validation. Execution failures come back as
//! [`ToolOutcome::Error`] so a broken tool degrades one call, not the turn.

/// Weather lookup tool
pub mod weather;

pub use weather::{GoogleWeatherApi, WeatherApi, WeatherTool, WEATHER_TOOL_NAME};

use crate::llm::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Error raised by a tool executor
#[derive(Debug, Error)]
pub enum ToolError {
    /// The input payload failed schema validation
    #[error("{0}")]
    Validation(String),
    /// The executor ran and failed
    #[error("{0}")]
    Execution(String),
}

/// Result of executing a tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Executor output payload
    Output(Value),
    /// Captured executor error text
    Error(String),
}

/// A named, schema-validated callable function exposed to the model
#[async_trait]
pub trait ChatTool: Send + Sync {
    /// Name the model calls this tool by
    fn name(&self) -> &'static str;

    /// Description shown to the model
    fn description(&self) -> &'static str;

    /// JSON Schema of the input payload
    fn input_schema(&self) -> Value;

    /// Run the tool against a validated input payload
    async fn execute(&self, input: Value) -> Result<Value, ToolError>;
}

/// Registry of tools available to the model during a turn
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn ChatTool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name
    pub fn register(&mut self, tool: Arc<dyn ChatTool>) {
        self.tools.insert(tool.name(), tool);
    }

    /// Whether any tools are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Provider-facing definitions for every registered tool
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.input_schema(),
            })
            .collect();
        // Stable ordering keeps provider payloads deterministic
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Execute a named tool, capturing any failure as an outcome
    pub async fn execute(&self, name: &str, input: Value) -> ToolOutcome {
        let Some(tool) = self.tools.get(name) else {
            warn!("Model requested unknown tool: {}", name);
            return ToolOutcome::Error(format!("Unknown tool: {name}"));
        };

        match tool.execute(input).await {
            Ok(output) => ToolOutcome::Output(output),
            Err(e) => {
                warn!("Tool {} failed: {}", name, e);
                ToolOutcome::Error(e.to_string())
            }
        }
    }
}
