// ABOUTME: Configuration management module for the Cirrus chat server
// ABOUTME: Environment-only configuration loading with validation and summary logging
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Configuration management

/// Environment-based server configuration
pub mod environment;

pub use environment::ServerConfig;
