// ABOUTME: Helper module index for integration tests
// ABOUTME: Exposes the axum request testing utilities
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

pub mod axum_test;
