// ABOUTME: Environment-based server configuration with validation and defaults
// ABOUTME: Loads ports, database URL, auth, LLM provider, and weather service settings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Server configuration loaded from environment variables
//!
//! All configuration is environment-only. Every variable has a sensible
//! development default except external API keys, which stay optional so the
//! server can boot without outbound credentials (the affected features fail
//! at call time with a configuration error instead).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Complete server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API port
    pub http_port: u16,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Weather tool configuration
    pub weather: WeatherConfig,
}

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite path or `sqlite::memory:`)
    pub url: String,
}

/// Authentication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JWT token expiry in hours
    pub jwt_expiry_hours: i64,
    /// JWT signing secret (generated at startup when unset)
    pub jwt_secret: Option<String>,
}

/// LLM provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenRouter API key (`OPENROUTER_API_KEY`)
    pub openrouter_api_key: Option<String>,
    /// Chat completions base URL
    pub base_url: String,
    /// Default chat model
    pub default_model: String,
}

/// Weather tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Google API key used for geocoding and current conditions
    pub google_api_key: Option<String>,
    /// Geocoding API base URL
    pub geocode_base_url: String,
    /// Current conditions API base URL
    pub conditions_base_url: String,
    /// Geocode cache entry lifetime in seconds
    pub geocode_cache_ttl_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable fails to parse
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_port: env_var_or("HTTP_PORT", "8081")
                .parse()
                .context("Invalid HTTP_PORT")?,
            database: DatabaseConfig {
                url: env_var_or("DATABASE_URL", "sqlite:./data/cirrus.db"),
            },
            auth: AuthConfig {
                jwt_expiry_hours: env_var_or("JWT_EXPIRY_HOURS", "24")
                    .parse()
                    .context("Invalid JWT_EXPIRY_HOURS")?,
                jwt_secret: env::var("JWT_SECRET").ok(),
            },
            llm: LlmConfig {
                openrouter_api_key: env::var("OPENROUTER_API_KEY").ok(),
                base_url: env_var_or("OPENROUTER_BASE_URL", "https://openrouter.ai/api/v1"),
                default_model: env_var_or("CHAT_MODEL", "google/gemini-2.5-flash-lite"),
            },
            weather: WeatherConfig {
                google_api_key: env::var("GOOGLE_API_KEY").ok(),
                geocode_base_url: env_var_or(
                    "GEOCODE_BASE_URL",
                    "https://maps.googleapis.com/maps/api/geocode",
                ),
                conditions_base_url: env_var_or(
                    "WEATHER_BASE_URL",
                    "https://weather.googleapis.com/v1",
                ),
                geocode_cache_ttl_secs: env_var_or("GEOCODE_CACHE_TTL_SECS", "86400")
                    .parse()
                    .context("Invalid GEOCODE_CACHE_TTL_SECS")?,
            },
        })
    }

    /// Human-readable configuration summary for startup logging
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Cirrus Chat Server Configuration:\n\
             - HTTP Port: {}\n\
             - Database: {}\n\
             - JWT Expiry: {}h\n\
             - Chat Model: {}\n\
             - OpenRouter Key: {}\n\
             - Google Weather Key: {}",
            self.http_port,
            self.database.url,
            self.auth.jwt_expiry_hours,
            self.llm.default_model,
            if self.llm.openrouter_api_key.is_some() {
                "configured"
            } else {
                "missing"
            },
            if self.weather.google_api_key.is_some() {
                "configured"
            } else {
                "missing"
            },
        )
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}
