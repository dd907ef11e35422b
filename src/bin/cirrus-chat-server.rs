// ABOUTME: Server binary for the Cirrus chat server
// ABOUTME: Loads configuration, wires resources, and serves the HTTP API
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Cirrus Chat Server Binary
//!
//! Starts the chat API with JWT authentication, SQLite persistence, and the
//! OpenRouter model provider.

use anyhow::Result;
use cirrus_chat_server::{
    auth::{generate_jwt_secret, AuthManager},
    cache::TtlCache,
    config::environment::ServerConfig,
    database::Database,
    llm::{LlmProvider, OpenRouterProvider},
    logging,
    resources::ServerResources,
    routes,
    tools::{GoogleWeatherApi, ToolRegistry, WeatherTool},
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "cirrus-chat-server")]
#[command(about = "Cirrus Chat - streaming AI chat server with tool calling")]
struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    logging::init_from_env()?;

    info!("Starting Cirrus Chat Server");
    info!("{}", config.summary());

    let database = Arc::new(Database::new(&config.database.url).await?);
    info!("Database initialized: {}", config.database.url);

    let jwt_secret = config.auth.jwt_secret.as_ref().map_or_else(
        || {
            warn!("JWT_SECRET not set; generating an ephemeral secret (tokens will not survive restarts)");
            generate_jwt_secret().to_vec()
        },
        |secret| secret.as_bytes().to_vec(),
    );
    let auth_manager = Arc::new(AuthManager::new(jwt_secret, config.auth.jwt_expiry_hours));
    info!("Authentication manager initialized");

    let provider = Arc::new(OpenRouterProvider::from_config(&config.llm)?);
    info!("LLM provider initialized: {}", provider.default_model());

    let mut tools = ToolRegistry::new();
    match GoogleWeatherApi::from_config(&config.weather) {
        Ok(weather_api) => {
            let geocode_cache = Arc::new(TtlCache::new(Duration::from_secs(
                config.weather.geocode_cache_ttl_secs,
            )));
            tools.register(Arc::new(WeatherTool::new(
                Arc::new(weather_api),
                geocode_cache,
            )));
            info!("Weather tool registered");
        }
        Err(e) => warn!("Weather tool disabled: {}", e),
    }

    let resources = Arc::new(ServerResources::new(
        database,
        auth_manager,
        provider,
        Arc::new(tools),
    ));

    let app = routes::router(resources);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}
