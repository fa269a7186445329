// Guided Modelling - HTTP server
// Serves workflow sessions over REST and WebSocket
// Run with: cargo run --bin server

//! # Guided Modelling Server Binary
//!
//! Starts the axum server in front of the workflow engine.
//!
//! ## What This Server Provides
//!
//! - **Session API**: create editing sessions and drive them step by step
//! - **WebSocket**: the same commands over one long-lived connection
//! - **Built-in Workflows**: new physical object, role and relation
//! - **In-Memory Collaborators**: a fact store and a seeded knowledge graph
//!
//! ## Configuration
//!
//! ```text
//! MODELLER_CONFIG=modeller.toml     optional config file
//! MODELLER_PORT=4000                any ServerConfig field, prefixed
//! MODELLER_DEFINITIONS_DIR=./flows  extra *.json workflow definitions
//! RUST_LOG=guided_modelling=debug   log filter, default "info"
//! ```

use std::sync::Arc;

use anyhow::Context as _;
use guided_modelling::api::{create_router, AppState};
use guided_modelling::{ServerConfig, WorkflowRegistry};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("MODELLER_CONFIG").ok();
    let config = ServerConfig::load(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🚀 Starting Guided Modelling Server...");
    info!("=====================================");

    let mut registry = WorkflowRegistry::with_defaults()?;
    if let Some(dir) = &config.definitions_dir {
        registry
            .load_dir(dir)
            .with_context(|| format!("loading workflow definitions from {}", dir.display()))?;
    }
    for (workflow, state, target) in registry.dangling_branches() {
        warn!("⚠️  {} state '{}' branches into unknown workflow '{}'", workflow, state, target);
    }
    info!("📋 {} workflow(s) registered", registry.len());

    let state = AppState::in_memory(Arc::new(registry), config.committed_uid_base);
    let app = create_router(state, config.cors_enabled);

    let addr = config.bind_address();
    info!("📡 Server address: http://{}", addr);
    info!("   CORS enabled: {}", config.cors_enabled);

    axum::Server::bind(&addr.parse()?)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
