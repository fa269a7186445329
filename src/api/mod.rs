// Guided modelling API - REST and WebSocket access to workflow sessions

//! # API Module
//!
//! An axum router over a table of [`WorkflowSession`]s. Sessions are created
//! with `POST /sessions` and addressed by their UUID afterwards.
//!
//! ```text
//! GET  /health
//! GET  /workflows
//! POST /sessions
//! GET  /sessions/:id/state
//! POST /sessions/:id/{init,branch,next,prev,send,validate,finalize,pop,value,kg-value}
//! GET  /sessions/:id/ws
//! GET  /kg/:uid
//! ```

pub mod handlers;
pub mod types;
pub mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::engine::{
    FactStore, GraphLookup, InMemoryFactStore, InMemoryGraphLookup, WorkflowRegistry,
    WorkflowSession,
};
use crate::models::Uid;

pub use handlers::dispatch;
pub use types::{CommandResponse, ErrorResponse, SessionCommand};

/// Shared state of every route
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<WorkflowRegistry>,
    pub sessions: Arc<DashMap<Uuid, WorkflowSession>>,
    pub facts: Arc<dyn FactStore>,
    pub graph: Arc<dyn GraphLookup>,
}

impl AppState {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        facts: Arc<dyn FactStore>,
        graph: Arc<dyn GraphLookup>,
    ) -> Self {
        AppState {
            registry,
            sessions: Arc::new(DashMap::new()),
            facts,
            graph,
        }
    }

    /// In-memory collaborators: a fact store minting from `uid_base` and the seeded graph
    pub fn in_memory(registry: Arc<WorkflowRegistry>, uid_base: Uid) -> Self {
        Self::new(
            registry,
            Arc::new(InMemoryFactStore::new(uid_base)),
            Arc::new(InMemoryGraphLookup::seeded()),
        )
    }
}

/// Build the router with all routes
pub fn create_router(state: AppState, cors_enabled: bool) -> Router {
    let router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/workflows", get(handlers::list_workflows))
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/:id/state", get(handlers::get_state))
        .route("/sessions/:id/init", post(handlers::init))
        .route("/sessions/:id/branch", post(handlers::branch))
        .route("/sessions/:id/next", post(handlers::next))
        .route("/sessions/:id/prev", post(handlers::prev))
        .route("/sessions/:id/send", post(handlers::send))
        .route("/sessions/:id/validate", post(handlers::validate))
        .route("/sessions/:id/finalize", post(handlers::finalize))
        .route("/sessions/:id/pop", post(handlers::pop))
        .route("/sessions/:id/value", post(handlers::set_value))
        .route("/sessions/:id/kg-value", post(handlers::set_kg_value))
        .route("/sessions/:id/ws", get(websocket::session_socket))
        .route("/kg/:uid", get(handlers::get_entity))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
