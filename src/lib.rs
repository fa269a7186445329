// Guided Modelling - Rust Edition
// A workflow engine that walks users through building a Gellish-style ontology

//! # Guided Modelling Library
//!
//! This is the library crate behind the guided modelling server. Users build
//! a formal ontology of subject–relation–object facts by walking through
//! multi-step **workflows** ("define a new physical object kind", "define a
//! role", ...). Each workflow is a hierarchical state machine whose states are
//! UI steps; finishing a workflow yields fact triples ready to be persisted
//! into the knowledge graph.
//!
//! ## Core Components
//!
//! ### Domain Models
//! - [`WorkflowDefinition`]: states, transitions, entry actions and step specs
//! - [`StepSpec`]: fact templates and field provenance of one step
//! - [`Pattern`]: the parsed form of `1.NewConcept? > 1146.is a specialization of > 2.Supertype?`
//! - [`Context`]: per-instance field values with partial-update semantics
//! - [`Fact`]: the triple a workflow emits
//!
//! ### Engine
//! - [`WorkflowSession`]: the operation surface for one editing session
//! - [`WorkflowInstance`]: one (possibly nested) workflow run
//! - [`StateMachineCore`]: hierarchical FSM with shallow history
//! - [`PatternCompiler`]: templates + context → complete facts
//! - [`TempIdAllocator`]: provisional uids for not-yet-persisted entities
//! - [`WorkflowRegistry`]: built-in and file-loaded definitions
//!
//! **Usage Example:**
//! ```rust
//! use std::sync::Arc;
//! use guided_modelling::{WorkflowRegistry, WorkflowSession};
//!
//! let registry = Arc::new(WorkflowRegistry::with_defaults().unwrap());
//! let mut session = WorkflowSession::new(registry);
//!
//! session.init_workflow("new-physical-object").unwrap();
//! session.set_workflow_value("NewConcept", "Widget").unwrap();
//! session.increment_workflow_step().unwrap();
//! session.set_workflow_kg_value("Supertype", 730044, "physical object").unwrap();
//! session.increment_workflow_step().unwrap();
//!
//! let facts = session.get_state().facts;
//! assert_eq!(facts[0].to_string(), "1.Widget > 1146.is a specialization of > 730044.physical object");
//! ```
//!
//! ### Transport
//! The [`api`] module exposes sessions over HTTP and WebSocket with axum.
//!
//! ## Rust Learning Notes:
//!
//! ### Module System
//! Each `mod` declaration pulls in either a `.rs` file or a directory with a
//! `mod.rs` file.
//!
//! ### Re-exports
//! `pub use` statements create shortcuts so users don't need to know the
//! internal module structure: `guided_modelling::Fact` instead of
//! `guided_modelling::models::fact::Fact`.

// Core domain models: definitions, patterns, contexts, facts
pub mod models;

// Engine: state machine, compiler, instances, sessions, registry
pub mod engine;

// HTTP + WebSocket transport
pub mod api;

// Server configuration
pub mod config;

// Re-export core domain types for easy access
pub use models::{
    Context,            // Per-instance field store
    ContextEntry,       // One (uid, value) pair
    ContextUpdate,      // Partial write to a context field
    EntryAction,        // Branch / End on state entry
    EventId,            // Named transition trigger
    Fact,               // Subject–relation–object triple
    FieldSource,        // Where a step field gets its value
    FieldSourceSpec,    // Field + source + optional workflow
    HistoryEvent,       // Audit record of one transition
    Pattern,            // Parsed fact template
    PatternError,       // Why a template line failed to parse
    StateId,            // Workflow state identifier
    StateNode,          // One (possibly compound) state
    StateRef,           // Active configuration of a machine
    StepSpec,           // Per-state templates and fields
    Uid,                // Knowledge-graph identifier
    WorkflowDefinition, // Complete workflow description
};

// Re-export engine types for convenience
pub use engine::{
    EntityInfo, FactStore, GraphLookup, InMemoryFactStore, InMemoryGraphLookup, InstanceId,
    PatternCompiler, SessionSnapshot, StateMachineCore, StepDescriptor, TempIdAllocator,
    WorkflowInstance, WorkflowRegistry, WorkflowSession, WorkflowStatus,
};

pub use config::ServerConfig;

// Core error types
use thiserror::Error;

/// Errors raised by guided modelling operations
///
/// ## Rust Learning Notes:
///
/// ### The `thiserror` Crate
/// - `#[derive(Error)]` implements `std::error::Error`
/// - `#[error("...")]` provides the `Display` message
/// - `#[from]` generates a `From` impl so `?` converts automatically
///
/// Incomplete fact templates are deliberately absent here: the compiler drops
/// them silently, it never reports them.
#[derive(Error, Debug)]
pub enum ModellingError {
    /// No workflow definition is registered under this id
    #[error("Unknown workflow: {id}")]
    UnknownWorkflow { id: String },

    /// Required fields of the current step are not filled in
    #[error("Validation failed in state {state}: missing {}", .missing.join(", "))]
    Validation { state: String, missing: Vec<String> },

    /// Every provisional uid of the session has been handed out
    #[error("Provisional uid range exhausted: more than {max} new entities in one session")]
    ProvisionalUidsExhausted { max: u64 },

    /// Operation not allowed in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A fact template line could not be parsed
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),

    /// A workflow definition failed its static checks
    #[error("Invalid workflow definition: {0}")]
    Definition(String),

    /// Unknown session, instance or knowledge-graph uid
    #[error("Not found: {0}")]
    NotFound(String),

    /// Collaborator (fact store, graph lookup) failures
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// Filesystem errors while loading definitions
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ModellingError {
    fn from(err: std::io::Error) -> Self {
        ModellingError::Io(err.to_string())
    }
}

/// Type alias for Results that use our custom error type
pub type Result<T> = std::result::Result<T, ModellingError>;
