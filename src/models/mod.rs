// Core domain models for guided modelling
// These are the static, serializable data structures the engine interprets

//! # Domain Models Module
//!
//! This module contains the data the workflow engine works on. Nothing in
//! here mutates session state; the engine layer (`crate::engine`) does that.
//!
//! ## Rust Learning Notes:
//!
//! ### Re-exports for Clean APIs
//! The `pub use` statements at the bottom create a flat API.
//! Users can import `use guided_modelling::models::Fact` instead of
//! `use guided_modelling::models::fact::Fact`.

// StateId, EventId and the runtime configuration StateRef
pub mod state;

// Fact triples emitted by workflows
pub mod fact;

// Per-instance field store with partial-update semantics
pub mod context;

// Typed AST and parser for fact templates
pub mod pattern;

// Step specs: fact templates and field provenance per state
pub mod step;

// WorkflowDefinition and its state tree
pub mod workflow;

// Audit trail of instance transitions
pub mod history;

pub use context::{Context, ContextEntry, ContextUpdate};
pub use fact::{Fact, Uid};
pub use history::HistoryEvent;
pub use pattern::{Cardinality, Pattern, PatternError, PatternLine, Relation, Slot, UidRef};
pub use state::{EventId, StateId, StateRef};
pub use step::{FieldSource, FieldSourceSpec, StepSpec};
pub use workflow::{EntryAction, StateNode, WorkflowDefinition};
