// Guided modelling engine
// The interpreters and session state that drive workflow definitions

//! # Engine Module
//!
//! This module is the layer between the static domain models and the
//! transport layer. Everything here runs synchronously and performs no I/O,
//! except loading definitions from disk at start-up and the collaborator
//! traits in `storage`.
//!
//! ## Architecture Overview
//!
//! ```text
//!   WorkflowSession            one per editing session
//!     └── WorkflowInstance     one per (nested) workflow run
//!           ├── StateMachineCore   active configuration + history
//!           └── PatternCompiler    step templates → facts
//!   TempIdAllocator            provisional uids, one per session
//!   WorkflowRegistry           definitions, shared read-only
//! ```
//!
//! ## Engine Components
//!
//! ### Temp Ids (`temp_id` module)
//! - Provisional uids for entities that only exist in a session
//!
//! ### Pattern Compiler (`compiler` module)
//! - Resolves placeholder slots against a context
//! - Emits complete facts only
//!
//! ### State Machine (`machine` module)
//! - Hierarchical states, shallow history, entry actions
//!
//! ### Instances and Sessions (`instance`, `session` modules)
//! - Context, fact ledger and lifecycle of one run
//! - Branch tree, branch completion and the operation surface
//!
//! ### Registry (`registry` module)
//! - Built-in workflows and JSON definitions loaded from a directory
//!
//! ### Collaborators (`storage` module)
//! - Fact persistence and knowledge-graph lookup traits
//!
//! ## Rust Learning Notes:
//!
//! ### Re-exports for API Design
//! The `pub use` statements at the bottom flatten the hierarchy so callers
//! write `engine::WorkflowSession` rather than `engine::session::WorkflowSession`.

/// Provisional uid allocation
pub mod temp_id;

/// Fact template compilation
pub mod compiler;

/// Hierarchical finite state machine interpreter
pub mod machine;

/// One run of a workflow with its context and facts
pub mod instance;

/// Branch tree of instances for one editing session
pub mod session;

/// Process-wide workflow definition table
pub mod registry;

/// Fact persistence and graph lookup collaborators
pub mod storage;

pub use compiler::PatternCompiler;
pub use instance::{FiredAction, InstanceId, Linkage, WorkflowInstance, WorkflowStatus};
pub use machine::StateMachineCore;
pub use registry::WorkflowRegistry;
pub use session::{SessionSnapshot, StepDescriptor, WorkflowSession};
pub use storage::{
    EntityInfo, FactStore, GraphLookup, InMemoryFactStore, InMemoryGraphLookup,
    DEFAULT_COMMITTED_UID_BASE,
};
pub use temp_id::{TempIdAllocator, PROVISIONAL_UID_MAX};
