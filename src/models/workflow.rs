// Workflow definitions - complete guided-modelling state machine specifications

//! # Workflow Definitions
//!
//! A `WorkflowDefinition` is the static description of one guided modelling
//! flow ("define a new physical object kind", "define a role", ...):
//! - A tree of states, each with named outgoing transitions
//! - An optional entry action per state (branch into a nested workflow, or end)
//! - The step spec of each state (fact templates and field provenance)
//! - The initial state
//!
//! Definitions are loaded once at start-up and shared read-only between every
//! instance that runs them.
//!
//! ## Hierarchical States
//!
//! A state with children is a **compound state**. Entering it enters its
//! `initial` child, or, when `history` is set and a child was active before,
//! the child that was active when the compound state was last left.
//!
//! ## Rust Learning Notes:
//!
//! ### Recursive Data
//! `StateNode` contains a `Vec<StateNode>`. Recursive structs are fine in Rust
//! as long as the recursion goes through a heap-allocated container such as
//! `Vec` or `Box`, so the size of the struct stays known at compile time.
//!
//! ### Graph Traversal
//! `find_unreachable_states` is an iterative depth-first search with an
//! explicit stack, avoiding recursion depth concerns for large definitions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::state::{EventId, StateId};
use super::step::{FieldSourceSpec, StepSpec};

/// Action performed synchronously when a state is entered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryAction {
    /// Spawn (or resume) a nested workflow bound to one of this instance's fields
    Branch { field_id: String, workflow_id: String },
    /// The guided flow is over
    End,
}

/// One state of a definition, possibly with nested states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateNode {
    pub id: StateId,

    /// Outgoing transitions: event name → target state id
    #[serde(default)]
    pub on: IndexMap<EventId, StateId>,

    /// Child states; non-empty makes this a compound state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<StateNode>,

    /// Initial child of a compound state (defaults to the first child)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<StateId>,

    /// Restore the last active child on re-entry
    #[serde(default)]
    pub history: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<EntryAction>,

    #[serde(default, rename = "final")]
    pub is_final: bool,
}

impl StateNode {
    /// A plain state with no transitions yet
    pub fn leaf<S: Into<StateId>>(id: S) -> Self {
        StateNode {
            id: id.into(),
            on: IndexMap::new(),
            states: vec![],
            initial: None,
            history: false,
            entry: None,
            is_final: false,
        }
    }

    /// A compound state entering `initial` by default
    pub fn compound<S: Into<StateId>, I: Into<StateId>>(id: S, initial: I, states: Vec<StateNode>) -> Self {
        StateNode {
            states,
            initial: Some(initial.into()),
            ..Self::leaf(id)
        }
    }

    /// Add a transition
    pub fn on<E: Into<EventId>, T: Into<StateId>>(mut self, event: E, target: T) -> Self {
        self.on.insert(event.into(), target.into());
        self
    }

    pub fn entry(mut self, action: EntryAction) -> Self {
        self.entry = Some(action);
        self
    }

    pub fn branch(self, field_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        self.entry(EntryAction::Branch {
            field_id: field_id.into(),
            workflow_id: workflow_id.into(),
        })
    }

    pub fn with_history(mut self) -> Self {
        self.history = true;
        self
    }

    pub fn final_state(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn is_compound(&self) -> bool {
        !self.states.is_empty()
    }

    /// The child entered when no history applies
    pub fn initial_child(&self) -> Option<&StateId> {
        self.initial
            .as_ref()
            .or_else(|| self.states.first().map(|s| &s.id))
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a StateNode>) {
        out.push(self);
        for child in &self.states {
            child.collect(out);
        }
    }

    fn path_to(&self, target: &StateId, path: &mut Vec<StateId>) -> bool {
        path.push(self.id.clone());
        if &self.id == target {
            return true;
        }
        for child in &self.states {
            if child.path_to(target, path) {
                return true;
            }
        }
        path.pop();
        false
    }
}

/// Complete static description of one guided workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier, e.g. "new-physical-object"
    pub id: String,

    /// Human-readable name shown in the workflow picker
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Field naming the entity this workflow defines
    ///
    /// A branch into this workflow binds the parent's field to it on start and
    /// copies it back on completion. Without one the parent's field id is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Top-level state entered on start
    pub initial: StateId,

    /// Top-level states
    pub states: Vec<StateNode>,

    /// Step spec per state id
    #[serde(default)]
    pub steps: BTreeMap<StateId, StepSpec>,
}

impl WorkflowDefinition {
    pub fn new<S: Into<String>, N: Into<String>, I: Into<StateId>>(
        id: S,
        name: N,
        initial: I,
        states: Vec<StateNode>,
    ) -> Self {
        WorkflowDefinition {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            subject: None,
            initial: initial.into(),
            states,
            steps: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_subject(mut self, field: impl Into<String>) -> Self {
        self.subject = Some(field.into());
        self
    }

    /// Attach the step spec of a state
    pub fn with_step<S: Into<StateId>>(mut self, state: S, spec: StepSpec) -> Self {
        self.steps.insert(state.into(), spec);
        self
    }

    /// Every state of the definition, depth-first in authored order
    pub fn all_states(&self) -> Vec<&StateNode> {
        let mut out = Vec::new();
        for state in &self.states {
            state.collect(&mut out);
        }
        out
    }

    /// Look up a state anywhere in the tree
    pub fn state(&self, id: &StateId) -> Option<&StateNode> {
        self.all_states().into_iter().find(|s| &s.id == id)
    }

    /// Outer-to-inner chain of state ids leading to `id`
    pub fn path_to(&self, id: &StateId) -> Option<Vec<StateId>> {
        let mut path = Vec::new();
        for state in &self.states {
            if state.path_to(id, &mut path) {
                return Some(path);
            }
        }
        None
    }

    pub fn step(&self, state: &StateId) -> Option<&StepSpec> {
        self.steps.get(state)
    }

    /// Every field referenced by any step spec, first occurrence wins
    ///
    /// Follows state order rather than the key order of `steps` so that
    /// context placeholders are issued in the order the user meets the fields.
    pub fn field_sources(&self) -> Vec<&FieldSourceSpec> {
        let mut seen = HashSet::new();
        let mut fields = Vec::new();
        for state in self.all_states() {
            if let Some(spec) = self.steps.get(&state.id) {
                for field in &spec.field_sources {
                    if seen.insert(field.field.as_str()) {
                        fields.push(field);
                    }
                }
            }
        }
        fields
    }

    /// Static well-formedness checks
    ///
    /// - Initial state exists at the top level
    /// - State ids are unique
    /// - Every transition targets an existing state
    /// - Every compound state's initial child is one of its children
    /// - Step specs belong to existing states
    /// - Branch actions and the subject name fields the definition knows about
    pub fn validate(&self) -> Result<(), String> {
        if !self.states.iter().any(|s| s.id == self.initial) {
            return Err(format!(
                "Initial state '{}' not found among top-level states",
                self.initial
            ));
        }

        let states = self.all_states();
        let mut ids = HashSet::new();
        for state in &states {
            if !ids.insert(&state.id) {
                return Err(format!("Duplicate state id '{}'", state.id));
            }
        }

        let fields: HashSet<&str> = self.field_sources().into_iter().map(|f| f.field.as_str()).collect();

        for state in &states {
            for (event, target) in &state.on {
                if !ids.contains(target) {
                    return Err(format!(
                        "State '{}' event '{}' targets unknown state '{}'",
                        state.id, event, target
                    ));
                }
            }

            if let Some(initial) = &state.initial {
                if !state.states.iter().any(|c| &c.id == initial) {
                    return Err(format!(
                        "Compound state '{}' has initial child '{}' which is not one of its children",
                        state.id, initial
                    ));
                }
            }

            if let Some(EntryAction::Branch { field_id, .. }) = &state.entry {
                if !fields.contains(field_id.as_str()) {
                    return Err(format!(
                        "State '{}' branches on field '{}' which no step declares",
                        state.id, field_id
                    ));
                }
            }
        }

        if let Some(subject) = &self.subject {
            if !fields.contains(subject.as_str()) {
                return Err(format!("Subject field '{}' is not declared by any step", subject));
            }
        }

        for state in self.steps.keys() {
            if !ids.contains(state) {
                return Err(format!("Step spec for unknown state '{}'", state));
            }
        }

        Ok(())
    }

    /// States that can never become active starting from the initial state
    ///
    /// Becoming active in a state also activates its ancestors (so their
    /// transitions apply) and, for compound states, any child: the initial one
    /// directly and the others through history or explicit transitions.
    pub fn find_unreachable_states(&self) -> Vec<&StateId> {
        let mut reachable: HashSet<&StateId> = HashSet::new();
        let mut to_visit: Vec<&StateId> = vec![&self.initial];

        while let Some(id) = to_visit.pop() {
            if !reachable.insert(id) {
                continue;
            }
            let Some(state) = self.state(id) else {
                continue;
            };

            if let Some(child) = state.initial_child() {
                to_visit.push(child);
            }
            to_visit.extend(state.on.values());

            if let Some(path) = self.path_to(id) {
                for ancestor in path.iter().take(path.len().saturating_sub(1)) {
                    if let Some(node) = self.state(ancestor) {
                        to_visit.push(&node.id);
                    }
                }
            }
        }

        self.all_states()
            .into_iter()
            .map(|s| &s.id)
            .filter(|id| !reachable.contains(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::step::{FieldSource, FieldSourceSpec};

    fn role_like() -> WorkflowDefinition {
        WorkflowDefinition::new(
            "role",
            "Define a role",
            "name",
            vec![
                StateNode::leaf("name").on("NEXT", "R"),
                StateNode::compound(
                    "R",
                    "player",
                    vec![
                        StateNode::leaf("player").on("NEXT", "kind"),
                        StateNode::leaf("kind"),
                    ],
                )
                .with_history()
                .on("DONE", "done"),
                StateNode::leaf("done").final_state(),
            ],
        )
        .with_step(
            "name",
            StepSpec {
                field_sources: vec![FieldSourceSpec::new("Role", FieldSource::Free)],
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_workflow_validation() {
        let workflow = role_like();
        assert!(workflow.validate().is_ok());
        assert_eq!(workflow.all_states().len(), 5);
        assert_eq!(
            workflow.path_to(&StateId::from("kind")),
            Some(vec![StateId::from("R"), StateId::from("kind")])
        );
        assert!(workflow.path_to(&StateId::from("nowhere")).is_none());
    }

    #[test]
    fn test_validation_failures() {
        let mut bad_initial = role_like();
        bad_initial.initial = StateId::from("player");
        assert!(bad_initial.validate().unwrap_err().contains("Initial state"));

        let mut bad_target = role_like();
        bad_target.states[0] = StateNode::leaf("name").on("NEXT", "missing");
        assert!(bad_target.validate().unwrap_err().contains("unknown state 'missing'"));

        let bad_branch = WorkflowDefinition::new(
            "b",
            "B",
            "a",
            vec![StateNode::leaf("a").branch("Ghost", "role")],
        );
        assert!(bad_branch.validate().unwrap_err().contains("Ghost"));

        let duplicate = WorkflowDefinition::new(
            "d",
            "D",
            "a",
            vec![StateNode::compound("a", "a", vec![StateNode::leaf("a")])],
        );
        assert!(duplicate.validate().unwrap_err().contains("Duplicate"));

        let bad_subject = role_like().with_subject("Nobody");
        assert!(bad_subject.validate().unwrap_err().contains("Subject field 'Nobody'"));

        let stray_step = role_like().with_step("ghost", StepSpec::default());
        assert!(stray_step.validate().unwrap_err().contains("ghost"));
    }

    #[test]
    fn test_unreachable_states() {
        let mut workflow = role_like();
        assert!(workflow.find_unreachable_states().is_empty());

        workflow.states.push(StateNode::leaf("orphan"));
        let unreachable = workflow.find_unreachable_states();
        assert_eq!(unreachable, vec![&StateId::from("orphan")]);
    }

    #[test]
    fn test_field_sources_deduplicate() {
        let spec = StepSpec {
            field_sources: vec![
                FieldSourceSpec::new("Role", FieldSource::Context),
                FieldSourceSpec::new("Player", FieldSource::KnowledgeGraph),
            ],
            ..Default::default()
        };
        let workflow = role_like().with_step("player", spec);

        let fields: Vec<&str> = workflow.field_sources().into_iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["Role", "Player"]);
        assert_eq!(workflow.field_sources()[0].source, FieldSource::Free);
    }

    #[test]
    fn test_definition_json_round_trip() {
        let workflow = role_like();
        let json = serde_json::to_value(&workflow).unwrap();
        assert_eq!(json["states"][1]["history"], serde_json::json!(true));
        assert_eq!(json["states"][2]["final"], serde_json::json!(true));

        let back: WorkflowDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(back, workflow);
    }
}
